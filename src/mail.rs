//! 异步邮件队列
//!
//! 请求处理函数通过 [`Mailer::enqueue`] 把邮件放入有界队列后立即返回，
//! 由唯一的 [`MailConsumer`] 按入队顺序逐封投递。投递失败只会进入错误通道并记录日志，
//! 不会回传给入队方，也不会中断消费循环。

mod mailer;
mod message;
mod templates;
mod transport;

pub use mailer::{MailConsumer, Mailer};
pub use message::{Message, RenderedBody, Sender};
pub use templates::Templates;
pub use transport::{MailTransport, SmtpTransport};

use std::{fmt::Debug, path::PathBuf};

use crate::util::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum MailError {
    #[error("the mail queue is closed.")]
    QueueClosed,
    #[error("the mail consumer has stopped.")]
    ConsumerStopped,
    #[error("`{0}` is not a valid mailbox.")]
    InvalidAddress(String),
    #[error("failed to read attachment `{}`.", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render the mail template.")]
    Template(#[from] tera::Error),
    #[error("invalid content type.")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),
    #[error("failed to build the mail.")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport failed.")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl Debug for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// 错误通道中传递的投递失败记录
#[derive(thiserror::Error)]
#[error("failed to deliver `{subject}` to {recipient}.")]
pub struct DeliveryError {
    pub recipient: String,
    pub subject: String,
    #[source]
    pub source: MailError,
}

impl Debug for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
