use std::path::PathBuf;

use super::{MailError, Templates};
use crate::domain::EmailAddress;

/// 一封待发送的邮件，入队后不再修改
#[derive(Debug, Clone)]
pub struct Message {
    pub to: EmailAddress,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachments: Vec<PathBuf>,
    /// 为空时使用配置中的发件人
    pub from: Option<Sender>,
}

#[derive(Debug, Clone)]
pub struct Sender {
    pub address: EmailAddress,
    pub name: Option<String>,
}

/// 渲染后的正文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub text: String,
    pub html: Option<String>,
}

impl Message {
    pub fn new(to: EmailAddress, subject: impl Into<String>, text_body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: None,
            attachments: Vec::new(),
            from: None,
        }
    }

    pub fn html(mut self, html_body: impl Into<String>) -> Self {
        self.html_body = Some(html_body.into());
        self
    }

    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    pub fn sent_by(mut self, sender: Sender) -> Self {
        self.from = Some(sender);
        self
    }

    /// HTML 正文套用邮件布局，纯文本原样保留
    pub fn render(&self, templates: &Templates) -> Result<RenderedBody, MailError> {
        let html = self
            .html_body
            .as_deref()
            .map(|body| templates.layout(&self.subject, body))
            .transpose()?;

        Ok(RenderedBody {
            text: self.text_body.clone(),
            html,
        })
    }
}
