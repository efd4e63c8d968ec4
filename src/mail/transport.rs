use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, extension::ClientId},
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use secrecy::ExposeSecret;

use super::{MailError, Message, RenderedBody};
use crate::config::{Encryption, MailConfig};

/// 邮件的出站通道
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, message: &Message, body: RenderedBody) -> Result<(), MailError>;
}

/// 基于 lettre 的 SMTP 投递
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpTransport {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let sender = mailbox(&config.from_address, Some(&config.from_name))?;

        let mut builder = match config.encryption {
            Encryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            Encryption::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
        };
        builder = builder
            .port(config.port)
            .hello_name(ClientId::Domain(config.domain.clone()))
            .timeout(Some(Duration::from_millis(config.timeout_milliseconds)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_owned(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }

    async fn build_message(
        &self,
        message: &Message,
        body: RenderedBody,
    ) -> Result<lettre::Message, MailError> {
        let from = match &message.from {
            Some(sender) => mailbox(sender.address.as_ref(), sender.name.as_deref())?,
            None => self.sender.clone(),
        };
        let to = mailbox(message.to.as_ref(), None)?;

        let mut content = match body.html {
            Some(html) => {
                MultiPart::mixed().multipart(MultiPart::alternative_plain_html(body.text, html))
            }
            None => MultiPart::mixed().singlepart(SinglePart::plain(body.text)),
        };
        for path in &message.attachments {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| MailError::Attachment {
                    path: path.clone(),
                    source,
                })?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".into());
            let content_type = ContentType::parse("application/octet-stream")?;
            content = content.singlepart(Attachment::new(filename).body(bytes, content_type));
        }

        Ok(lettre::Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .multipart(content)?)
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, message: &Message, body: RenderedBody) -> Result<(), MailError> {
        let email = self.build_message(message, body).await?;
        self.transport.send(email).await?;
        Ok(())
    }
}

fn mailbox(address: &str, name: Option<&str>) -> Result<Mailbox, MailError> {
    let address: Address = address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_owned()))?;
    let name = name.filter(|n| !n.trim().is_empty()).map(str::to_owned);
    Ok(Mailbox::new(name, address))
}
