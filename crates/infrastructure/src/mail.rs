//! 邮件发送：配置了 SMTP 主机时走 lettre，否则只记录日志

use std::sync::Arc;

use application::{MailError, Mailer, OutgoingEmail};
use async_trait::async_trait;
use config::MailConfig;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|err| MailError::Address(format!("mail.from: {err}")))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("未配置 SMTP 主机，邮件只记录日志不发送");
            None
        } else {
            let builder = if config.starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|err| MailError::Transport(err.to_string()))?
            .port(config.smtp_port);

            let builder = match (&config.smtp_username, &config.smtp_password) {
                (Some(username), Some(password)) => {
                    builder.credentials(Credentials::new(username.clone(), password.clone()))
                }
                _ => builder,
            };
            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            info!(to = %email.to, subject = %email.subject, "邮件发送未启用，跳过");
            return Ok(());
        };

        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|err| MailError::Address(err.to_string()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|err| MailError::Build(err.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;
        info!(subject = %email.subject, "邮件已发送");
        Ok(())
    }
}
