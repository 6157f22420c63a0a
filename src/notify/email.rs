//! Email notification channel (SMTP submission via lettre)

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, instrument};

use crate::config::EmailConfig;

use super::{ChannelOutcome, Notification, priority_profile};

/// SMTP email channel
///
/// The transport and recipient list are built once at startup; a bad address
/// in the configuration fails construction, not every send.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: lettre::message::Mailbox,
    to: Vec<lettre::message::Mailbox>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
        }
        .map_err(|e| anyhow::anyhow!("failed to create SMTP transport: {e}"))?
        .credentials(creds)
        .port(config.smtp_port)
        .build();

        let from = config
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid from address '{}': {e}", config.from))?;

        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e| anyhow::anyhow!("invalid recipient '{addr}': {e}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if to.is_empty() {
            anyhow::bail!("email channel configured without recipients");
        }

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    #[instrument(skip(self, note), fields(title = %note.title))]
    pub async fn send(&self, note: &Notification) -> ChannelOutcome {
        let profile = priority_profile(note.priority);
        let subject = format!("{} {}", profile.subject_prefix, note.title);

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        let message = match builder.body(note.message.clone()) {
            Ok(message) => message,
            Err(e) => {
                error!("failed to build email message: {}", e);
                return ChannelOutcome::Failed(e.to_string());
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("successfully sent email notification");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                error!("failed to send email notification: {}", e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}
