/*!
Outbound transactional email: the contact-form relay and the
password-reset link.

Dispatch always happens on a spawned task *after* the database write that
triggered it has committed; a send failure is logged and never unwinds the
request that queued it. With no SMTP credentials configured the mailer
still constructs, and just logs what it would have sent, which keeps local
development and tests off the network.
*/
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    transport::smtp::authentication::Credentials,
};

#[derive(Clone)]
pub struct Mailer {
    from: String,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl Mailer {
    /// Build a mailer from optional SMTP settings. Any missing setting
    /// disables actual delivery.
    pub fn new(
        smtp_host: Option<&str>,
        smtp_user: Option<&str>,
        smtp_password: Option<&str>,
        from: &str,
    ) -> Result<Self, String> {
        let transport = match (smtp_host, smtp_user, smtp_password) {
            (Some(host), Some(user), Some(password)) => {
                let t = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                    .map_err(|e| format!(
                        "Error building SMTP transport for {:?}: {}", host, &e
                    ))?
                    .credentials(Credentials::new(user.to_owned(), password.to_owned()))
                    .build();
                Some(t)
            },
            _ => {
                log::warn!("SMTP not fully configured; outbound mail is disabled.");
                None
            },
        };

        Ok(Self { from: from.to_owned(), transport })
    }

    pub async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), String> {
        log::trace!("Mailer::send( {:?}, {:?}, ... ) called.", to, subject);

        let transport = match &self.transport {
            Some(t) => t,
            None => {
                log::info!(
                    "Mail disabled; would have sent {:?} to {:?}.", subject, to
                );
                return Ok(());
            },
        };

        let message = Message::builder()
            .from(self.from.parse().map_err(|e| format!(
                "Bad from address {:?}: {}", &self.from, &e
            ))?)
            .to(to.parse().map_err(|e| format!(
                "Bad to address {:?}: {}", to, &e
            ))?)
            .subject(subject)
            .body(body)
            .map_err(|e| format!("Error building message: {}", &e))?;

        transport.send(message).await
            .map_err(|e| format!("Error sending mail to {:?}: {}", to, &e))?;

        log::info!("Sent {:?} to {:?}.", subject, to);
        Ok(())
    }

    /// Fire-and-forget dispatch for request handlers. The handler's
    /// database work is already committed by the time this is called, so
    /// delivery failure only gets logged (at-least-once, not exactly-once).
    pub fn send_detached(&self, to: String, subject: String, body: String) {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&to, &subject, body).await {
                log::error!("Background mail dispatch failed: {}", &e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[tokio::test]
    async fn unconfigured_mailer_is_a_quiet_noop() {
        ensure_logging();
        let mailer = Mailer::new(None, None, None, "portal@example.com").unwrap();
        mailer.send("parent@example.com", "Hello", "body".to_owned())
            .await
            .unwrap();
    }
}
