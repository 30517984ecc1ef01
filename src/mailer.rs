use crate::config::SmtpConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::error::Error;

/// SMTP client for the account-confirmation emails
///
/// Built once at startup from [`SmtpConfig`]; when mail is not configured the
/// application carries no `Mailer` at all and registration points users at
/// the resend page instead.
pub struct Mailer {
    smtp: SmtpTransport,
    from: String,
}

impl Mailer {
    /// Build a STARTTLS transport against the configured relay
    ///
    /// # Arguments
    /// * `config` - SMTP server, port and credentials from the environment
    pub fn new(config: &SmtpConfig) -> Result<Self, Box<dyn Error>> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let tls_parameters = TlsParameters::new(config.server.clone())?;

        let smtp = SmtpTransport::relay(&config.server)?
            .credentials(creds)
            .port(config.port)
            .tls(Tls::Required(tls_parameters))
            .build();

        Ok(Mailer {
            smtp,
            from: config.from.clone(),
        })
    }

    /// Send the email-confirmation message for a fresh registration
    ///
    /// # Arguments
    /// * `to_email` - Recipient address
    /// * `username` - Name used in the greeting
    /// * `confirm_url` - Absolute link to the confirmation endpoint
    pub fn send_confirmation(
        &self,
        to_email: &str,
        username: &str,
        confirm_url: &str,
    ) -> Result<(), Box<dyn Error>> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to_email.parse()?)
            .subject("Confirm your FreeLytix account")
            .body(format!(
                "Hi {},\n\nWelcome to FreeLytix! Please confirm your email address by clicking the link below:\n\n{}\n\nThe link expires in 1 hour. If you didn't sign up, just ignore this email.\n\nThanks,\nFreeLytix Team",
                username, confirm_url
            ))?;

        self.smtp.send(&email)?;
        Ok(())
    }
}
