#![cfg(not(tarpaulin_include))]

use crate::config::SmtpSettings;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::error::Error;

/// Sends account mail through an SMTP relay
pub struct Mailer {
    smtp: SmtpTransport,
    from: Mailbox,
    app_name: String,
}

impl Mailer {
    /// Connects settings to a TLS-wrapped relay; nothing is sent until a mail goes out.
    ///
    /// # Errors
    /// * Returns an error if the sender address or TLS parameters are invalid
    pub fn new(settings: &SmtpSettings, app_name: &str) -> Result<Self, Box<dyn Error>> {
        let tls_parameters = TlsParameters::new(settings.host.clone())?;

        let mut builder = SmtpTransport::relay(&settings.host)?
            .port(settings.port)
            .tls(Tls::Wrapper(tls_parameters));
        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Mailer {
            smtp: builder.build(),
            from: settings.from.parse()?,
            app_name: app_name.to_string(),
        })
    }

    /// Mails a password recovery code to `to_email`.
    pub fn send_recovery_code(&self, to_email: &str, code: &str) -> Result<(), Box<dyn Error>> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to_email.parse()?)
            .subject(format!("{} password reset", self.app_name))
            .body(format!(
                "Your password reset code is: {}\nThis code will expire in 1 hour.",
                code
            ))?;

        self.smtp.send(&email)?;
        Ok(())
    }
}
