use std::fmt::Display;

use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, Message, SmtpTransport,
    Transport,
};

use crate::config::MailSettings;
use crate::{ErrorKind, Result};

/// The mailer: a transport and the address mail is sent from.
pub struct Mailer<T = SmtpTransport> {
    transport: T,
    from: Mailbox,
}

impl Mailer<SmtpTransport> {
    /// Creates a mailer sending over SMTP. No connection is made until the first send.
    pub fn connect(settings: &MailSettings) -> Result<Mailer> {
        let builder = if settings.use_ssl {
            SmtpTransport::relay(&settings.host)
        } else if settings.use_tls {
            SmtpTransport::starttls_relay(&settings.host)
        } else {
            Ok(SmtpTransport::builder_dangerous(&settings.host))
        };
        let mut builder = builder
            .map_err(|e| ErrorKind::Smtp(e.to_string()))?
            .port(settings.port);
        if !settings.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ));
        }
        Mailer::with_transport(builder.build(), &settings.from)
    }
}

impl<T> Mailer<T>
where
    T: Transport,
    T::Error: Display,
{
    /// Creates a mailer on top of an existing transport.
    pub fn with_transport(transport: T, from: &str) -> Result<Mailer<T>> {
        Ok(Mailer {
            transport,
            from: from.parse()?,
        })
    }

    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a message. A single attempt is made.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.transport
            .send(message)
            .map(|_| ())
            .map_err(|e| ErrorKind::Smtp(e.to_string()).into())
    }
}
