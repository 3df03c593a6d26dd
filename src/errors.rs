use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

use thiserror::Error;

/// A convenient alias for Result.
pub type Result<T> = ::std::result::Result<T, Error>;

/// The kind of an application error.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Invalid data was supplied, e.g. a mailing without any version.
    #[error("{0}")]
    InvalidData(String),

    /// A required key is absent from the configuration.
    #[error("Missing configuration key {0}")]
    MissingConfig(&'static str),

    /// No recipient strategy exists for the mailing's type.
    #[error("Recipient strategy not configured for mailing type {0:?}")]
    StrategyNotConfigured(String),

    /// No email template exists for the mailing/release type pair.
    #[error("No template for release_type={release_type}, mailing_type={mailing_type}, language={language}")]
    TemplateNotFound {
        mailing_type: String,
        release_type: String,
        language: String,
    },

    /// Release notes for a component version could not be found.
    #[error("No release notes for {component} {version} ({language})")]
    ReleaseNotesMissing {
        component: &'static str,
        version: String,
        language: String,
    },

    /// The background worker did not answer.
    #[error("Worker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The mailing with the given ID does not exist.
    #[error("Mailing {0} not found")]
    MailingNotFound(i32),

    /// The mailing has already been run or is running.
    #[error("Mailing {0} has already been started")]
    AlreadyStarted(i32),

    /// A password could not be hashed.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// A login attempt used a wrong username or password.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// An error from Diesel.
    #[error("Diesel error: {0}")]
    Diesel(#[from] diesel::result::Error),

    /// An error connecting to the database.
    #[error("Connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    /// An error from R2D2.
    #[error("R2D2 error: {0}")]
    R2D2(#[from] diesel::r2d2::PoolError),

    /// An error applying the embedded migrations.
    #[error("Migration error: {0}")]
    Migration(String),

    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error (de)serializing JSON data.
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error from the Tera template engine.
    #[error("Template error: {0}")]
    Tera(#[from] tera::Error),

    /// An invalid email address.
    #[error("Address error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// An error from Lettre's message builder.
    #[error("Mail builder error: {0}")]
    Mail(String),

    /// An error from the mail transport.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// An error when constructing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// An error from the HTTP server.
    #[error("HTTP server error: {0}")]
    Hyper(#[from] hyper::Error),

    /// A blocking task panicked or was cancelled.
    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<lettre::error::Error> for ErrorKind {
    fn from(err: lettre::error::Error) -> ErrorKind {
        ErrorKind::Mail(err.to_string())
    }
}

/// An application error.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Whether the error means the database could not be reached at all, as opposed to a failed
    /// query.
    pub fn is_database_unavailable(&self) -> bool {
        match self.kind {
            ErrorKind::R2D2(_) | ErrorKind::Connection(_) => true,
            ErrorKind::Diesel(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::ClosedConnection,
                _,
            )) => true,
            _ => false,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        Display::fmt(&self.kind, f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.kind.source()
    }
}

impl<E: Into<ErrorKind>> From<E> for Error {
    fn from(err: E) -> Error {
        Error { kind: err.into() }
    }
}
