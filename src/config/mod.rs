//! Process configuration.
//!
//! [`Settings`] is built once at startup and handed by reference to everything that needs it.

pub mod main_config;

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::{ErrorKind, Result};

/// The login page unauthenticated users are redirected to.
pub const DEFAULT_LOGIN_URL: &str = "/auth/local-login/";

/// Everything the web layer, the worker and the mail pipeline need to know about their
/// environment.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The application's base directory; `Main.config` is looked up relative to it.
    pub base_dir: PathBuf,

    /// The public URL of the site, exposed to templates.
    pub base_url: Url,

    /// Where unauthenticated requests get redirected.
    pub login_url: String,

    /// Email templates, with an `Images` subdirectory for inline images.
    pub templates_dir: PathBuf,

    /// The shared working directory attachments are staged into before each send.
    pub attachments_dir: PathBuf,

    /// Per-language documentation (`<dir>/<LANG>/*`) that gets attached to mailings.
    pub documentation_dir: PathBuf,

    /// Release notes, as `<dir>/<component>/<version>.<language>.txt`.
    pub release_notes_dir: PathBuf,

    /// Files served under `/static/`.
    pub static_dir: PathBuf,

    /// The contents of `Main.config`; possibly empty.
    pub main: Map<String, Value>,
}

impl Settings {
    /// Creates settings with the conventional directory layout under `base_dir`, loading
    /// `Main.config` from its candidate locations.
    pub fn for_base_dir(base_dir: PathBuf, base_url: Url) -> Settings {
        let main = main_config::load(&base_dir);
        Settings::with_main_config(base_dir, base_url, main)
    }

    /// Like `for_base_dir`, but with an already loaded configuration mapping.
    pub fn with_main_config(base_dir: PathBuf, base_url: Url, main: Map<String, Value>) -> Settings {
        Settings {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            templates_dir: base_dir.join("templates").join("mail"),
            attachments_dir: base_dir.join("var").join("attachment"),
            documentation_dir: base_dir.join("documentation"),
            release_notes_dir: base_dir.join("release_notes"),
            static_dir: base_dir.join("static"),
            base_dir,
            base_url,
            main,
        }
    }

    /// The SMTP settings from `Main.config`.
    pub fn mail(&self) -> Result<MailSettings> {
        MailSettings::from_config(&self.main)
    }

    /// The directory inline images are read from.
    pub fn images_dir(&self) -> PathBuf {
        self.templates_dir.join("Images")
    }
}

/// The `MAIL_SETTINGS` section of `Main.config`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct MailSettings {
    #[serde(rename = "SMTP")]
    pub host: String,

    #[serde(rename = "PORT", default = "default_port")]
    pub port: u16,

    #[serde(rename = "USER", default)]
    pub user: String,

    #[serde(rename = "PASSWORD", default)]
    pub password: String,

    #[serde(rename = "FROM")]
    pub from: String,

    /// STARTTLS on a plain connection. Ignored when `use_ssl` is set.
    #[serde(rename = "USE_TLS", default = "default_use_tls")]
    pub use_tls: bool,

    /// Implicit TLS.
    #[serde(rename = "USE_SSL", default)]
    pub use_ssl: bool,
}

fn default_port() -> u16 {
    587
}

fn default_use_tls() -> bool {
    true
}

impl MailSettings {
    /// Extracts the mail settings from a `Main.config` mapping.
    pub fn from_config(config: &Map<String, Value>) -> Result<MailSettings> {
        let section = config
            .get("MAIL_SETTINGS")
            .ok_or(ErrorKind::MissingConfig("MAIL_SETTINGS"))?;
        Ok(serde_json::from_value(section.clone())?)
    }
}
