//! The enumerations a mailing is described with.

string_enum! {
    /// Whether a mailing goes to test addresses or to clients.
    pub enum MailingMode {
        Test => "test",
        Prod => "prod",
    }
}

string_enum! {
    /// The kind of mailing; selects the email template family and the recipient strategy.
    pub enum MailingType {
        StandardMailing => "standard_mailing",
        Hotfix => "hotfix",
    }
}

string_enum! {
    /// Which product generation or platform a release concerns.
    pub enum ReleaseType {
        Release2x => "release2x",
        Release3x => "release3x",
        ReleaseAndroid2x => "releaseAndroid2x",
        ReleaseAndroid3x => "releaseAndroid3x",
        ReleaseIpad2x => "releaseiPad2x",
        ReleaseIpad3x => "releaseiPad3x",
        ReleaseModule => "releaseModule",
        ReleaseIntegration => "releaseIntegration",
    }
}

impl ReleaseType {
    /// The server version prefix of the clients this release concerns, if it is tied to a
    /// product generation.
    pub fn version_prefix(self) -> Option<&'static str> {
        match self {
            ReleaseType::Release2x | ReleaseType::ReleaseAndroid2x | ReleaseType::ReleaseIpad2x => {
                Some("2.")
            }
            ReleaseType::Release3x | ReleaseType::ReleaseAndroid3x | ReleaseType::ReleaseIpad3x => {
                Some("3.")
            }
            ReleaseType::ReleaseModule | ReleaseType::ReleaseIntegration => None,
        }
    }

    /// The platform a hotfix of this release type ships on.
    pub fn platform(self) -> Option<Component> {
        match self {
            ReleaseType::Release2x | ReleaseType::Release3x => Some(Component::Server),
            ReleaseType::ReleaseAndroid2x | ReleaseType::ReleaseAndroid3x => {
                Some(Component::Android)
            }
            ReleaseType::ReleaseIpad2x | ReleaseType::ReleaseIpad3x => Some(Component::Ipad),
            ReleaseType::ReleaseModule | ReleaseType::ReleaseIntegration => None,
        }
    }
}

string_enum! {
    /// The lifecycle of a mailing.
    pub enum MailingStatus {
        Draft => "draft",
        Pending => "pending",
        Queued => "queued",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
    }
}

impl MailingStatus {
    /// The human-readable name of the status.
    pub fn label(self) -> &'static str {
        match self {
            MailingStatus::Draft => "Draft",
            MailingStatus::Pending => "Pending",
            MailingStatus::Queued => "Queued",
            MailingStatus::InProgress => "In progress",
            MailingStatus::Completed => "Completed",
            MailingStatus::Failed => "Failed",
        }
    }

    /// The label for a stored status code; unknown codes are shown as-is.
    pub fn display(code: &str) -> String {
        code.parse::<MailingStatus>()
            .map(|status| status.label().to_string())
            .unwrap_or_else(|_| code.to_string())
    }
}

string_enum! {
    /// The delivery state of a single recipient.
    pub enum RecipientStatus {
        Pending => "pending",
        Sent => "sent",
        Error => "error",
    }
}

string_enum! {
    /// The severity of a mailing journal entry.
    pub enum LogLevel {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

impl LogLevel {
    /// The `log` crate level entries of this severity are also emitted at.
    pub fn log_level(self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Critical => log::Level::Error,
        }
    }
}

string_enum! {
    /// A product component with its own version and release notes.
    pub enum Component {
        Server => "server",
        Ipad => "ipad",
        Android => "android",
    }
}

impl Component {
    pub fn name(self) -> &'static str {
        match self {
            Component::Server => "Server",
            Component::Ipad => "iPad",
            Component::Android => "Android",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for release in ReleaseType::ALL {
            assert_eq!(release.as_str().parse::<ReleaseType>().unwrap(), *release);
        }
        assert!("release4x".parse::<ReleaseType>().is_err());
    }

    #[test]
    fn status_display_falls_back_to_code() {
        assert_eq!(MailingStatus::display("in_progress"), "In progress");
        assert_eq!(MailingStatus::display("archived"), "archived");
    }

    #[test]
    fn release_generations() {
        assert_eq!(ReleaseType::ReleaseIpad2x.version_prefix(), Some("2."));
        assert_eq!(ReleaseType::Release3x.version_prefix(), Some("3."));
        assert_eq!(ReleaseType::ReleaseModule.version_prefix(), None);
        assert_eq!(ReleaseType::ReleaseAndroid3x.platform(), Some(Component::Android));
    }
}
