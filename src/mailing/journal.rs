//! Where the events of a mailing get recorded.

use diesel::sqlite::SqliteConnection;

use crate::db::mailings::append_log;
use crate::mailing::types::LogLevel;
use crate::util::log_err;

/// A sink for the events of a mailing run.
pub trait EventLog {
    fn record(&mut self, level: LogLevel, message: &str);

    fn info(&mut self, message: &str) {
        self.record(LogLevel::Info, message)
    }

    fn error(&mut self, message: &str) {
        self.record(LogLevel::Error, message)
    }
}

/// Records events in the process log only.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessLog;

impl EventLog for ProcessLog {
    fn record(&mut self, level: LogLevel, message: &str) {
        log!(level.log_level(), "{}", message);
    }
}

/// Records events in the process log and in a mailing's journal.
pub struct MailingJournal<'c> {
    conn: &'c mut SqliteConnection,
    mailing_id: i32,
}

impl<'c> MailingJournal<'c> {
    pub fn new(conn: &'c mut SqliteConnection, mailing_id: i32) -> MailingJournal<'c> {
        MailingJournal { conn, mailing_id }
    }
}

impl<'c> EventLog for MailingJournal<'c> {
    fn record(&mut self, level: LogLevel, message: &str) {
        log!(level.log_level(), "[mailing {}] {}", self.mailing_id, message);
        if let Err(err) = append_log(self.conn, self.mailing_id, level, message) {
            log_err(&err);
        }
    }
}

/// Formats a list of release notes for the log.
///
/// Entries of the form `module: change. change.` are split into the module and its changes;
/// other entries are listed as-is.
pub fn format_updates<S: AsRef<str>>(message: &str, updates: &[S], language: &str) -> String {
    let mut out = format!("{} ({}):\n", message, language);
    for entry in updates {
        let entry = entry.as_ref();
        match entry.find(':') {
            Some(idx) => {
                out.push_str(&format!("  - {}:\n", &entry[..idx]));
                let rest = &entry[idx + 1..];
                let changes = rest.split(':').next().unwrap_or("");
                for change in changes.split('.').map(str::trim).filter(|c| !c.is_empty()) {
                    out.push_str(&format!("      - {}.\n", change));
                }
            }
            None => out.push_str(&format!("  - {}.\n", entry)),
        }
    }
    out.trim().to_string()
}

/// Records a formatted list of release notes at info level.
pub fn log_updates<S: AsRef<str>>(
    sink: &mut dyn EventLog,
    message: &str,
    updates: &[S],
    language: &str,
) {
    sink.info(&format_updates(message, updates, language));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorded(Vec<(LogLevel, String)>);

    impl EventLog for Recorded {
        fn record(&mut self, level: LogLevel, message: &str) {
            self.0.push((level, message.to_string()));
        }
    }

    #[test]
    fn splits_modules_and_changes() {
        let formatted = format_updates(
            "Server updates",
            &["Core: Faster search. New icons.", "Bug fixes"],
            "Английский",
        );
        assert_eq!(
            formatted,
            "Server updates (Английский):\n  - Core:\n      - Faster search.\n      - New icons.\n  - Bug fixes."
        );
    }

    #[test]
    fn only_first_colon_splits() {
        let formatted = format_updates("Notes", &["Module: a. b: c"], "Русский");
        assert_eq!(formatted, "Notes (Русский):\n  - Module:\n      - a.\n      - b.");
    }

    #[test]
    fn empty_list_is_just_the_heading() {
        assert_eq!(format_updates::<&str>("Notes", &[], "ru"), "Notes (ru):");
    }

    #[test]
    fn logs_at_info() {
        let mut sink = Recorded::default();
        log_updates(&mut sink, "iPad updates", &["Dark mode"], "Русский");
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].0, LogLevel::Info);
        assert!(sink.0[0].1.ends_with("  - Dark mode."));
    }

    #[test]
    fn journal_writes_rows() {
        let db = crate::db::DB::in_memory().unwrap();
        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;
        let mailing = crate::db::mailings::create_mailing(
            conn,
            &crate::db::models::NewMailing {
                server_version: "3.0.0".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        MailingJournal::new(conn, mailing.id).error("SMTP refused");
        let logs = crate::db::mailings::logs(conn, mailing.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, "error");
        assert_eq!(logs[0].message, "SMTP refused");
    }
}
