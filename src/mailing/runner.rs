//! Running mailings from start to finish.

use std::fmt::Display;

use diesel::sqlite::SqliteConnection;
use lettre::Transport;

use crate::config::MailSettings;
use crate::db::mailings::{
    begin_run, get_mailing, pending_recipients, record_delivery, set_status,
};
use crate::db::models::Mailing;
use crate::db::DB;
use crate::mail::sender::{EmailRequest, EmailSender};
use crate::mail::Resources;
use crate::mailer::Mailer;
use crate::mailing::journal::{EventLog, MailingJournal, ProcessLog};
use crate::mailing::strategy::{RecipientStrategy, Selection, DEFAULT_LANGUAGE};
use crate::mailing::types::{LogLevel, MailingMode, MailingStatus, MailingType};
use crate::util::log_err;
use crate::{Error, ErrorKind, Result};

/// How a mailing run went.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub sent: usize,
    pub failed: usize,
}

/// Selects the recipients of a mailing with the strategy its settings call for.
pub fn generate_recipients(conn: &mut SqliteConnection, mailing_id: i32) -> Result<Selection> {
    let mailing = get_mailing(conn, mailing_id)?;
    let strategy = RecipientStrategy::for_mailing(&mailing);
    if !strategy.is_configured() {
        return Err(ErrorKind::StrategyNotConfigured(mailing.mailing_type).into());
    }

    let selection = strategy.execute(conn, &mailing)?;
    MailingJournal::new(conn, mailing_id).info(&format!(
        "The {} strategy selected {} recipient(s).",
        strategy.name(),
        selection.count
    ));
    Ok(selection)
}

/// Why a started run stopped early. The message ends up in the mailing's `error_message`.
struct Aborted {
    message: String,
    err: Error,
}

impl Aborted {
    fn new(message: String, err: Error) -> Aborted {
        Aborted { message, err }
    }
}

impl From<Error> for Aborted {
    fn from(err: Error) -> Aborted {
        Aborted {
            message: err.to_string(),
            err,
        }
    }
}

/// Marks a mailing failed, journaling why.
fn abort(conn: &mut SqliteConnection, mailing_id: i32, message: &str) {
    if let Err(err) = set_status(conn, mailing_id, MailingStatus::Failed, Some(message)) {
        log_err(&err);
    }
    MailingJournal::new(conn, mailing_id).error(message);
}

/// Sends a mailing to every recipient still pending.
///
/// The mailing moves to `in_progress`, then to `completed`, or to `failed` if it could not run
/// or any send failed. A mailing that is already running or finished is left alone. Production
/// recipients are generated first if they haven't been yet. `connect` creates the mailer from
/// the `MAIL_SETTINGS` of the configuration.
pub fn run_mailing<T, F>(db: &DB, res: &Resources, connect: F, mailing_id: i32) -> Result<Outcome>
where
    F: FnOnce(&MailSettings) -> Result<Mailer<T>>,
    T: Transport,
    T::Error: Display,
{
    let mut pooled = db.get()?;
    let conn: &mut SqliteConnection = &mut pooled;

    let mailing = get_mailing(conn, mailing_id)?;
    let mode = mailing.mode()?;
    if !begin_run(conn, mailing_id)? {
        return Err(ErrorKind::AlreadyStarted(mailing_id).into());
    }
    MailingJournal::new(conn, mailing_id).info(&format!(
        "Mailing started (mode: {}, language: {}).",
        mode,
        mailing.language_or_default()
    ));

    match deliver(conn, res, connect, &mailing, mode) {
        Ok(outcome) => Ok(outcome),
        Err(aborted) => {
            abort(conn, mailing_id, &aborted.message);
            Err(aborted.err)
        }
    }
}

fn deliver<T, F>(
    conn: &mut SqliteConnection,
    res: &Resources,
    connect: F,
    mailing: &Mailing,
    mode: MailingMode,
) -> ::std::result::Result<Outcome, Aborted>
where
    F: FnOnce(&MailSettings) -> Result<Mailer<T>>,
    T: Transport,
    T::Error: Display,
{
    let mailing_id = mailing.id;
    if mode == MailingMode::Prod && !mailing.recipients_generated {
        let strategy = RecipientStrategy::for_mailing(mailing);
        generate_recipients(conn, mailing_id)
            .map_err(|err| Aborted::new(format!("Could not select recipients: {}", err), err))?;
        if matches!(
            strategy,
            RecipientStrategy::ServiceWindow | RecipientStrategy::Saas
        ) {
            set_status(conn, mailing_id, MailingStatus::Completed, None)?;
            return Ok(Outcome::default());
        }
    }

    let pending = pending_recipients(conn, mailing_id, mode)?;
    if pending.is_empty() {
        let message = format!("Mailing {} aborted: no recipients.", mailing_id);
        return Err(Error::from(ErrorKind::InvalidData(message)).into());
    }

    let mailer = res
        .settings
        .mail()
        .and_then(|mail| connect(&mail))
        .map_err(|err| Aborted::new(format!("SMTP error: {}", err), err))?;

    let mut outcome = Outcome::default();
    for recipient in &pending {
        let language = match mode {
            MailingMode::Test => mailing.language_or_default().to_string(),
            MailingMode::Prod => recipient
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        };
        let sender = EmailSender::new(EmailRequest {
            emails: vec![recipient.email.clone()],
            mailing_type: mailing.mailing_type.clone(),
            release_type: mailing.release_type.clone(),
            server_version: mailing.server_version.clone(),
            ipad_version: mailing.ipad_version.clone(),
            android_version: mailing.android_version.clone(),
            language,
        });

        let sent = sender.send_email(&mailer, res, &mut MailingJournal::new(conn, mailing_id));
        match sent {
            Ok(()) => {
                record_delivery(conn, mode, recipient.id, None)?;
                outcome.sent += 1;
            }
            Err(err) => {
                let message = format!("Failed to send to {}: {}", recipient.email, err);
                MailingJournal::new(conn, mailing_id).error(&message);
                record_delivery(conn, mode, recipient.id, Some(&message))?;
                outcome.failed += 1;
            }
        }
    }

    let summary = format!(
        "Mailing finished ({} sent, {} failed).",
        outcome.sent, outcome.failed
    );
    if outcome.failed == 0 {
        set_status(conn, mailing_id, MailingStatus::Completed, None)?;
        MailingJournal::new(conn, mailing_id).record(LogLevel::Info, &summary);
    } else {
        set_status(conn, mailing_id, MailingStatus::Failed, Some(&summary))?;
        MailingJournal::new(conn, mailing_id).record(LogLevel::Error, &summary);
    }
    Ok(outcome)
}

/// Sends a release email to a list of test addresses.
pub fn send_test_email<T>(
    mailer: &Mailer<T>,
    res: &Resources,
    emails: &[String],
    request: EmailRequest,
) -> Result<()>
where
    T: Transport,
    T::Error: Display,
{
    if emails.is_empty() {
        return Err(ErrorKind::InvalidData("No test addresses given".to_string()).into());
    }
    send_mailing(
        mailer,
        res,
        EmailRequest {
            emails: emails.to_vec(),
            ..request
        },
    )
}

/// Sends a release email to a list of addresses, outside of any stored mailing. The mailing
/// type defaults to a standard mailing.
pub fn send_mailing<T>(mailer: &Mailer<T>, res: &Resources, request: EmailRequest) -> Result<()>
where
    T: Transport,
    T::Error: Display,
{
    let mailing_type = if request.mailing_type.is_empty() {
        MailingType::StandardMailing.as_str().to_string()
    } else {
        request.mailing_type
    };
    let sender = EmailSender::new(EmailRequest {
        mailing_type,
        ..request
    });
    sender.send_email(mailer, res, &mut ProcessLog)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use diesel::RunQueryDsl;
    use lettre::transport::stub::StubTransport;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;
    use url::Url;

    use super::*;
    use crate::config::Settings;
    use crate::db::clients::{add_contact, create_client};
    use crate::db::mailings::{
        add_test_recipient, claim_for_sending, create_mailing, logs, recipients,
    };
    use crate::db::models::{NewClient, NewContact, NewMailing};
    use crate::mail::attachments::AttachmentArea;
    use crate::mail::notes::DirectoryNotes;

    struct Env {
        _dir: TempDir,
        settings: Settings,
        area: AttachmentArea,
        notes: DirectoryNotes,
    }

    impl Env {
        fn resources(&self) -> Resources {
            Resources {
                settings: &self.settings,
                area: &self.area,
                notes: &self.notes,
            }
        }
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn env(with_mail_settings: bool) -> Env {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_path_buf();
        for lang in &["ru", "en"] {
            write(
                &base.join("templates/mail").join(format!("index_3x_{}.html", lang)),
                "<h1>{{ number_version }}</h1>\n{% if server_updates is string %}<p>{{ server_updates }}</p>{% endif %}\n",
            );
            write(
                &base.join("release_notes/server").join(format!("3.1.0.{}.txt", lang)),
                "BoardMaps Core:\nFaster search\n",
            );
        }
        write(&base.join("documentation/RU/guide.pdf"), "%PDF-1.4");

        let main = if with_mail_settings {
            match json!({"MAIL_SETTINGS": {"SMTP": "localhost", "FROM": "news@example.com"}}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            }
        } else {
            Map::new()
        };
        let settings = Settings::with_main_config(
            base.clone(),
            Url::parse("http://localhost:8137/").unwrap(),
            main,
        );
        Env {
            area: AttachmentArea::new(settings.attachments_dir.clone()),
            notes: DirectoryNotes::new(settings.release_notes_dir.clone()),
            settings,
            _dir: dir,
        }
    }

    fn stub_ok(mail: &MailSettings) -> Result<Mailer<StubTransport>> {
        Mailer::with_transport(StubTransport::new_ok(), &mail.from)
    }

    fn stub_err(mail: &MailSettings) -> Result<Mailer<StubTransport>> {
        Mailer::with_transport(StubTransport::new_error(), &mail.from)
    }

    /// A database with one active 3.x client that has one notified contact.
    fn database() -> DB {
        let db = DB::in_memory().unwrap();
        {
            let mut pooled = db.get().unwrap();
            let conn = &mut *pooled;
            let client = create_client(
                conn,
                &NewClient {
                    client_name: "Alpha".to_string(),
                    contact_status: true,
                    server_version: Some("3.0.4".to_string()),
                    ..NewClient::default()
                },
            )
            .unwrap();
            add_contact(
                conn,
                &NewContact {
                    client_id: client.id,
                    first_name: "Anna".to_string(),
                    last_name: "Petrova".to_string(),
                    email: "anna@alpha.ru".to_string(),
                    notification_update: true,
                    ..NewContact::default()
                },
            )
            .unwrap();
        }
        db
    }

    fn mailing(db: &DB, new: NewMailing) -> i32 {
        let mut pooled = db.get().unwrap();
        create_mailing(&mut *pooled, &new).unwrap().id
    }

    fn release_3_1_0() -> NewMailing {
        NewMailing {
            server_version: "3.1.0".to_string(),
            ..NewMailing::default()
        }
    }

    #[test]
    fn sends_to_generated_recipients() {
        let env = env(true);
        let db = database();
        let id = mailing(&db, release_3_1_0());

        let outcome = run_mailing(&db, &env.resources(), stub_ok, id).unwrap();
        assert_eq!(outcome, Outcome { sent: 1, failed: 0 });

        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;
        let mailing = get_mailing(conn, id).unwrap();
        assert_eq!(mailing.status, "completed");
        assert!(mailing.recipients_generated);
        assert!(mailing.completed_at.is_some());

        let rows = recipients(conn, id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "sent");

        let messages = logs(conn, id)
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect::<Vec<_>>();
        assert!(messages.iter().any(|m| m.starts_with("Server updates (Русский):")));
        assert!(messages.iter().any(|m| m == "Email sent to anna@alpha.ru"));
        assert_eq!(messages.last().unwrap(), "Mailing finished (1 sent, 0 failed).");

        assert!(env.settings.attachments_dir.join("RU").join("guide.pdf").is_file());
    }

    #[test]
    fn a_finished_mailing_is_not_run_again() {
        let env = env(true);
        let db = database();
        let id = mailing(&db, release_3_1_0());
        {
            let mut pooled = db.get().unwrap();
            assert!(claim_for_sending(&mut *pooled, id).unwrap());
            assert!(!claim_for_sending(&mut *pooled, id).unwrap());
        }

        let outcome = run_mailing(&db, &env.resources(), stub_ok, id).unwrap();
        assert_eq!(outcome, Outcome { sent: 1, failed: 0 });

        let err = run_mailing(&db, &env.resources(), stub_ok, id).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadyStarted(_)));

        let mut pooled = db.get().unwrap();
        let mailing = get_mailing(&mut *pooled, id).unwrap();
        assert_eq!(mailing.status, "completed");
        assert_eq!(mailing.error_message, None);
    }

    #[test]
    fn database_errors_mid_run_fail_the_mailing() {
        let env = env(true);
        let db = database();
        let id = mailing(&db, release_3_1_0());
        {
            let mut pooled = db.get().unwrap();
            diesel::sql_query(
                "CREATE TRIGGER no_deliveries BEFORE UPDATE ON mailing_recipients \
                 BEGIN SELECT RAISE(ABORT, 'disk is full'); END",
            )
            .execute(&mut *pooled)
            .unwrap();
        }

        let err = run_mailing(&db, &env.resources(), stub_ok, id).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Diesel(_)));

        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;
        let mailing = get_mailing(conn, id).unwrap();
        assert_eq!(mailing.status, "failed");
        assert!(mailing.error_message.unwrap().contains("disk is full"));
        assert!(logs(conn, id)
            .unwrap()
            .iter()
            .any(|l| l.level == "error" && l.message.contains("disk is full")));
    }

    #[test]
    fn fails_without_recipients() {
        let env = env(true);
        let db = DB::in_memory().unwrap();
        let id = mailing(&db, release_3_1_0());

        assert!(run_mailing(&db, &env.resources(), stub_ok, id).is_err());

        let mut pooled = db.get().unwrap();
        let mailing = get_mailing(&mut *pooled, id).unwrap();
        assert_eq!(mailing.status, "failed");
        assert_eq!(
            mailing.error_message.as_deref(),
            Some(&*format!("Mailing {} aborted: no recipients.", id))
        );
    }

    #[test]
    fn fails_without_mail_settings() {
        let env = env(false);
        let db = database();
        let id = mailing(&db, release_3_1_0());

        let err = run_mailing(&db, &env.resources(), stub_ok, id).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingConfig("MAIL_SETTINGS")));

        let mut pooled = db.get().unwrap();
        let mailing = get_mailing(&mut *pooled, id).unwrap();
        assert_eq!(mailing.status, "failed");
    }

    #[test]
    fn transport_errors_fail_the_mailing() {
        let env = env(true);
        let db = database();
        let id = mailing(&db, release_3_1_0());

        let outcome = run_mailing(&db, &env.resources(), stub_err, id).unwrap();
        assert_eq!(outcome, Outcome { sent: 0, failed: 1 });

        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;
        assert_eq!(get_mailing(conn, id).unwrap().status, "failed");
        let rows = recipients(conn, id).unwrap();
        assert_eq!(rows[0].status, "error");
        assert!(rows[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Failed to send to anna@alpha.ru"));
    }

    #[test]
    fn unconfigured_type_fails() {
        let env = env(true);
        let db = database();
        let id = mailing(
            &db,
            NewMailing {
                mailing_type: "newsletter".to_string(),
                ..release_3_1_0()
            },
        );

        let err = run_mailing(&db, &env.resources(), stub_ok, id).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::StrategyNotConfigured(_)));

        let mut pooled = db.get().unwrap();
        assert_eq!(get_mailing(&mut *pooled, id).unwrap().status, "failed");
    }

    #[test]
    fn test_mode_uses_the_mailing_language() {
        let env = env(true);
        let db = database();
        let id = mailing(
            &db,
            NewMailing {
                mode: "test".to_string(),
                language: Some("en".to_string()),
                ..release_3_1_0()
            },
        );
        {
            let mut pooled = db.get().unwrap();
            add_test_recipient(&mut *pooled, id, "qa@example.com").unwrap();
        }

        let outcome = run_mailing(&db, &env.resources(), stub_ok, id).unwrap();
        assert_eq!(outcome.sent, 1);

        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;
        assert!(recipients(conn, id).unwrap().is_empty());
        assert!(logs(conn, id)
            .unwrap()
            .iter()
            .any(|l| l.message.starts_with("Server updates (Английский):")));
    }

    #[test]
    fn service_window_completes_without_sending() {
        let env = env(true);
        let db = database();
        let id = mailing(
            &db,
            NewMailing {
                service_window: true,
                ..release_3_1_0()
            },
        );

        let outcome = run_mailing(&db, &env.resources(), stub_ok, id).unwrap();
        assert_eq!(outcome, Outcome::default());

        let mut pooled = db.get().unwrap();
        assert_eq!(get_mailing(&mut *pooled, id).unwrap().status, "completed");
    }

    #[test]
    fn test_email_goes_through_the_transport() {
        let env = env(true);
        let mailer = stub_ok(&env.settings.mail().unwrap()).unwrap();
        send_test_email(
            &mailer,
            &env.resources(),
            &["qa@example.com".to_string()],
            EmailRequest {
                server_version: "3.1.0".to_string(),
                language: "en".to_string(),
                ..EmailRequest::default()
            },
        )
        .unwrap();

        let messages = mailer.transport().messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("Subject: BoardMaps Update 3.1.0"));
        assert!(messages[0].1.contains("Faster search"));
    }

    #[test]
    fn test_email_keeps_the_mailing_type() {
        let env = env(true);
        write(
            &env.settings.templates_dir.join("index_3x_hotfix_server_en.html"),
            "<h1>Hotfix {{ number_version }}</h1>",
        );
        let mailer = stub_ok(&env.settings.mail().unwrap()).unwrap();
        send_test_email(
            &mailer,
            &env.resources(),
            &["qa@example.com".to_string(), "dev@example.com".to_string()],
            EmailRequest {
                mailing_type: "hotfix".to_string(),
                server_version: "3.1.0".to_string(),
                language: "en".to_string(),
                ..EmailRequest::default()
            },
        )
        .unwrap();

        let messages = mailer.transport().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0.to().len(), 2);
        assert!(messages[0].1.contains("Hotfix 3.1.0"));

        assert!(send_test_email(&mailer, &env.resources(), &[], EmailRequest::default()).is_err());
    }

    #[test]
    fn missing_release_notes_are_an_error() {
        let env = env(true);
        let mailer = stub_ok(&env.settings.mail().unwrap()).unwrap();
        let err = send_mailing(
            &mailer,
            &env.resources(),
            EmailRequest {
                emails: vec!["qa@example.com".to_string()],
                release_type: "release2x".to_string(),
                server_version: "2.45.0".to_string(),
                ..EmailRequest::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ReleaseNotesMissing { .. }));
        assert!(mailer.transport().messages().is_empty());
    }
}
