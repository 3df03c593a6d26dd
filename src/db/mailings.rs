//! Mailings, their recipients and their journal.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::models::{
    Component, Mailing, MailingLog, MailingRecipient, MailingTestRecipient, NewMailing,
    NewMailingLog, NewMailingRecipient, NewMailingTestRecipient,
};
use crate::db::schema::{
    components, mailing_components, mailing_logs, mailing_recipients, mailing_test_recipients,
    mailings,
};
use crate::mailing::types::{
    LogLevel, MailingMode, MailingStatus, RecipientStatus, ReleaseType,
};
use crate::{ErrorKind, Result};

/// A recipient still waiting for its email, in either recipient table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRecipient {
    pub id: i32,
    pub email: String,
    /// The client's language; test recipients have none.
    pub language: Option<String>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Creates a mailing and links it to the components it has versions for.
///
/// The mode and release type must be known codes and at least one version must be given. The
/// mailing type is stored as-is, so that mailings of types without a recipient strategy can
/// still be recorded and fail at dispatch.
pub fn create_mailing(conn: &mut SqliteConnection, new: &NewMailing) -> Result<Mailing> {
    new.mode.parse::<MailingMode>()?;
    new.release_type.parse::<ReleaseType>()?;
    new.status.parse::<MailingStatus>()?;
    if new.server_version.is_empty() && new.ipad_version.is_empty() && new.android_version.is_empty()
    {
        return Err(ErrorKind::InvalidData("A mailing needs at least one version".to_string()).into());
    }

    conn.transaction::<_, crate::Error, _>(|conn| {
        let mailing = diesel::insert_into(mailings::table)
            .values(new)
            .returning(Mailing::as_returning())
            .get_result(conn)?;

        let codes = [
            ("server", &new.server_version),
            ("ipad", &new.ipad_version),
            ("android", &new.android_version),
        ]
        .iter()
        .filter(|(_, version)| !version.is_empty())
        .map(|(code, _)| *code)
        .collect::<Vec<&str>>();
        let component_ids: Vec<i32> = components::table
            .filter(components::code.eq_any(codes))
            .select(components::id)
            .load(conn)?;
        for component_id in component_ids {
            diesel::insert_into(mailing_components::table)
                .values((
                    mailing_components::mailing_id.eq(mailing.id),
                    mailing_components::component_id.eq(component_id),
                ))
                .execute(conn)?;
        }
        Ok(mailing)
    })
}

pub fn get_mailing(conn: &mut SqliteConnection, id: i32) -> Result<Mailing> {
    mailings::table
        .find(id)
        .select(Mailing::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ErrorKind::MailingNotFound(id).into())
}

/// Every mailing, newest first.
pub fn list_mailings(conn: &mut SqliteConnection) -> Result<Vec<Mailing>> {
    Ok(mailings::table
        .order((mailings::created_at.desc(), mailings::id.desc()))
        .select(Mailing::as_select())
        .load(conn)?)
}

pub fn mailing_components(conn: &mut SqliteConnection, mailing_id: i32) -> Result<Vec<Component>> {
    Ok(mailing_components::table
        .inner_join(components::table)
        .filter(mailing_components::mailing_id.eq(mailing_id))
        .order(components::id.asc())
        .select(Component::as_select())
        .load(conn)?)
}

/// Moves a mailing to a new status, stamping `started_at` or `completed_at` as appropriate.
pub fn set_status(
    conn: &mut SqliteConnection,
    mailing_id: i32,
    status: MailingStatus,
    error_message: Option<&str>,
) -> Result<()> {
    let target = mailings::table.find(mailing_id);
    let updated = match status {
        MailingStatus::InProgress => diesel::update(target)
            .set((
                mailings::status.eq(status.as_str()),
                mailings::started_at.eq(now()),
            ))
            .execute(conn)?,
        MailingStatus::Completed | MailingStatus::Failed => diesel::update(target)
            .set((
                mailings::status.eq(status.as_str()),
                mailings::completed_at.eq(now()),
                mailings::error_message.eq(error_message),
            ))
            .execute(conn)?,
        MailingStatus::Draft | MailingStatus::Pending | MailingStatus::Queued => {
            diesel::update(target)
                .set(mailings::status.eq(status.as_str()))
                .execute(conn)?
        }
    };
    if updated == 0 {
        return Err(ErrorKind::MailingNotFound(mailing_id).into());
    }
    Ok(())
}

/// Moves a draft or pending mailing to `queued`. Returns false when the mailing has already
/// been queued or started.
pub fn claim_for_sending(conn: &mut SqliteConnection, mailing_id: i32) -> Result<bool> {
    let startable = [MailingStatus::Draft.as_str(), MailingStatus::Pending.as_str()];
    move_status(conn, mailing_id, &startable, MailingStatus::Queued)
}

/// Puts a queued mailing back to `pending`, for when it could not be handed to the worker.
pub fn release_claim(conn: &mut SqliteConnection, mailing_id: i32) -> Result<bool> {
    move_status(
        conn,
        mailing_id,
        &[MailingStatus::Queued.as_str()],
        MailingStatus::Pending,
    )
}

/// Moves a mailing that hasn't started yet to `in_progress`, stamping `started_at`. Returns
/// false when the mailing is already running or finished.
pub fn begin_run(conn: &mut SqliteConnection, mailing_id: i32) -> Result<bool> {
    let startable = [
        MailingStatus::Draft.as_str(),
        MailingStatus::Pending.as_str(),
        MailingStatus::Queued.as_str(),
    ];
    let updated = diesel::update(
        mailings::table
            .filter(mailings::id.eq(mailing_id))
            .filter(mailings::status.eq_any(startable)),
    )
    .set((
        mailings::status.eq(MailingStatus::InProgress.as_str()),
        mailings::started_at.eq(now()),
    ))
    .execute(conn)?;
    if updated == 0 {
        get_mailing(conn, mailing_id)?;
        return Ok(false);
    }
    Ok(true)
}

/// Compare-and-set on the status column.
fn move_status(
    conn: &mut SqliteConnection,
    mailing_id: i32,
    from: &[&str],
    to: MailingStatus,
) -> Result<bool> {
    let updated = diesel::update(
        mailings::table
            .filter(mailings::id.eq(mailing_id))
            .filter(mailings::status.eq_any(from)),
    )
    .set(mailings::status.eq(to.as_str()))
    .execute(conn)?;
    if updated == 0 {
        get_mailing(conn, mailing_id)?;
        return Ok(false);
    }
    Ok(true)
}

pub fn mark_recipients_generated(conn: &mut SqliteConnection, mailing_id: i32) -> Result<()> {
    diesel::update(mailings::table.find(mailing_id))
        .set(mailings::recipients_generated.eq(true))
        .execute(conn)?;
    Ok(())
}

pub fn add_recipient(conn: &mut SqliteConnection, new: &NewMailingRecipient) -> Result<()> {
    diesel::insert_into(mailing_recipients::table)
        .values(new)
        .execute(conn)?;
    Ok(())
}

pub fn add_test_recipient(conn: &mut SqliteConnection, mailing_id: i32, email: &str) -> Result<()> {
    diesel::insert_into(mailing_test_recipients::table)
        .values(&NewMailingTestRecipient { mailing_id, email })
        .execute(conn)?;
    Ok(())
}

pub fn recipients(conn: &mut SqliteConnection, mailing_id: i32) -> Result<Vec<MailingRecipient>> {
    Ok(mailing_recipients::table
        .filter(mailing_recipients::mailing_id.eq(mailing_id))
        .order(mailing_recipients::id.asc())
        .select(MailingRecipient::as_select())
        .load(conn)?)
}

pub fn test_recipients(
    conn: &mut SqliteConnection,
    mailing_id: i32,
) -> Result<Vec<MailingTestRecipient>> {
    Ok(mailing_test_recipients::table
        .filter(mailing_test_recipients::mailing_id.eq(mailing_id))
        .order(mailing_test_recipients::id.asc())
        .select(MailingTestRecipient::as_select())
        .load(conn)?)
}

/// The recipients of a mailing that have not been sent to yet: the test recipients in test
/// mode, the client recipients otherwise.
pub fn pending_recipients(
    conn: &mut SqliteConnection,
    mailing_id: i32,
    mode: MailingMode,
) -> Result<Vec<PendingRecipient>> {
    let pending = RecipientStatus::Pending.as_str();
    let recipients = match mode {
        MailingMode::Test => mailing_test_recipients::table
            .filter(mailing_test_recipients::mailing_id.eq(mailing_id))
            .filter(mailing_test_recipients::status.eq(pending))
            .order(mailing_test_recipients::id.asc())
            .select((mailing_test_recipients::id, mailing_test_recipients::email))
            .load::<(i32, String)>(conn)?
            .into_iter()
            .map(|(id, email)| PendingRecipient {
                id,
                email,
                language: None,
            })
            .collect(),
        MailingMode::Prod => mailing_recipients::table
            .filter(mailing_recipients::mailing_id.eq(mailing_id))
            .filter(mailing_recipients::status.eq(pending))
            .order(mailing_recipients::id.asc())
            .select((
                mailing_recipients::id,
                mailing_recipients::email,
                mailing_recipients::language,
            ))
            .load::<(i32, String, String)>(conn)?
            .into_iter()
            .map(|(id, email, language)| PendingRecipient {
                id,
                email,
                language: Some(language),
            })
            .collect(),
    };
    Ok(recipients)
}

/// Records the outcome of a send. `error_message` is `None` on success.
pub fn record_delivery(
    conn: &mut SqliteConnection,
    mode: MailingMode,
    recipient_id: i32,
    error_message: Option<&str>,
) -> Result<()> {
    let (status, sent_at) = match error_message {
        None => (RecipientStatus::Sent, Some(now())),
        Some(_) => (RecipientStatus::Error, None),
    };
    match mode {
        MailingMode::Test => diesel::update(mailing_test_recipients::table.find(recipient_id))
            .set((
                mailing_test_recipients::status.eq(status.as_str()),
                mailing_test_recipients::sent_at.eq(sent_at),
                mailing_test_recipients::error_message.eq(error_message),
            ))
            .execute(conn)?,
        MailingMode::Prod => diesel::update(mailing_recipients::table.find(recipient_id))
            .set((
                mailing_recipients::status.eq(status.as_str()),
                mailing_recipients::sent_at.eq(sent_at),
                mailing_recipients::error_message.eq(error_message),
            ))
            .execute(conn)?,
    };
    Ok(())
}

/// Appends an entry to a mailing's journal.
pub fn append_log(
    conn: &mut SqliteConnection,
    mailing_id: i32,
    level: LogLevel,
    message: &str,
) -> Result<()> {
    diesel::insert_into(mailing_logs::table)
        .values(&NewMailingLog {
            mailing_id,
            level: level.as_str(),
            message,
        })
        .execute(conn)?;
    Ok(())
}

/// A mailing's journal, oldest entry first.
pub fn logs(conn: &mut SqliteConnection, mailing_id: i32) -> Result<Vec<MailingLog>> {
    Ok(mailing_logs::table
        .filter(mailing_logs::mailing_id.eq(mailing_id))
        .order((mailing_logs::logged_at.asc(), mailing_logs::id.asc()))
        .select(MailingLog::as_select())
        .load(conn)?)
}
