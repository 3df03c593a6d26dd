//! Rows of the database tables.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::schema::{
    client_modules, clients, components, contacts, languages, mailing_logs, mailing_recipients,
    mailing_test_recipients, mailings, users,
};
use crate::mailing::types::{MailingMode, MailingStatus, MailingType, ReleaseType};
use crate::Result;

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = languages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Language {
    pub id: i32,
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = components)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Component {
    pub id: i32,
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = clients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Client {
    pub id: i32,
    pub client_name: String,
    pub contact_status: bool,
    pub language_id: Option<i32>,
    pub saas: bool,
    pub service_pack_id: Option<i32>,
    pub server_version: Option<String>,
    pub supports_ipad: bool,
    pub supports_android: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Insertable)]
#[diesel(table_name = clients)]
pub struct NewClient {
    pub client_name: String,
    #[serde(default)]
    pub contact_status: bool,
    #[serde(default)]
    pub language_id: Option<i32>,
    #[serde(default)]
    pub saas: bool,
    #[serde(default)]
    pub service_pack_id: Option<i32>,
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub supports_ipad: bool,
    #[serde(default)]
    pub supports_android: bool,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = contacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Contact {
    pub id: i32,
    pub client_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub notification_update: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Insertable)]
#[diesel(table_name = contacts)]
pub struct NewContact {
    #[serde(default)]
    pub client_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub notification_update: bool,
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = client_modules)]
pub struct NewClientModule {
    pub client_id: i32,
    pub module_id: i32,
    pub is_active: bool,
}

#[derive(Clone, Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
}

/// A release-notification campaign.
#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = mailings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Mailing {
    pub id: i32,
    pub mode: String,
    pub mailing_type: String,
    pub release_type: String,
    pub server_version: String,
    pub ipad_version: String,
    pub android_version: String,
    pub service_window: bool,
    pub saas_notification: bool,
    pub saas_update_time: Option<NaiveDateTime>,
    pub module_id: Option<i32>,
    pub status: String,
    pub language: Option<String>,
    pub recipients_generated: bool,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

impl Mailing {
    /// A readable release number built from the component versions, e.g.
    /// `Server 3.1.0, iPad 3.1.2`.
    pub fn release_number(&self) -> String {
        let versions = [
            ("Server", &self.server_version),
            ("iPad", &self.ipad_version),
            ("Android", &self.android_version),
        ]
        .iter()
        .filter(|(_, version)| !version.is_empty())
        .map(|(name, version)| format!("{} {}", name, version))
        .collect::<Vec<_>>();

        if versions.is_empty() {
            "No components".to_string()
        } else {
            versions.join(", ")
        }
    }

    /// The main component of the mailing: the first one with a version.
    pub fn primary_component(&self) -> &'static str {
        if !self.server_version.is_empty() {
            "Server"
        } else if !self.ipad_version.is_empty() {
            "iPad"
        } else if !self.android_version.is_empty() {
            "Android"
        } else {
            "Undefined"
        }
    }

    pub fn mode(&self) -> Result<MailingMode> {
        self.mode.parse()
    }

    /// The mailing type, or `None` if the stored code is not a known type.
    pub fn kind(&self) -> Option<MailingType> {
        self.mailing_type.parse().ok()
    }

    pub fn release(&self) -> Result<ReleaseType> {
        self.release_type.parse()
    }

    pub fn status_label(&self) -> String {
        MailingStatus::display(&self.status)
    }

    /// The mailing's language, falling back to Russian.
    pub fn language_or_default(&self) -> &str {
        match self.language {
            Some(ref lang) if !lang.is_empty() => lang,
            _ => "ru",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Insertable)]
#[diesel(table_name = mailings)]
pub struct NewMailing {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_mailing_type")]
    pub mailing_type: String,
    #[serde(default = "default_release_type")]
    pub release_type: String,
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub ipad_version: String,
    #[serde(default)]
    pub android_version: String,
    #[serde(default)]
    pub service_window: bool,
    #[serde(default)]
    pub saas_notification: bool,
    #[serde(default)]
    pub saas_update_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub module_id: Option<i32>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_mode() -> String {
    MailingMode::Prod.as_str().to_string()
}

fn default_mailing_type() -> String {
    MailingType::StandardMailing.as_str().to_string()
}

fn default_release_type() -> String {
    ReleaseType::Release3x.as_str().to_string()
}

fn default_status() -> String {
    MailingStatus::Pending.as_str().to_string()
}

impl Default for NewMailing {
    fn default() -> NewMailing {
        NewMailing {
            mode: default_mode(),
            mailing_type: default_mailing_type(),
            release_type: default_release_type(),
            server_version: String::new(),
            ipad_version: String::new(),
            android_version: String::new(),
            service_window: false,
            saas_notification: false,
            saas_update_time: None,
            module_id: None,
            status: default_status(),
            language: None,
        }
    }
}

/// A production recipient of a mailing.
#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = mailing_recipients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MailingRecipient {
    pub id: i32,
    pub mailing_id: i32,
    pub client_id: i32,
    pub email: String,
    pub language: String,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = mailing_recipients)]
pub struct NewMailingRecipient<'a> {
    pub mailing_id: i32,
    pub client_id: i32,
    pub email: &'a str,
    pub language: &'a str,
}

/// A test address a mailing is sent to in test mode.
#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = mailing_test_recipients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MailingTestRecipient {
    pub id: i32,
    pub mailing_id: i32,
    pub email: String,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = mailing_test_recipients)]
pub struct NewMailingTestRecipient<'a> {
    pub mailing_id: i32,
    pub email: &'a str,
}

/// An entry of a mailing's journal.
#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = mailing_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MailingLog {
    pub id: i32,
    pub mailing_id: i32,
    pub logged_at: NaiveDateTime,
    pub level: String,
    pub message: String,
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = mailing_logs)]
pub struct NewMailingLog<'a> {
    pub mailing_id: i32,
    pub level: &'a str,
    pub message: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailing(server: &str, ipad: &str, android: &str) -> Mailing {
        Mailing {
            id: 1,
            mode: "prod".to_string(),
            mailing_type: "standard_mailing".to_string(),
            release_type: "release3x".to_string(),
            server_version: server.to_string(),
            ipad_version: ipad.to_string(),
            android_version: android.to_string(),
            service_window: false,
            saas_notification: false,
            saas_update_time: None,
            module_id: None,
            status: "pending".to_string(),
            language: None,
            recipients_generated: false,
            created_at: chrono::NaiveDate::from_ymd_opt(2024, 11, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn release_number_lists_present_versions() {
        assert_eq!(
            mailing("3.1.0", "", "3.1.4").release_number(),
            "Server 3.1.0, Android 3.1.4"
        );
        assert_eq!(mailing("", "", "").release_number(), "No components");
    }

    #[test]
    fn primary_component_is_first_versioned() {
        assert_eq!(mailing("3.1.0", "3.0.1", "").primary_component(), "Server");
        assert_eq!(mailing("", "3.0.1", "3.0.2").primary_component(), "iPad");
        assert_eq!(mailing("", "", "3.0.2").primary_component(), "Android");
        assert_eq!(mailing("", "", "").primary_component(), "Undefined");
    }

    #[test]
    fn unknown_mailing_type_has_no_kind() {
        let mut m = mailing("3.1.0", "", "");
        assert_eq!(m.kind(), Some(MailingType::StandardMailing));
        m.mailing_type = "newsletter".to_string();
        assert_eq!(m.kind(), None);
    }

    #[test]
    fn language_defaults_to_russian() {
        let mut m = mailing("3.1.0", "", "");
        assert_eq!(m.language_or_default(), "ru");
        m.language = Some("en".to_string());
        assert_eq!(m.language_or_default(), "en");
    }
}
