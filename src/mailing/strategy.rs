//! Who a mailing goes to.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::clients::{active_clients, notified_contacts, ClientFilter, ClientRow};
use crate::db::mailings::{add_recipient, mark_recipients_generated};
use crate::db::models::{Mailing, NewMailingRecipient};
use crate::mailing::journal::{EventLog, MailingJournal};
use crate::mailing::types::{Component, MailingType, ReleaseType};
use crate::{ErrorKind, Result};

/// The service packs that include service windows.
pub const SERVICE_WINDOW_PACKS: &[&str] = &["gold", "platinum"];

/// The language of clients that have none set.
pub const DEFAULT_LANGUAGE: &str = "ru";

/// The result of running a strategy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// How many recipients were generated, or clients handled.
    pub count: usize,

    /// The email addresses recipients were created for, or the names of the clients handled.
    pub recipients: Vec<String>,
}

/// The way the recipients of a mailing are selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipientStrategy {
    /// Contacts of active clients on the release's product generation.
    Standard,

    /// Contacts of active clients on the hotfix's platform.
    Hotfix,

    /// Contacts of active clients subscribed to the module.
    Module(i32),

    /// Service-window requests for active gold and platinum clients. Creates no recipients.
    ServiceWindow,

    /// Update notifications for active SaaS clients. Creates no recipients.
    Saas,

    /// A mailing type nothing knows how to handle.
    Unconfigured { mailing_type: String },
}

impl RecipientStrategy {
    /// Picks the strategy for a mailing.
    pub fn for_mailing(mailing: &Mailing) -> RecipientStrategy {
        let kind = mailing.kind();
        if kind == Some(MailingType::Hotfix) {
            RecipientStrategy::Hotfix
        } else if let Some(module_id) = mailing.module_id {
            RecipientStrategy::Module(module_id)
        } else if mailing.service_window {
            RecipientStrategy::ServiceWindow
        } else if mailing.saas_notification {
            RecipientStrategy::Saas
        } else if kind == Some(MailingType::StandardMailing) {
            RecipientStrategy::Standard
        } else {
            RecipientStrategy::Unconfigured {
                mailing_type: mailing.mailing_type.clone(),
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, RecipientStrategy::Unconfigured { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecipientStrategy::Standard => "standard",
            RecipientStrategy::Hotfix => "hotfix",
            RecipientStrategy::Module(_) => "module",
            RecipientStrategy::ServiceWindow => "service window",
            RecipientStrategy::Saas => "SaaS",
            RecipientStrategy::Unconfigured { .. } => "unconfigured",
        }
    }

    /// Runs the strategy for a mailing.
    pub fn execute(&self, conn: &mut SqliteConnection, mailing: &Mailing) -> Result<Selection> {
        match self {
            RecipientStrategy::Standard => {
                let prefix = match mailing.release()? {
                    ReleaseType::Release3x => Some("3."),
                    ReleaseType::Release2x => Some("2."),
                    _ => None,
                };
                let filter = ClientFilter {
                    version_prefix: prefix,
                    ..ClientFilter::default()
                };
                generate(conn, mailing, &filter)
            }
            RecipientStrategy::Hotfix => {
                let release = mailing.release()?;
                let filter = match release.platform() {
                    Some(Component::Server) => ClientFilter {
                        version_prefix: release.version_prefix(),
                        ..ClientFilter::default()
                    },
                    Some(Component::Ipad) => ClientFilter {
                        version_prefix: release.version_prefix(),
                        supports_ipad: true,
                        ..ClientFilter::default()
                    },
                    Some(Component::Android) => ClientFilter {
                        version_prefix: release.version_prefix(),
                        supports_android: true,
                        ..ClientFilter::default()
                    },
                    None => ClientFilter::default(),
                };
                generate(conn, mailing, &filter)
            }
            RecipientStrategy::Module(module_id) => {
                let filter = ClientFilter {
                    module_id: Some(*module_id),
                    ..ClientFilter::default()
                };
                generate(conn, mailing, &filter)
            }
            RecipientStrategy::ServiceWindow => {
                let filter = ClientFilter {
                    service_packs: SERVICE_WINDOW_PACKS,
                    ..ClientFilter::default()
                };
                let clients = active_clients(conn, &filter)?;
                let mut journal = MailingJournal::new(conn, mailing.id);
                for row in &clients {
                    journal.info(&format!(
                        "Service window requested: {} (service pack: {})",
                        row.client.client_name,
                        row.service_pack.as_deref().unwrap_or("none"),
                    ));
                }
                Ok(client_names(clients))
            }
            RecipientStrategy::Saas => {
                let filter = ClientFilter {
                    saas: true,
                    ..ClientFilter::default()
                };
                let clients = active_clients(conn, &filter)?;
                let update_time = mailing
                    .saas_update_time
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "not set".to_string());
                {
                    let mut journal = MailingJournal::new(conn, mailing.id);
                    for row in &clients {
                        journal.info(&format!(
                            "[SaaS] Client {} notified. Planned update time: {}",
                            row.client.client_name, update_time,
                        ));
                    }
                }
                mark_recipients_generated(conn, mailing.id)?;
                Ok(client_names(clients))
            }
            RecipientStrategy::Unconfigured { mailing_type } => {
                Err(ErrorKind::StrategyNotConfigured(mailing_type.clone()).into())
            }
        }
    }
}

fn client_names(clients: Vec<ClientRow>) -> Selection {
    let recipients = clients
        .into_iter()
        .map(|row| row.client.client_name)
        .collect::<Vec<_>>();
    Selection {
        count: recipients.len(),
        recipients,
    }
}

/// Creates a recipient for every notified contact of the matching clients.
fn generate(
    conn: &mut SqliteConnection,
    mailing: &Mailing,
    filter: &ClientFilter,
) -> Result<Selection> {
    conn.transaction::<_, crate::Error, _>(|conn| {
        let mut selection = Selection::default();
        for row in active_clients(conn, filter)? {
            let language = row.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
            for contact in notified_contacts(conn, row.client.id)? {
                add_recipient(
                    conn,
                    &NewMailingRecipient {
                        mailing_id: mailing.id,
                        client_id: row.client.id,
                        email: &contact.email,
                        language,
                    },
                )?;
                selection.recipients.push(contact.email);
            }
        }
        selection.count = selection.recipients.len();
        mark_recipients_generated(conn, mailing.id)?;
        Ok(selection)
    })
}
