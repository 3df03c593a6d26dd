//! Clients, their contacts and module subscriptions.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::models::{Client, Contact, NewClient, NewClientModule, NewContact};
use crate::db::schema::{client_modules, clients, contacts, languages, modules, service_packs};
use crate::Result;

/// Narrows down the set of active clients. The default filter matches every active client.
#[derive(Clone, Debug, Default)]
pub struct ClientFilter<'a> {
    /// Only clients whose server version starts with this prefix.
    pub version_prefix: Option<&'a str>,
    pub supports_ipad: bool,
    pub supports_android: bool,
    /// Only clients hosted on SaaS.
    pub saas: bool,
    /// Only clients on one of these service packs, unless empty.
    pub service_packs: &'a [&'a str],
    /// Only clients with an active subscription to this module.
    pub module_id: Option<i32>,
}

/// A client along with the codes of its language and service pack.
#[derive(Clone, Debug)]
pub struct ClientRow {
    pub client: Client,
    pub language: Option<String>,
    pub service_pack: Option<String>,
}

pub fn create_client(conn: &mut SqliteConnection, new: &NewClient) -> Result<Client> {
    Ok(diesel::insert_into(clients::table)
        .values(new)
        .returning(Client::as_returning())
        .get_result(conn)?)
}

pub fn add_contact(conn: &mut SqliteConnection, new: &NewContact) -> Result<Contact> {
    Ok(diesel::insert_into(contacts::table)
        .values(new)
        .returning(Contact::as_returning())
        .get_result(conn)?)
}

/// Creates a module, returning its ID.
pub fn create_module(conn: &mut SqliteConnection, name: &str) -> Result<i32> {
    Ok(diesel::insert_into(modules::table)
        .values(modules::name.eq(name))
        .returning(modules::id)
        .get_result(conn)?)
}

pub fn subscribe(
    conn: &mut SqliteConnection,
    client_id: i32,
    module_id: i32,
    is_active: bool,
) -> Result<()> {
    diesel::insert_into(client_modules::table)
        .values(&NewClientModule {
            client_id,
            module_id,
            is_active,
        })
        .execute(conn)?;
    Ok(())
}

pub fn list_clients(conn: &mut SqliteConnection) -> Result<Vec<Client>> {
    Ok(clients::table
        .order(clients::client_name.asc())
        .select(Client::as_select())
        .load(conn)?)
}

/// The contacts of a client that opted into release notifications.
pub fn notified_contacts(conn: &mut SqliteConnection, client_id: i32) -> Result<Vec<Contact>> {
    Ok(contacts::table
        .filter(contacts::client_id.eq(client_id))
        .filter(contacts::notification_update.eq(true))
        .order(contacts::id.asc())
        .select(Contact::as_select())
        .load(conn)?)
}

/// Loads the active clients (`contact_status` set) matching the filter, ordered by ID.
pub fn active_clients(
    conn: &mut SqliteConnection,
    filter: &ClientFilter,
) -> Result<Vec<ClientRow>> {
    let mut query = clients::table
        .left_join(languages::table)
        .left_join(service_packs::table)
        .filter(clients::contact_status.eq(true))
        .order(clients::id.asc())
        .select((
            Client::as_select(),
            languages::code.nullable(),
            service_packs::code.nullable(),
        ))
        .into_boxed();

    if let Some(prefix) = filter.version_prefix {
        query = query.filter(clients::server_version.like(format!("{}%", prefix)));
    }
    if filter.supports_ipad {
        query = query.filter(clients::supports_ipad.eq(true));
    }
    if filter.supports_android {
        query = query.filter(clients::supports_android.eq(true));
    }
    if filter.saas {
        query = query.filter(clients::saas.eq(true));
    }
    if !filter.service_packs.is_empty() {
        let pack_ids: Vec<i32> = service_packs::table
            .filter(service_packs::code.eq_any(filter.service_packs.to_vec()))
            .select(service_packs::id)
            .load(conn)?;
        query = query.filter(clients::service_pack_id.eq_any(pack_ids));
    }
    if let Some(module_id) = filter.module_id {
        let client_ids: Vec<i32> = client_modules::table
            .filter(client_modules::module_id.eq(module_id))
            .filter(client_modules::is_active.eq(true))
            .select(client_modules::client_id)
            .load(conn)?;
        query = query.filter(clients::id.eq_any(client_ids));
    }

    let rows = query.load::<(Client, Option<String>, Option<String>)>(conn)?;
    Ok(rows
        .into_iter()
        .map(|(client, language, service_pack)| ClientRow {
            client,
            language,
            service_pack,
        })
        .collect())
}
