//! Reference data. Every initializer is idempotent and returns how many rows it created.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::schema::{components, languages, platforms, server_roles, service_packs};
use crate::Result;

pub const LANGUAGES: &[(&str, &str)] = &[("ru", "Русский"), ("en", "Английский")];

pub const SERVICE_PACKS: &[(&str, &str)] = &[
    ("bronze", "Bronze"),
    ("silver", "Silver"),
    ("gold", "Gold"),
    ("platinum", "Platinum"),
];

pub const SERVER_ROLES: &[&str] = &["master", "worker", "nfs", "oos", "r7-office", "db", "web"];

pub const PLATFORMS: &[&str] = &["K8s", "DeckHouse", "Windows Server"];

pub const COMPONENTS: &[(&str, &str)] = &[
    ("server", "Server"),
    ("ipad", "iPad"),
    ("android", "Android"),
];

pub fn init_languages(conn: &mut SqliteConnection) -> Result<usize> {
    let mut created = 0;
    for &(code, name) in LANGUAGES {
        created += diesel::insert_or_ignore_into(languages::table)
            .values((languages::code.eq(code), languages::name.eq(name)))
            .execute(conn)?;
    }
    Ok(created)
}

pub fn init_service_packs(conn: &mut SqliteConnection) -> Result<usize> {
    let mut created = 0;
    for &(code, name) in SERVICE_PACKS {
        created += diesel::insert_or_ignore_into(service_packs::table)
            .values((service_packs::code.eq(code), service_packs::name.eq(name)))
            .execute(conn)?;
    }
    Ok(created)
}

pub fn init_server_roles_and_platforms(conn: &mut SqliteConnection) -> Result<usize> {
    let mut created = 0;
    for &name in SERVER_ROLES {
        created += diesel::insert_or_ignore_into(server_roles::table)
            .values(server_roles::name.eq(name))
            .execute(conn)?;
    }
    for &name in PLATFORMS {
        created += diesel::insert_or_ignore_into(platforms::table)
            .values(platforms::name.eq(name))
            .execute(conn)?;
    }
    Ok(created)
}

pub fn init_components(conn: &mut SqliteConnection) -> Result<usize> {
    let mut created = 0;
    for &(code, name) in COMPONENTS {
        created += diesel::insert_or_ignore_into(components::table)
            .values((components::code.eq(code), components::name.eq(name)))
            .execute(conn)?;
    }
    Ok(created)
}

/// Looks up a service pack's ID by code.
pub fn service_pack_id(conn: &mut SqliteConnection, code: &str) -> Result<Option<i32>> {
    Ok(service_packs::table
        .filter(service_packs::code.eq(code))
        .select(service_packs::id)
        .first(conn)
        .optional()?)
}

/// Looks up a language's ID by code.
pub fn language_id(conn: &mut SqliteConnection, code: &str) -> Result<Option<i32>> {
    Ok(languages::table
        .filter(languages::code.eq(code))
        .select(languages::id)
        .first(conn)
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DB;

    #[test]
    fn initializers_are_idempotent() {
        let db = DB::in_memory().unwrap();
        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;

        assert_eq!(init_languages(conn).unwrap(), 2);
        assert_eq!(init_service_packs(conn).unwrap(), 4);
        assert_eq!(init_server_roles_and_platforms(conn).unwrap(), 10);
        assert_eq!(init_components(conn).unwrap(), 3);

        assert_eq!(init_languages(conn).unwrap(), 0);
        assert_eq!(init_service_packs(conn).unwrap(), 0);
        assert_eq!(init_server_roles_and_platforms(conn).unwrap(), 0);
        assert_eq!(init_components(conn).unwrap(), 0);

        let count: i64 = languages::table.count().get_result(conn).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn looks_up_codes() {
        let db = DB::in_memory().unwrap();
        let mut pooled = db.get().unwrap();
        let conn = &mut *pooled;
        init_service_packs(conn).unwrap();
        init_languages(conn).unwrap();

        assert!(service_pack_id(conn, "gold").unwrap().is_some());
        assert!(service_pack_id(conn, "diamond").unwrap().is_none());
        assert!(language_id(conn, "en").unwrap().is_some());
    }
}
