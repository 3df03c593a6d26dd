//! The database and related types.

pub mod clients;
pub mod mailings;
pub mod models;
pub mod schema;
pub mod seed;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use diesel::{
    prelude::*,
    r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection},
    sqlite::SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::{ErrorKind, Result};

/// The schema, applied on connect.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// The URL of a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// A pooled connection.
pub type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// A pool of connections to the database. Cheaply clonable.
#[derive(Clone)]
pub struct DB {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
}

/// How long a checkout waits for a free connection by default.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a connection waits on another's write lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Pragmas {
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for Pragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> ::std::result::Result<(), r2d2::Error> {
        let mut pragmas = vec![
            format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT.as_millis()),
            "PRAGMA foreign_keys = ON".to_string(),
        ];
        if self.wal {
            pragmas.push("PRAGMA journal_mode = WAL".to_string());
            pragmas.push("PRAGMA synchronous = NORMAL".to_string());
        }
        for pragma in pragmas {
            diesel::sql_query(pragma)
                .execute(conn)
                .map_err(r2d2::Error::QueryError)?;
        }
        Ok(())
    }
}

impl DB {
    /// Connects to the database and brings its schema up to date, waiting up to
    /// `DEFAULT_CHECKOUT_TIMEOUT` for a free connection.
    pub fn connect(database_url: &str) -> Result<DB> {
        DB::connect_with_timeout(database_url, DEFAULT_CHECKOUT_TIMEOUT)
    }

    /// Like `connect`, with the time a checkout may wait for a free connection. A checkout that
    /// runs out of time fails as a database outage.
    ///
    /// An in-memory database lives as long as its connection, so it gets a pool of exactly one
    /// connection that is never recycled.
    pub fn connect_with_timeout(database_url: &str, checkout_timeout: Duration) -> Result<DB> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let in_memory = database_url == IN_MEMORY;
        let builder = Pool::builder()
            .connection_timeout(checkout_timeout)
            .connection_customizer(Box::new(Pragmas { wal: !in_memory }));
        let pool = if in_memory {
            builder
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build(manager)?
        } else {
            builder.max_size(8).build(manager)?
        };

        let db = DB {
            pool: Arc::new(pool),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> Result<DB> {
        DB::connect(IN_MEMORY)
    }

    /// Applies pending migrations.
    pub fn migrate(&self) -> Result<()> {
        let mut pooled = self.get()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| ErrorKind::Migration(e.to_string()))?;
        if !applied.is_empty() {
            info!("Applied {} migration(s).", applied.len());
        }
        Ok(())
    }

    /// Checks a connection out of the pool.
    pub fn get(&self) -> Result<Conn> {
        Ok(self.pool.get()?)
    }

    /// Runs a query on the blocking thread pool.
    pub async fn run<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            func(&mut conn)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use diesel::connection::SimpleConnection;
    use tempfile::TempDir;

    use super::*;
    use crate::db::models::NewMailing;

    #[test]
    fn writers_wait_for_the_write_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("releasemail.sqlite3");
        let db = DB::connect(path.to_str().unwrap()).unwrap();

        let mut holder = db.get().unwrap();
        holder.batch_execute("BEGIN IMMEDIATE").unwrap();
        let release = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            holder.batch_execute("COMMIT").unwrap();
        });

        let mut conn = db.get().unwrap();
        let created = mailings::create_mailing(
            &mut conn,
            &NewMailing {
                server_version: "3.1.0".to_string(),
                ..NewMailing::default()
            },
        );
        release.join().unwrap();
        assert!(created.is_ok(), "{:?}", created.err());
    }

    #[test]
    fn checkouts_time_out_when_the_pool_is_exhausted() {
        let db = DB::connect_with_timeout(IN_MEMORY, Duration::from_millis(250)).unwrap();
        let _held = db.get().unwrap();
        let err = db.get().err().unwrap();
        assert!(err.is_database_unavailable());
    }
}
