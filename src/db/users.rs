//! Local user accounts.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::models::User;
use crate::db::schema::users;
use crate::{ErrorKind, Result};

/// Hashes a password with a fresh salt, as an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ErrorKind::PasswordHash(e.to_string()).into())
}

/// Checks a password against a stored hash. Unparseable hashes never match.
pub fn check_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(err) => {
            warn!("Stored password hash is malformed: {}", err);
            false
        }
    }
}

pub fn create_user(conn: &mut SqliteConnection, username: &str, password: &str) -> Result<User> {
    if username.trim().is_empty() {
        return Err(ErrorKind::InvalidData("The username must not be empty".to_string()).into());
    }
    Ok(diesel::insert_into(users::table)
        .values((
            users::username.eq(username),
            users::password_hash.eq(hash_password(password)?),
        ))
        .returning(User::as_returning())
        .get_result(conn)?)
}

/// Looks up a user by username and checks their password.
pub fn authenticate(conn: &mut SqliteConnection, username: &str, password: &str) -> Result<User> {
    let user = users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    match user {
        Some(user) if check_password(password, &user.password_hash) => Ok(user),
        _ => Err(ErrorKind::InvalidCredentials.into()),
    }
}
