use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

/// The name of the session cookie.
pub const COOKIE: &str = "releasemail_session";

/// Logged-in users, keyed by session token. Sessions do not survive a restart.
#[derive(Clone, Debug, Default)]
pub struct Sessions {
    users: Arc<Mutex<HashMap<String, String>>>,
}

impl Sessions {
    fn users(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a session, returning its token.
    pub fn start(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.users().insert(token.clone(), username.to_string());
        token
    }

    pub fn user(&self, token: &str) -> Option<String> {
        self.users().get(token).cloned()
    }

    /// Ends a session, returning whose it was.
    pub fn end(&self, token: &str) -> Option<String> {
        self.users().remove(token)
    }
}

/// The `Set-Cookie` value for a session token.
pub fn cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", COOKIE, token)
}

/// The `Set-Cookie` value that clears the session cookie.
pub fn expired_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_come_and_go() {
        let sessions = Sessions::default();
        let token = sessions.start("admin");
        assert_eq!(sessions.user(&token).as_deref(), Some("admin"));
        assert_eq!(sessions.end(&token).as_deref(), Some("admin"));
        assert_eq!(sessions.user(&token), None);
    }

    #[test]
    fn tokens_are_unique() {
        let sessions = Sessions::default();
        assert_ne!(sessions.start("admin"), sessions.start("admin"));
    }
}
