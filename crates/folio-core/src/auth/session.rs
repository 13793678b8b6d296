use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;

/// Session file name in cache directory
pub const SESSION_FILE: &str = "session.json";

/// Identity cache key holding the subject identifier used for renewal
pub const USERNAME_KEY: &str = "username";

/// Identity cache key holding the cached user profile
pub const USER_KEY: &str = "user";

/// Everything the client keeps about the signed-in user.
///
/// `cookies` mirrors the browser cookie jar (session credential and refresh
/// companion), `identity` mirrors local storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub identity: BTreeMap<String, serde_json::Value>,
}

/// Shared cookie jar and identity cache.
///
/// Safe to share behind an `Arc`. The transport writes cookies into it, the
/// refresh manager only reads them.
pub struct SessionStore {
    path: Option<PathBuf>,
    session_cookie: String,
    refresh_cookie: String,
    data: RwLock<SessionData>,
}

impl SessionStore {
    /// Create a store that lives only in memory
    pub fn in_memory(config: &Config) -> Self {
        Self {
            path: None,
            session_cookie: config.session_cookie.clone(),
            refresh_cookie: config.refresh_cookie.clone(),
            data: RwLock::new(SessionData::default()),
        }
    }

    /// Open the store persisted at `dir/session.json`, loading it if present
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        let path = dir.join(SESSION_FILE);
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            serde_json::from_str(&contents).context("Failed to parse session file")?
        } else {
            SessionData::default()
        };

        debug!(path = %path.display(), cookies = data.cookies.len(), "Session store opened");

        Ok(Self {
            path: Some(path),
            session_cookie: config.session_cookie.clone(),
            refresh_cookie: config.refresh_cookie.clone(),
            data: RwLock::new(data),
        })
    }

    /// Names of the two cookies this store treats as credentials
    pub fn cookie_names(&self) -> [&str; 2] {
        [&self.session_cookie, &self.refresh_cookie]
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.read(|d| d.cookies.get(name).cloned())
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.write(|d| {
            d.cookies.insert(name.to_string(), value.to_string());
        });
    }

    pub fn remove_cookie(&self, name: &str) {
        self.write(|d| {
            d.cookies.remove(name);
        });
    }

    /// Snapshot of all cookies, for the transport's `Cookie` header
    pub fn cookies(&self) -> BTreeMap<String, String> {
        self.read(|d| d.cookies.clone())
    }

    /// The session credential, if present
    pub fn session_token(&self) -> Option<String> {
        self.cookie(&self.session_cookie)
    }

    /// The refresh companion, if present
    pub fn refresh_token(&self) -> Option<String> {
        self.cookie(&self.refresh_cookie)
    }

    /// The cached subject identifier
    pub fn username(&self) -> Option<String> {
        self.read(|d| {
            d.identity
                .get(USERNAME_KEY)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
    }

    /// The cached user profile
    pub fn user(&self) -> Option<serde_json::Value> {
        self.read(|d| d.identity.get(USER_KEY).cloned())
    }

    /// Record who is signed in
    pub fn set_identity(&self, username: &str, user: Option<serde_json::Value>) {
        self.write(|d| {
            d.identity.insert(
                USERNAME_KEY.to_string(),
                serde_json::Value::String(username.to_string()),
            );
            match user {
                Some(user) => {
                    d.identity.insert(USER_KEY.to_string(), user);
                }
                None => {
                    d.identity.remove(USER_KEY);
                }
            }
        });
    }

    /// Remove both credentials and the cached identity
    pub fn clear(&self) {
        let session_cookie = self.session_cookie.clone();
        let refresh_cookie = self.refresh_cookie.clone();
        self.write(move |d| {
            d.cookies.remove(&session_cookie);
            d.cookies.remove(&refresh_cookie);
            d.identity.remove(USERNAME_KEY);
            d.identity.remove(USER_KEY);
        });
    }

    /// Check if a session credential is held at all (expired or not)
    pub fn has_session(&self) -> bool {
        self.session_token().is_some()
    }

    fn read<T>(&self, f: impl FnOnce(&SessionData) -> T) -> T {
        let guard = self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut SessionData)) {
        let snapshot = {
            let mut guard = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard);
            guard.clone()
        };

        if let Err(e) = self.save(&snapshot) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Save session to disk
    fn save(&self, data: &SessionData) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credentials_and_identity() {
        let store = SessionStore::in_memory(&Config::default());
        assert!(!store.has_session());

        store.set_cookie("token", "abc");
        store.set_cookie("refreshToken", "def");
        store.set_identity("alice", Some(json!({"role": "admin"})));

        assert_eq!(store.session_token().as_deref(), Some("abc"));
        assert_eq!(store.refresh_token().as_deref(), Some("def"));
        assert_eq!(store.username().as_deref(), Some("alice"));
        assert_eq!(store.user(), Some(json!({"role": "admin"})));
    }

    #[test]
    fn test_clear_keeps_unrelated_cookies() {
        let store = SessionStore::in_memory(&Config::default());
        store.set_cookie("token", "abc");
        store.set_cookie("refreshToken", "def");
        store.set_cookie("theme", "dark");
        store.set_identity("alice", None);

        store.clear();

        assert_eq!(store.session_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.username(), None);
        assert_eq!(store.user(), None);
        assert_eq!(store.cookie("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn test_persists_across_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::default();

        let store = SessionStore::open(dir.path(), &config).expect("open");
        store.set_cookie("token", "abc");
        store.set_identity("bob", None);
        drop(store);

        let reopened = SessionStore::open(dir.path(), &config).expect("reopen");
        assert_eq!(reopened.session_token().as_deref(), Some("abc"));
        assert_eq!(reopened.username().as_deref(), Some("bob"));

        reopened.clear();
        let cleared = SessionStore::open(dir.path(), &config).expect("reopen");
        assert!(!cleared.has_session());
    }

    #[test]
    fn test_custom_cookie_names() {
        let config = Config {
            session_cookie: "sid".to_string(),
            refresh_cookie: "rid".to_string(),
            ..Config::default()
        };
        let store = SessionStore::in_memory(&config);
        store.set_cookie("sid", "one");
        store.set_cookie("rid", "two");
        assert_eq!(store.cookie_names(), ["sid", "rid"]);
        assert_eq!(store.session_token().as_deref(), Some("one"));
        assert_eq!(store.refresh_token().as_deref(), Some("two"));
    }
}
