use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;

use super::SessionStore;

/// Where the user currently is, and how to send them somewhere else.
///
/// Front-ends implement this for their own notion of a route.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn redirect(&self, path: &str);
}

/// Ends a session that can no longer be renewed.
///
/// Clears the credentials and identity cache, then sends the user to sign-in
/// if they are on a route that needs a session. Users on public routes are
/// left where they are.
pub struct SessionTerminator {
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    config: Config,
}

impl SessionTerminator {
    pub fn new(config: &Config, store: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            config: config.clone(),
        }
    }

    pub fn terminate(&self) {
        warn!("Session could not be renewed, signing out");
        self.store.clear();

        let path = self.navigator.current_path();
        if self.config.is_privileged(&path) {
            info!(from = %path, to = %self.config.signin_path, "Redirecting to sign-in");
            self.navigator.redirect(&self.config.signin_path);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNavigator;
    use super::*;

    fn signed_in_store() -> Arc<SessionStore> {
        let store = Arc::new(SessionStore::in_memory(&Config::default()));
        store.set_cookie("token", "abc");
        store.set_cookie("refreshToken", "def");
        store.set_identity("alice", Some(serde_json::json!({"id": 1})));
        store
    }

    #[test]
    fn test_terminate_on_privileged_route_redirects() {
        let store = signed_in_store();
        let nav = Arc::new(RecordingNavigator::at("/admin/users"));
        let terminator = SessionTerminator::new(&Config::default(), store.clone(), nav.clone());

        terminator.terminate();

        assert!(!store.has_session());
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.username(), None);
        assert_eq!(store.user(), None);
        assert_eq!(nav.redirects(), vec!["/signin".to_string()]);
    }

    #[test]
    fn test_terminate_on_public_route_stays() {
        let store = signed_in_store();
        let nav = Arc::new(RecordingNavigator::at("/books/978-0"));
        let terminator = SessionTerminator::new(&Config::default(), store.clone(), nav.clone());

        terminator.terminate();

        assert!(!store.has_session());
        assert!(nav.redirects().is_empty());
    }
}
