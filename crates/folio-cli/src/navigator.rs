use std::sync::{Mutex, RwLock};

use folio_core::Navigator;
use tokio::sync::Notify;
use tracing::info;

/// Stand-in for the browser location: the route the user is working under.
///
/// A redirect replaces the route and wakes whoever waits on
/// [`TerminalNavigator::redirected`].
pub struct TerminalNavigator {
    route: RwLock<String>,
    last_redirect: Mutex<Option<String>>,
    notify: Notify,
}

impl TerminalNavigator {
    pub fn new(route: &str) -> Self {
        Self {
            route: RwLock::new(normalize(route)),
            last_redirect: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Wait for the next redirect and return its target
    pub async fn redirected(&self) -> String {
        self.notify.notified().await;
        self.last_redirect
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_default()
    }
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.route
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn redirect(&self, path: &str) {
        info!(to = path, "Navigating");
        *self.route.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = path.to_string();
        *self
            .last_redirect
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path.to_string());
        self.notify.notify_one();
    }
}

/// Routes are absolute paths
fn normalize(route: &str) -> String {
    let trimmed = route.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
