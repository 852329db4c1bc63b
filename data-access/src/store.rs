//! Global application state: UI preferences, notifications, connectivity and
//! sync status, and the set of tracked cache keys.
//!
//! `AppState::reduce` is a pure transition function; `AppStore` owns the
//! current state and publishes every change on a watch channel.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::time::TimeSource;

pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

/// A button shown next to a notification.
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    pub callback: Arc<dyn Fn() + Send + Sync>,
}

impl NotificationAction {
    pub fn new(
        label: impl Into<String>,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn invoke(&self) {
        (self.callback)();
    }
}

impl std::fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PartialEq for NotificationAction {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
            && Arc::ptr_eq(&self.callback, &other.callback)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppNotification {
    pub id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub timestamp: Timestamp,
    pub read: bool,
    pub persistent: bool,
    pub action: Option<NotificationAction>,
}

/// The caller-supplied part of a notification; id and timestamp are
/// assigned by `AppStore::add_notification`.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub persistent: bool,
    pub action: Option<NotificationAction>,
}

impl NewNotification {
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            persistent: false,
            action: None,
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub sidebar_collapsed: bool,
    pub theme: Theme,
    pub language: String,
    /// Newest first, at most `MAX_NOTIFICATIONS`.
    pub notifications: Vec<AppNotification>,
    pub online_status: bool,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<Timestamp>,
    pub cache_keys: BTreeSet<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            sidebar_collapsed: false,
            theme: Theme::System,
            language: "pt-BR".to_string(),
            notifications: Vec::new(),
            online_status: true,
            sync_status: SyncStatus::Idle,
            last_sync_at: None,
            cache_keys: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    ToggleSidebar,
    SetTheme(Theme),
    SetLanguage(String),
    AddNotification(AppNotification),
    RemoveNotification(Uuid),
    MarkNotificationRead(Uuid),
    ClearNotifications,
    SetOnlineStatus(bool),
    SetSyncStatus(SyncStatus),
    SetLastSync(Timestamp),
    AddCacheKey(String),
    RemoveCacheKey(String),
    ClearCacheKeys,
}

impl AppState {
    pub fn reduce(&self, action: Action) -> AppState {
        let mut next = self.clone();

        match action {
            Action::ToggleSidebar => {
                next.sidebar_collapsed = !next.sidebar_collapsed;
            }
            Action::SetTheme(theme) => next.theme = theme,
            Action::SetLanguage(language) => next.language = language,
            Action::AddNotification(notification) => {
                next.notifications.insert(0, notification);
                next.notifications.truncate(MAX_NOTIFICATIONS);
            }
            Action::RemoveNotification(id) => {
                next.notifications.retain(|n| n.id != id);
            }
            Action::MarkNotificationRead(id) => {
                for n in next.notifications.iter_mut().filter(|n| n.id == id) {
                    n.read = true;
                }
            }
            Action::ClearNotifications => next.notifications.clear(),
            Action::SetOnlineStatus(online) => next.online_status = online,
            Action::SetSyncStatus(status) => next.sync_status = status,
            Action::SetLastSync(at) => next.last_sync_at = Some(at),
            Action::AddCacheKey(key) => {
                next.cache_keys.insert(key);
            }
            Action::RemoveCacheKey(key) => {
                next.cache_keys.remove(&key);
            }
            Action::ClearCacheKeys => next.cache_keys.clear(),
        }

        next
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}

/// Owner of the application state. Clones share the same state.
#[derive(Clone)]
pub struct AppStore {
    state: Arc<watch::Sender<AppState>>,
    time_source: TimeSource,
}

impl AppStore {
    pub fn new(time_source: TimeSource) -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self {
            state: Arc::new(state),
            time_source,
        }
    }

    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    pub fn dispatch(&self, action: Action) {
        self.state.send_modify(|state| *state = state.reduce(action));
    }

    /// Stamp `notification` with a fresh id and the current time and put it
    /// at the top of the list. Returns the assigned id.
    pub fn add_notification(&self, notification: NewNotification) -> Uuid {
        let id = Uuid::new_v4();
        tracing::debug!(
            %id,
            kind = ?notification.kind,
            "adding notification"
        );
        self.dispatch(Action::AddNotification(AppNotification {
            id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            timestamp: self.time_source.now(),
            read: false,
            persistent: notification.persistent,
            action: notification.action,
        }));
        id
    }

    fn show(
        &self,
        kind: NotificationType,
        default_title: &str,
        message: &str,
        title: Option<&str>,
    ) -> Uuid {
        self.add_notification(NewNotification::new(
            kind,
            title.unwrap_or(default_title),
            message,
        ))
    }

    pub fn show_error(&self, message: &str, title: Option<&str>) -> Uuid {
        self.show(NotificationType::Error, "Error", message, title)
    }

    pub fn show_success(&self, message: &str, title: Option<&str>) -> Uuid {
        self.show(NotificationType::Success, "Success", message, title)
    }

    pub fn show_warning(&self, message: &str, title: Option<&str>) -> Uuid {
        self.show(NotificationType::Warning, "Warning", message, title)
    }

    pub fn show_info(&self, message: &str, title: Option<&str>) -> Uuid {
        self.show(NotificationType::Info, "Info", message, title)
    }

    pub fn remove_notification(&self, id: Uuid) {
        self.dispatch(Action::RemoveNotification(id));
    }

    pub fn mark_read(&self, id: Uuid) {
        self.dispatch(Action::MarkNotificationRead(id));
    }

    pub fn unread_count(&self) -> usize {
        self.state.borrow().unread_count()
    }

    pub fn set_sync_status(&self, status: SyncStatus) {
        self.dispatch(Action::SetSyncStatus(status));
    }

    pub fn mark_synced(&self) {
        self.dispatch(Action::SetSyncStatus(SyncStatus::Success));
        self.dispatch(Action::SetLastSync(self.time_source.now()));
    }

    pub fn track_cache_key(&self, key: impl Into<String>) {
        self.dispatch(Action::AddCacheKey(key.into()));
    }

    pub fn untrack_cache_key(&self, key: impl Into<String>) {
        self.dispatch(Action::RemoveCacheKey(key.into()));
    }

    /// Follow a connectivity signal until the returned guard is dropped.
    ///
    /// The online status is seeded from the signal's current value without a
    /// notification. Each later change of `signal` sets the online status and raises a
    /// notification: a success when the connection comes back and a warning
    /// when it is lost.
    pub fn watch_connectivity(
        &self,
        mut signal: watch::Receiver<bool>,
    ) -> ConnectivityGuard {
        let online = *signal.borrow_and_update();
        if self.state.borrow().online_status != online {
            self.dispatch(Action::SetOnlineStatus(online));
        }

        let store = self.clone();
        let task = tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let online = *signal.borrow_and_update();
                if store.state.borrow().online_status == online {
                    continue;
                }
                store.dispatch(Action::SetOnlineStatus(online));
                if online {
                    tracing::info!("connection restored");
                    store.show_success(
                        "Your connection has been restored.",
                        Some("Back online"),
                    );
                } else {
                    tracing::warn!("connection lost");
                    store.show_warning(
                        "You are offline. Some features may be unavailable.",
                        Some("Offline"),
                    );
                }
            }
        });
        ConnectivityGuard { task }
    }
}

/// Stops connectivity tracking when dropped.
#[must_use = "connectivity tracking stops as soon as the guard is dropped"]
pub struct ConnectivityGuard {
    task: JoinHandle<()>,
}

impl Drop for ConnectivityGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
