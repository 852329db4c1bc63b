use data_access::store::{
    NewNotification, NotificationAction, NotificationType, SyncStatus, Theme,
};
use data_access::store::{Action, MAX_NOTIFICATIONS};
use jiff::SignedDuration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use test_helpers::spawn_app;
use tokio::sync::watch;
use tokio::time::timeout;

#[tokio::test]
async fn notifications_are_stamped_by_the_store() -> anyhow::Result<()> {
    let app = spawn_app();
    let now = app.time_source.now();

    let id = app.app_store.show_error("Could not save the unit.", None);

    let state = app.app_store.snapshot();
    let notification = &state.notifications[0];
    assert_eq!(notification.id, id);
    assert_eq!(notification.kind, NotificationType::Error);
    assert_eq!(notification.title, "Error");
    assert_eq!(notification.message, "Could not save the unit.");
    assert_eq!(notification.timestamp, now);
    assert!(!notification.read);
    assert!(!notification.persistent);
    Ok(())
}

#[tokio::test]
async fn helpers_accept_a_custom_title() -> anyhow::Result<()> {
    let app = spawn_app();
    app.app_store.show_info("Maintenance tonight.", Some("Heads up"));
    app.app_store.show_warning("Quota at 90%.", None);
    app.app_store.show_success("Saved.", None);

    let state = app.app_store.snapshot();
    let titles: Vec<&str> =
        state.notifications.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Success", "Warning", "Heads up"]);
    Ok(())
}

#[tokio::test]
async fn notification_list_is_capped_at_fifty() -> anyhow::Result<()> {
    let app = spawn_app();
    let ids: Vec<_> = (0..55)
        .map(|n| app.app_store.show_info(&format!("message {n}"), None))
        .collect();

    let state = app.app_store.snapshot();
    assert_eq!(state.notifications.len(), MAX_NOTIFICATIONS);
    assert_eq!(state.notifications[0].id, ids[54]);
    assert_eq!(state.notifications[49].id, ids[5]);
    Ok(())
}

#[tokio::test]
async fn read_tracking() -> anyhow::Result<()> {
    let app = spawn_app();
    let first = app.app_store.show_info("one", None);
    let second = app.app_store.show_info("two", None);
    assert_eq!(app.app_store.unread_count(), 2);

    app.app_store.mark_read(first);
    assert_eq!(app.app_store.unread_count(), 1);

    app.app_store.remove_notification(second);
    assert_eq!(app.app_store.unread_count(), 0);
    assert_eq!(app.app_store.snapshot().notifications.len(), 1);

    app.app_store.dispatch(Action::ClearNotifications);
    assert!(app.app_store.snapshot().notifications.is_empty());
    Ok(())
}

#[tokio::test]
async fn notification_actions_are_invocable() -> anyhow::Result<()> {
    let app = spawn_app();
    let clicked = Arc::new(AtomicBool::new(false));
    let action = NotificationAction::new("Retry", {
        let clicked = clicked.clone();
        move || clicked.store(true, Ordering::SeqCst)
    });

    app.app_store.add_notification(
        NewNotification::new(NotificationType::Error, "Sync", "Sync failed")
            .persistent()
            .with_action(action),
    );

    let state = app.app_store.snapshot();
    let notification = &state.notifications[0];
    assert!(notification.persistent);
    let action = notification.action.as_ref().unwrap();
    assert_eq!(action.label, "Retry");
    action.invoke();
    assert!(clicked.load(Ordering::SeqCst));
    Ok(())
}

#[tokio::test]
async fn preferences_sync_and_cache_keys() -> anyhow::Result<()> {
    let app = spawn_app();
    let store = &app.app_store;

    store.dispatch(Action::ToggleSidebar);
    store.dispatch(Action::SetTheme(Theme::Dark));
    store.dispatch(Action::SetLanguage("en-US".into()));
    store.set_sync_status(SyncStatus::Syncing);
    store.track_cache_key("paginated:units");
    store.track_cache_key("paginated:widgets");
    store.untrack_cache_key("paginated:units");

    app.time_source.advance(SignedDuration::from_mins(3));
    store.mark_synced();

    let state = store.snapshot();
    assert!(state.sidebar_collapsed);
    assert_eq!(state.theme, Theme::Dark);
    assert_eq!(state.language, "en-US");
    assert_eq!(state.sync_status, SyncStatus::Success);
    assert_eq!(state.last_sync_at, Some(app.time_source.now()));
    assert_eq!(
        state.cache_keys.iter().collect::<Vec<_>>(),
        vec!["paginated:widgets"]
    );
    Ok(())
}

#[tokio::test]
async fn connectivity_changes_update_status_and_notify() -> anyhow::Result<()>
{
    let app = spawn_app();
    let (online_tx, online_rx) = watch::channel(true);
    let mut updates = app.app_store.subscribe();
    let guard = app.app_store.watch_connectivity(online_rx);

    online_tx.send(false)?;
    timeout(
        Duration::from_secs(1),
        updates.wait_for(|s| !s.online_status && !s.notifications.is_empty()),
    )
    .await??;
    let state = app.app_store.snapshot();
    assert_eq!(state.notifications[0].kind, NotificationType::Warning);

    online_tx.send(true)?;
    timeout(
        Duration::from_secs(1),
        updates.wait_for(|s| s.online_status && s.notifications.len() == 2),
    )
    .await??;
    let state = app.app_store.snapshot();
    assert_eq!(state.notifications[0].kind, NotificationType::Success);

    drop(guard);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _ = online_tx.send(false);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let state = app.app_store.snapshot();
    assert!(state.online_status);
    assert_eq!(state.notifications.len(), 2);
    Ok(())
}

#[tokio::test]
async fn connectivity_starts_from_current_signal() -> anyhow::Result<()> {
    let app = spawn_app();
    let (online_tx, online_rx) = watch::channel(false);
    let guard = app.app_store.watch_connectivity(online_rx);

    let state = app.app_store.snapshot();
    assert!(!state.online_status);
    assert!(state.notifications.is_empty());

    let mut updates = app.app_store.subscribe();
    online_tx.send(true)?;
    timeout(
        Duration::from_secs(1),
        updates.wait_for(|s| s.online_status && s.notifications.len() == 1),
    )
    .await??;
    assert_eq!(
        app.app_store.snapshot().notifications[0].kind,
        NotificationType::Success
    );

    drop(guard);
    Ok(())
}
