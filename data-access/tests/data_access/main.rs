mod cache;
mod loading;
mod retry;
mod store;

use serde::Deserialize;
use test_helpers::spawn_app;

/// Row shape of the seeded `widgets` collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Widget {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Unit {
    pub id: String,
    pub condo_id: String,
    pub number: String,
}

pub fn names(widgets: &[Widget]) -> Vec<&str> {
    widgets.iter().map(|w| w.name.as_str()).collect()
}

#[tokio::test]
async fn fresh_app_starts_idle() -> anyhow::Result<()> {
    let app = spawn_app();

    assert!(app.cache.is_empty());
    assert_eq!(app.store.call_count(), 0);
    let state = app.app_store.snapshot();
    assert!(state.online_status);
    assert!(state.notifications.is_empty());

    Ok(())
}
