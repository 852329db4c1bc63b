//! Development console for the data-access layer
//!
//! Pages through one collection and logs every page, then the notifications
//! raised along the way. With `BACKEND_URL` set (directly or through `.env`)
//! it reads from that record store; otherwise it seeds the in-memory store
//! with the development dataset.
//!
//! Usage: cargo run -p dev-console [table]

use anyhow::Result;
use data_access::query::RecordStore;
use data_access::{
    Config, LoadingKind, LoadingTracker, PaginatedQuery, QueryOptions,
    telemetry,
};
use jiff::Timestamp;
use payloads::Filters;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::mock::{DevDataset, UNITS};
use tokio::time::interval;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let subscriber = telemetry::get_subscriber("info".into());
    telemetry::init_subscriber(subscriber)?;

    let table = std::env::args().nth(1).unwrap_or_else(|| UNITS.to_string());
    info!("🚀 Starting data-access dev console");

    let app = test_helpers::spawn_app();
    start_time_sync_task(&app);

    let (store, cache, options) =
        if std::env::var("BACKEND_URL").is_ok() {
            let config = Config::from_env()?;
            info!("🌐 Reading from {}", config.backend_url);
            let client = config.api_client();
            if let Err(e) = client.health_check().await {
                telemetry::log_error(e);
                app.app_store
                    .show_warning("The record store did not answer.", None);
            }
            (
                Arc::new(client) as Arc<dyn RecordStore>,
                Arc::new(config.query_cache(app.time_source.clone())),
                config.query_options(),
            )
        } else {
            info!("📊 No BACKEND_URL, using the development dataset");
            DevDataset::create(&app).print_summary();
            (
                app.store.clone() as Arc<dyn RecordStore>,
                app.cache.clone(),
                QueryOptions::default(),
            )
        };

    let query = PaginatedQuery::<Value>::new(
        store,
        cache,
        table.as_str(),
        Filters::new(),
        options,
    );
    let tracker = LoadingTracker::default();

    let mut state = query.snapshot();
    loop {
        tracker.start_loading(
            LoadingKind::Fetching,
            Some(&format!("{table} page {}", state.page)),
        );
        if state.total == 0 {
            query.fetch().await;
        } else {
            query.next_page().await;
        }
        state = query.snapshot();
        tracker.stop_loading(state.error.clone());

        if let Some(error) = &state.error {
            app.app_store.show_error(error, Some("Could not load rows"));
            break;
        }

        info!(
            "📄 {table}: page {} of {} ({} rows in total)",
            state.page,
            state.total_pages(),
            state.total
        );
        for row in &state.data {
            info!("   {row}");
        }

        if !state.has_next() {
            break;
        }
    }

    if state.error.is_none() {
        app.app_store.mark_synced();
        let summary = format!("Read {} rows from {table}.", state.total);
        app.app_store.show_success(&summary, None);
    }

    info!("🔔 Notifications:");
    for notification in app.app_store.snapshot().notifications {
        info!(
            "   [{:?}] {}: {}",
            notification.kind, notification.title, notification.message
        );
    }
    Ok(())
}

/// Keeps the mocked clock in step with real time so cache entries expire
/// on the wall clock while the console runs.
fn start_time_sync_task(app: &test_helpers::TestApp) {
    let time_source = app.time_source.clone();

    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            time_source.set(Timestamp::now());
        }
    });
}
