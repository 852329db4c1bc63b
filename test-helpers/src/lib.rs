use data_access::time::TimeSource;

pub mod mock;
use async_trait::async_trait;
use data_access::query::{PaginatedQuery, QueryOptions, RecordStore};
use data_access::{AppError, AppStore, ErrorKind, QueryCache, telemetry};
use payloads::requests::RecordQuery;
use payloads::responses::RecordPage;
use payloads::{FilterValue, Filters, TableName};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing_log::LogTracer;
use tracing_subscriber::util::SubscriberInitExt;

/// Everything a data-access test needs, wired the way an application's
/// composition root would wire it.
pub struct TestApp {
    pub store: Arc<MockRecordStore>,
    pub cache: Arc<QueryCache>,
    pub app_store: AppStore,
    pub time_source: TimeSource,
}

impl TestApp {
    /// A paginator over `table` backed by this app's store and cache.
    pub fn paginated<T>(
        &self,
        table: &str,
        filters: Filters,
        options: QueryOptions,
    ) -> PaginatedQuery<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        PaginatedQuery::new(
            self.store.clone(),
            self.cache.clone(),
            table,
            filters,
            options,
        )
    }
}

pub fn spawn_app() -> TestApp {
    let subscriber = telemetry::get_subscriber("error".into());
    let _ = LogTracer::init();
    let _ = subscriber.try_init();

    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new("2025-01-01T00:00:00Z".parse().unwrap());

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();

    TestApp {
        store: Arc::new(MockRecordStore::default()),
        cache: Arc::new(QueryCache::new(time_source.clone())),
        app_store: AppStore::new(time_source.clone()),
        time_source,
    }
}

/// Assert that an operation failed with a specific error kind.
pub fn assert_error_kind<T>(result: Result<T, AppError>, expected: ErrorKind) {
    match result {
        Err(e) => assert_eq!(e.kind, expected, "unexpected error: {e}"),
        Ok(_) => panic!("Expected {expected} error"),
    };
}

/// In-memory record store that answers queries the way the HTTP backend
/// does: equality filters, one ordering column, offset/limit ranging and an
/// exact total.
///
/// Every query is recorded. Failures and per-call delays can be queued up
/// ahead of time; delays use tokio's clock so paused-time tests can drive
/// them.
#[derive(Default)]
pub struct MockRecordStore {
    tables: Mutex<HashMap<TableName, Vec<Value>>>,
    calls: Mutex<Vec<RecordQuery>>,
    failures: Mutex<VecDeque<AppError>>,
    delays: Mutex<VecDeque<Duration>>,
    latency: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRecordStore {
    pub fn create_table(&self, table: impl Into<TableName>) {
        lock(&self.tables).entry(table.into()).or_default();
    }

    pub fn insert(&self, table: impl Into<TableName>, row: Value) {
        lock(&self.tables).entry(table.into()).or_default().push(row);
    }

    pub fn insert_many(
        &self,
        table: impl Into<TableName>,
        rows: impl IntoIterator<Item = Value>,
    ) {
        lock(&self.tables)
            .entry(table.into())
            .or_default()
            .extend(rows);
    }

    /// The next query fails with `error` instead of reading the table.
    pub fn fail_next(&self, error: AppError) {
        lock(&self.failures).push_back(error);
    }

    pub fn fail_times(&self, times: usize, error: AppError) {
        let mut failures = lock(&self.failures);
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    /// The next query sleeps for `delay` before answering.
    pub fn delay_next(&self, delay: Duration) {
        lock(&self.delays).push_back(delay);
    }

    /// Delay applied to every query with nothing queued by `delay_next`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    pub fn calls(&self) -> Vec<RecordQuery> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn query(
        &self,
        query: &RecordQuery,
    ) -> Result<RecordPage<Value>, AppError> {
        lock(&self.calls).push(query.clone());

        let delay = lock(&self.delays).pop_front().or(*lock(&self.latency));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(e) = lock(&self.failures).pop_front() {
            return Err(e);
        }

        let tables = lock(&self.tables);
        let Some(rows) = tables.get(&query.table) else {
            return Err(AppError::classify(
                Some("PGRST205"),
                format!("Could not find the table '{}'", query.table),
            ));
        };

        let mut matching: Vec<Value> = rows
            .iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .filter(|(_, value)| value.is_applicable())
                    .all(|(column, value)| column_equals(row, column, value))
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering =
                compare_fields(a.get(&query.order_by), b.get(&query.order_by));
            if query.order_direction.is_ascending() {
                ordering
            } else {
                ordering.reverse()
            }
        });

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(RecordPage { rows, total })
    }
}

/// `column=eq.value` semantics: compare the textual forms.
fn column_equals(row: &Value, column: &str, value: &FilterValue) -> bool {
    match row.get(column) {
        Some(Value::String(field)) => *field == value.to_query_value(),
        Some(Value::Null) | None => false,
        Some(field) => field.to_string() == value.to_query_value(),
    }
}

/// Ascending order with nulls last, like Postgres.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            x.total_cmp(&y.as_f64().unwrap_or_default())
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
