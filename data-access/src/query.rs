//! Paginated, filtered, cache-aware reads from the record store.

use async_trait::async_trait;
use jiff::SignedDuration;
use payloads::requests::RecordQuery;
use payloads::responses::RecordPage;
use payloads::{APIClient, Filters, OrderDirection, TableName};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::QueryCache;
use crate::error::AppError;
use crate::retry::{RetryConfig, with_retry};
use crate::telemetry::log_app_error;

pub const CACHE_KEY_PREFIX: &str = "paginated:";

/// The backend seen by the paginator: one ranged, ordered, filtered read.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query(
        &self,
        query: &RecordQuery,
    ) -> Result<RecordPage<Value>, AppError>;
}

#[async_trait]
impl RecordStore for APIClient {
    async fn query(
        &self,
        query: &RecordQuery,
    ) -> Result<RecordPage<Value>, AppError> {
        Ok(self.query_records(query).await?)
    }
}

/// Everything that identifies one page of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRequest {
    pub table: TableName,
    pub filters: Filters,
    pub page: u64,
    pub page_size: u64,
    pub order_by: String,
    pub order_direction: OrderDirection,
}

impl PageRequest {
    /// Deterministic: filters live in a `BTreeMap`, so two requests with the
    /// same field values produce the same key whatever the insertion order.
    pub fn cache_key(&self) -> String {
        let body = serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{self:?}"));
        format!("{CACHE_KEY_PREFIX}{body}")
    }

    pub fn to_record_query(&self) -> RecordQuery {
        RecordQuery {
            table: self.table.clone(),
            filters: self.filters.clone(),
            offset: self.page.saturating_sub(1) * self.page_size,
            limit: self.page_size,
            order_by: self.order_by.clone(),
            order_direction: self.order_direction,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub page_size: u64,
    pub initial_page: u64,
    pub order_by: String,
    pub order_direction: OrderDirection,
    /// Overrides the cache's default TTL for pages of this query.
    pub cache_ttl: Option<SignedDuration>,
    /// Wraps each record store call in the retry policy when set.
    pub retry: Option<RetryConfig>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page_size: 20,
            initial_page: 1,
            order_by: "created_at".to_string(),
            order_direction: OrderDirection::Desc,
            cache_ttl: None,
            retry: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageState<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub loading: bool,
    /// User-facing sentence for the last failure, never the backend text.
    pub error: Option<String>,
}

impl<T> PageState<T> {
    fn empty(page: u64, page_size: u64) -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            page,
            page_size,
            loading: false,
            error: None,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.page_size.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[derive(Clone)]
struct CachedPage<T> {
    rows: Vec<T>,
    total: u64,
}

pub struct PaginatedQuery<T> {
    store: Arc<dyn RecordStore>,
    cache: Arc<QueryCache>,
    table: TableName,
    options: QueryOptions,
    filters: Mutex<Filters>,
    state: watch::Sender<PageState<T>>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl<T> PaginatedQuery<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Nothing is fetched until `fetch` is awaited.
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<QueryCache>,
        table: impl Into<TableName>,
        filters: Filters,
        mut options: QueryOptions,
    ) -> Self {
        options.page_size = options.page_size.max(1);
        options.initial_page = options.initial_page.max(1);
        let (state, _) = watch::channel(PageState::empty(
            options.initial_page,
            options.page_size,
        ));
        Self {
            store,
            cache,
            table: table.into(),
            options,
            filters: Mutex::new(filters),
            state,
            in_flight: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> PageState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.state.subscribe()
    }

    pub fn filters(&self) -> Filters {
        self.lock_filters().clone()
    }

    pub fn request_for(&self, page: u64) -> PageRequest {
        PageRequest {
            table: self.table.clone(),
            filters: self.filters(),
            page,
            page_size: self.options.page_size,
            order_by: self.options.order_by.clone(),
            order_direction: self.options.order_direction,
        }
    }

    /// Cache key of the page currently shown.
    pub fn cache_key(&self) -> String {
        self.request_for(self.state.borrow().page).cache_key()
    }

    /// Load the current page, from the cache when possible.
    pub async fn fetch(&self) {
        let page = self.state.borrow().page;
        self.load(page).await;
    }

    /// Drop the cached copy of the current page and load it again.
    pub async fn refetch(&self) {
        let page = self.state.borrow().page;
        self.cache.invalidate(&self.request_for(page).cache_key());
        self.load(page).await;
    }

    pub async fn next_page(&self) {
        let state = self.snapshot();
        if state.loading || !state.has_next() {
            return;
        }
        self.load(state.page + 1).await;
    }

    pub async fn prev_page(&self) {
        let state = self.snapshot();
        if state.loading || !state.has_prev() {
            return;
        }
        self.load(state.page - 1).await;
    }

    pub async fn go_to_page(&self, page: u64) {
        let total_pages = self.state.borrow().total_pages();
        if page < 1 || page > total_pages {
            return;
        }
        self.load(page).await;
    }

    /// Replace the filters and start over from the initial page.
    pub async fn set_filters(&self, filters: Filters) {
        *self.lock_filters() = filters;
        {
            let _in_flight = self.lock_in_flight();
            self.state.send_modify(|state| {
                state.data.clear();
                state.total = 0;
            });
        }
        self.load(self.options.initial_page).await;
    }

    /// Abort the in-flight fetch, if any. Page, rows and error are left as
    /// they were; only the loading flag is cleared.
    pub fn cancel(&self) {
        let mut in_flight = self.lock_in_flight();
        if let Some(token) = in_flight.take() {
            token.cancel();
            self.state.send_if_modified(|state| {
                std::mem::replace(&mut state.loading, false)
            });
        }
    }

    fn lock_filters(&self) -> MutexGuard<'_, Filters> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel whatever is in flight and hand out the token for a new fetch.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_in_flight().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Apply `update` unless `token` has been superseded. The in-flight lock
    /// is held across the check and the write so a newer fetch cannot slip
    /// in between.
    fn commit(
        &self,
        token: &CancellationToken,
        update: impl FnOnce(&mut PageState<T>),
    ) -> bool {
        let _in_flight = self.lock_in_flight();
        if token.is_cancelled() {
            return false;
        }
        self.state.send_modify(update);
        true
    }

    async fn load(&self, page: u64) {
        let token = self.begin();
        let request = self.request_for(page);
        let key = request.cache_key();

        if let Some(cached) = self.cache.get::<CachedPage<T>>(&key) {
            self.commit(&token, |state| {
                state.data = cached.rows;
                state.total = cached.total;
                state.page = page;
                state.loading = false;
                state.error = None;
            });
            return;
        }

        // `page` moves only together with the rows or the error it belongs to
        let started = self.commit(&token, |state| {
            state.loading = true;
            state.error = None;
        });
        if !started {
            return;
        }

        tracing::debug!(table = %self.table, page, "fetching page");
        let query = request.to_record_query();
        let result = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(table = %self.table, page, "fetch cancelled");
                return;
            }
            result = self.query_store(&query) => result,
        };

        match result.and_then(decode_rows::<T>) {
            Ok(fetched) => {
                let committed = self.commit(&token, |state| {
                    state.data = fetched.rows.clone();
                    state.total = fetched.total;
                    state.page = page;
                    state.loading = false;
                    state.error = None;
                });
                if committed {
                    let ttl = self
                        .options
                        .cache_ttl
                        .unwrap_or_else(|| self.cache.default_ttl());
                    self.cache.set_with_ttl(key, fetched, ttl);
                }
            }
            Err(e) => {
                log_app_error("Failed to fetch page", &e);
                let message = e.user_message().to_string();
                self.commit(&token, |state| {
                    state.data.clear();
                    state.total = 0;
                    state.page = page;
                    state.loading = false;
                    state.error = Some(message);
                });
            }
        }
    }

    async fn query_store(
        &self,
        query: &RecordQuery,
    ) -> Result<RecordPage<Value>, AppError> {
        match &self.options.retry {
            Some(config) => with_retry(|| self.store.query(query), config).await,
            None => self.store.query(query).await,
        }
    }
}

impl<T> Drop for PaginatedQuery<T> {
    fn drop(&mut self) {
        let in_flight = self
            .in_flight
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = in_flight.take() {
            token.cancel();
        }
    }
}

fn decode_rows<T: DeserializeOwned>(
    page: RecordPage<Value>,
) -> Result<CachedPage<T>, AppError> {
    let rows = page
        .rows
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()?;
    Ok(CachedPage {
        rows,
        total: page.total,
    })
}
