//! Loading indicator state with delayed show and minimum visible time.
//!
//! A spinner that would flash for a few milliseconds is worse than none, so
//! a stop that arrives less than `min_loading_time` after the flag became
//! visible is deferred until that much time has passed. Deferred work runs
//! on spawned tokio tasks. Each kind keeps its own generation counter, so a
//! transition only supersedes pending work of the same kind.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadingKind {
    Loading,
    Submitting,
    Validating,
    Fetching,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadingState {
    pub is_loading: bool,
    pub is_submitting: bool,
    pub is_validating: bool,
    pub is_fetching: bool,
    pub error: Option<String>,
    /// Percent complete within `0..=100`, `None` until reported.
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl LoadingState {
    fn set_flag(&mut self, kind: LoadingKind, on: bool) {
        match kind {
            LoadingKind::Loading => self.is_loading = on,
            LoadingKind::Submitting => self.is_submitting = on,
            LoadingKind::Validating => self.is_validating = on,
            LoadingKind::Fetching => self.is_fetching = on,
        }
    }

    fn clear_flags(&mut self) {
        self.is_loading = false;
        self.is_submitting = false;
        self.is_validating = false;
        self.is_fetching = false;
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading
            || self.is_submitting
            || self.is_validating
            || self.is_fetching
    }
}

#[derive(Debug, Clone)]
pub struct LoadingOptions {
    pub min_loading_time: Duration,
    pub prevent_flicker: bool,
    pub delay_before_loading: Duration,
}

impl Default for LoadingOptions {
    fn default() -> Self {
        Self {
            min_loading_time: Duration::from_millis(300),
            prevent_flicker: true,
            delay_before_loading: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct Slot {
    /// Bumped by every transition of this kind; deferred work carries the
    /// value it was scheduled under and is dropped on mismatch.
    generation: u64,
    /// When the flag of this kind became visible.
    shown_at: Option<Instant>,
}

#[derive(Default)]
struct Timing {
    /// Bumped by every start and reset. A deferred stop records its error
    /// only if nothing began after it.
    epoch: u64,
    slots: HashMap<LoadingKind, Slot>,
}

struct Inner {
    options: LoadingOptions,
    state: watch::Sender<LoadingState>,
    timing: Mutex<Timing>,
}

impl Inner {
    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; clones share one state.
///
/// Must be used from within a tokio runtime whenever a delay or the
/// anti-flicker window is in effect.
#[derive(Clone)]
pub struct LoadingTracker {
    inner: Arc<Inner>,
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new(LoadingOptions::default())
    }
}

impl LoadingTracker {
    pub fn new(options: LoadingOptions) -> Self {
        let (state, _) = watch::channel(LoadingState::default());
        Self {
            inner: Arc::new(Inner {
                options,
                state,
                timing: Mutex::new(Timing::default()),
            }),
        }
    }

    pub fn options(&self) -> &LoadingOptions {
        &self.inner.options
    }

    pub fn snapshot(&self) -> LoadingState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.inner.state.subscribe()
    }

    pub fn start_loading(&self, kind: LoadingKind, message: Option<&str>) {
        let delay = self.inner.options.delay_before_loading;
        let mut timing = self.inner.timing();
        timing.epoch += 1;
        let slot = timing.slots.entry(kind).or_default();
        slot.generation += 1;
        let generation = slot.generation;

        self.inner.state.send_modify(|state| {
            state.error = None;
            state.progress = None;
            if let Some(message) = message {
                state.message = Some(message.to_string());
            }
        });

        if delay.is_zero() {
            slot.shown_at = Some(Instant::now());
            self.inner.state.send_modify(|state| state.set_flag(kind, true));
            return;
        }

        slot.shown_at = None;
        drop(timing);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut timing = inner.timing();
            let slot = timing.slots.entry(kind).or_default();
            if slot.generation != generation {
                return;
            }
            slot.shown_at = Some(Instant::now());
            inner.state.send_modify(|state| state.set_flag(kind, true));
        });
    }

    /// Clear every active flag, recording `error` if given. Flags visible
    /// for less than `min_loading_time` are cleared once it has elapsed.
    pub fn stop_loading(&self, error: Option<String>) {
        let options = &self.inner.options;
        let mut timing = self.inner.timing();
        let epoch = timing.epoch;

        let mut immediate = Vec::new();
        let mut deferred = Vec::new();
        let mut wait = Duration::ZERO;
        for (&kind, slot) in timing.slots.iter_mut() {
            slot.generation += 1;
            let remaining = match slot.shown_at {
                Some(shown_at) if options.prevent_flicker => options
                    .min_loading_time
                    .saturating_sub(shown_at.elapsed()),
                _ => Duration::ZERO,
            };
            if remaining.is_zero() {
                slot.shown_at = None;
                immediate.push(kind);
            } else {
                wait = wait.max(remaining);
                deferred.push((kind, slot.generation));
            }
        }

        if deferred.is_empty() {
            self.inner.state.send_modify(|state| {
                state.clear_flags();
                state.error = error;
            });
            return;
        }
        if !immediate.is_empty() {
            self.inner.state.send_modify(|state| {
                for &kind in &immediate {
                    state.set_flag(kind, false);
                }
            });
        }

        tracing::trace!(
            remaining_ms = wait.as_millis() as u64,
            "deferring loading stop"
        );
        drop(timing);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let mut timing = inner.timing();
            let mut cleared = Vec::new();
            for (kind, generation) in deferred {
                let slot = timing.slots.entry(kind).or_default();
                if slot.generation == generation {
                    slot.shown_at = None;
                    cleared.push(kind);
                }
            }
            let record_error = timing.epoch == epoch;
            inner.state.send_modify(|state| {
                for kind in cleared {
                    state.set_flag(kind, false);
                }
                if record_error {
                    state.error = error;
                }
            });
        });
    }

    pub fn set_progress(&self, progress: u8, message: Option<&str>) {
        self.inner.state.send_modify(|state| {
            state.progress = Some(progress.min(100));
            if let Some(message) = message {
                state.message = Some(message.to_string());
            }
        });
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner
            .state
            .send_modify(|state| state.message = Some(message));
    }

    pub fn clear_error(&self) {
        self.inner
            .state
            .send_if_modified(|state| state.error.take().is_some());
    }

    /// Back to idle, dropping any pending show or stop.
    pub fn reset(&self) {
        let mut timing = self.inner.timing();
        timing.epoch += 1;
        for slot in timing.slots.values_mut() {
            slot.generation += 1;
            slot.shown_at = None;
        }
        self.inner.state.send_replace(LoadingState::default());
    }

    /// Run `operation` between `start_loading` and `stop_loading`, recording
    /// its error message on failure.
    pub async fn with_loading<T, E, Fut>(
        &self,
        kind: LoadingKind,
        operation: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.start_loading(kind, None);
        let result = operation.await;
        self.stop_loading(result.as_ref().err().map(ToString::to_string));
        result
    }
}
