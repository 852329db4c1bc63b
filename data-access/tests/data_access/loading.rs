use data_access::{LoadingKind, LoadingOptions, LoadingTracker};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn quick_stop_is_held_for_min_loading_time() {
    let tracker = LoadingTracker::default();

    tracker.start_loading(LoadingKind::Loading, None);
    tracker.stop_loading(None);
    assert!(tracker.snapshot().is_loading);

    sleep(Duration::from_millis(299)).await;
    assert!(tracker.snapshot().is_loading);

    sleep(Duration::from_millis(2)).await;
    assert!(!tracker.snapshot().is_loading);
}

#[tokio::test(start_paused = true)]
async fn slow_operation_stops_immediately() {
    let tracker = LoadingTracker::default();

    tracker.start_loading(LoadingKind::Fetching, Some("Loading units"));
    sleep(Duration::from_millis(500)).await;
    tracker.stop_loading(None);

    let state = tracker.snapshot();
    assert!(!state.is_fetching);
    assert_eq!(state.message.as_deref(), Some("Loading units"));
}

#[tokio::test(start_paused = true)]
async fn without_flicker_prevention_stop_is_immediate() {
    let tracker = LoadingTracker::new(LoadingOptions {
        prevent_flicker: false,
        ..Default::default()
    });

    tracker.start_loading(LoadingKind::Submitting, None);
    tracker.stop_loading(None);
    assert!(!tracker.snapshot().is_submitting);
}

#[tokio::test(start_paused = true)]
async fn stop_before_delay_never_shows_the_flag() {
    let tracker = LoadingTracker::new(LoadingOptions {
        delay_before_loading: Duration::from_millis(100),
        ..Default::default()
    });

    tracker.start_loading(LoadingKind::Loading, None);
    assert!(!tracker.snapshot().is_loading);

    sleep(Duration::from_millis(50)).await;
    tracker.stop_loading(None);

    sleep(Duration::from_millis(500)).await;
    assert!(!tracker.snapshot().is_loading);
}

#[tokio::test(start_paused = true)]
async fn min_time_counts_from_when_the_flag_appeared() {
    let tracker = LoadingTracker::new(LoadingOptions {
        delay_before_loading: Duration::from_millis(100),
        ..Default::default()
    });

    tracker.start_loading(LoadingKind::Validating, None);
    sleep(Duration::from_millis(150)).await;
    assert!(tracker.snapshot().is_validating);

    // visible for 50ms so far, so it stays up until t=400ms
    tracker.stop_loading(None);
    sleep(Duration::from_millis(240)).await;
    assert!(tracker.snapshot().is_validating);

    sleep(Duration::from_millis(20)).await;
    assert!(!tracker.snapshot().is_validating);
}

#[tokio::test(start_paused = true)]
async fn start_of_another_kind_keeps_pending_stop() {
    let tracker = LoadingTracker::default();

    tracker.start_loading(LoadingKind::Loading, None);
    tracker.stop_loading(None);
    sleep(Duration::from_millis(100)).await;
    tracker.start_loading(LoadingKind::Submitting, None);

    let state = tracker.snapshot();
    assert!(state.is_loading);
    assert!(state.is_submitting);

    sleep(Duration::from_millis(201)).await;
    let state = tracker.snapshot();
    assert!(!state.is_loading);
    assert!(state.is_submitting);

    sleep(Duration::from_secs(5)).await;
    assert!(tracker.snapshot().is_submitting);
}

#[tokio::test(start_paused = true)]
async fn restart_of_same_kind_cancels_pending_stop() {
    let tracker = LoadingTracker::default();

    tracker.start_loading(LoadingKind::Fetching, None);
    tracker.stop_loading(None);
    sleep(Duration::from_millis(100)).await;
    tracker.start_loading(LoadingKind::Fetching, None);

    sleep(Duration::from_secs(1)).await;
    assert!(tracker.snapshot().is_fetching);
}

#[tokio::test(start_paused = true)]
async fn overlapping_delayed_starts_both_show() {
    let tracker = LoadingTracker::new(LoadingOptions {
        delay_before_loading: Duration::from_millis(100),
        ..Default::default()
    });

    tracker.start_loading(LoadingKind::Loading, None);
    sleep(Duration::from_millis(50)).await;
    tracker.start_loading(LoadingKind::Submitting, None);

    sleep(Duration::from_millis(60)).await;
    let state = tracker.snapshot();
    assert!(state.is_loading);
    assert!(!state.is_submitting);

    sleep(Duration::from_millis(500)).await;
    let state = tracker.snapshot();
    assert!(state.is_loading);
    assert!(state.is_submitting);
}

#[tokio::test(start_paused = true)]
async fn pending_stop_error_is_dropped_by_newer_start() {
    let tracker = LoadingTracker::default();

    tracker.start_loading(LoadingKind::Submitting, None);
    tracker.stop_loading(Some("timeout".into()));
    tracker.start_loading(LoadingKind::Validating, None);

    sleep(Duration::from_millis(301)).await;
    let state = tracker.snapshot();
    assert!(!state.is_submitting);
    assert!(state.is_validating);
    assert_eq!(state.error, None);
}

#[tokio::test(start_paused = true)]
async fn with_loading_records_the_error() {
    let tracker = LoadingTracker::default();

    let result = tracker
        .with_loading(LoadingKind::Submitting, async {
            Err::<(), _>("unit number already taken")
        })
        .await;
    assert!(result.is_err());
    assert!(tracker.snapshot().is_submitting);

    sleep(Duration::from_millis(301)).await;
    let state = tracker.snapshot();
    assert!(!state.is_busy());
    assert_eq!(state.error.as_deref(), Some("unit number already taken"));
}

#[tokio::test(start_paused = true)]
async fn reset_drops_pending_transitions() {
    let tracker = LoadingTracker::new(LoadingOptions {
        delay_before_loading: Duration::from_millis(100),
        ..Default::default()
    });

    tracker.start_loading(LoadingKind::Fetching, None);
    assert_eq!(tracker.snapshot().progress, None);
    tracker.set_progress(40, Some("page 2 of 5"));
    assert_eq!(tracker.snapshot().progress, Some(40));
    tracker.reset();

    sleep(Duration::from_millis(200)).await;
    let state = tracker.snapshot();
    assert!(!state.is_busy());
    assert_eq!(state.progress, None);
    assert_eq!(state.message, None);
}
