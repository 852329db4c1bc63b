use data_access::{AppError, ErrorKind, RetryConfig, with_retry};
use payloads::responses::BackendError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_helpers::assert_error_kind;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn retryable_failure_is_attempted_max_retries_plus_one() {
    let calls = &AtomicU32::new(0);
    let retried_after = Arc::new(Mutex::new(Vec::new()));
    let final_errors = Arc::new(AtomicU32::new(0));

    let config = RetryConfig::default()
        .with_on_retry({
            let retried_after = retried_after.clone();
            move |_, attempt| retried_after.lock().unwrap().push(attempt)
        })
        .with_on_final_error({
            let final_errors = final_errors.clone();
            move |e| {
                assert_eq!(e.kind, ErrorKind::Network);
                final_errors.fetch_add(1, Ordering::SeqCst);
            }
        });

    let result: Result<(), AppError> = with_retry(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::classify(None, "Failed to fetch"))
        },
        &config,
    )
    .await;

    assert_error_kind(result, ErrorKind::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(*retried_after.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(final_errors.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn validation_failure_is_attempted_once() {
    let calls = &AtomicU32::new(0);
    let final_errors = Arc::new(AtomicU32::new(0));
    let config = RetryConfig {
        max_retries: 10,
        ..Default::default()
    }
    .with_on_final_error({
        let final_errors = final_errors.clone();
        move |_| {
            final_errors.fetch_add(1, Ordering::SeqCst);
        }
    });

    let result: Result<(), AppError> = with_retry(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::new("23502", "null value in column \"name\""))
        },
        &config,
    )
    .await;

    assert_error_kind(result, ErrorKind::Validation);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(final_errors.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_is_never_retried() {
    let calls = &AtomicU32::new(0);
    let result: Result<(), AppError> = with_retry(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::new("PGRST301", "JWT expired"))
        },
        &RetryConfig::default(),
    )
    .await;

    assert_error_kind(result, ErrorKind::Authentication);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures_with_backoff() -> anyhow::Result<()>
{
    let calls = &AtomicU32::new(0);
    let started = Instant::now();

    let value = with_retry(
        move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(BackendError::new("503", "Service Unavailable")),
                1 => Err(BackendError::new("429", "Too Many Requests")),
                _ => Ok("rows"),
            }
        },
        &RetryConfig::default(),
    )
    .await?;

    assert_eq!(value, "rows");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 1000ms then 2000ms, each with up to 10% jitter
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(3300), "{elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_single_attempt() {
    let calls = &AtomicU32::new(0);
    let config = RetryConfig {
        max_retries: 0,
        ..Default::default()
    };

    let result: Result<(), AppError> = with_retry(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::new(ErrorKind::Timeout, "statement timeout"))
        },
        &config,
    )
    .await;

    assert_error_kind(result, ErrorKind::Timeout);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn kinds_outside_the_configured_set_are_not_retried() {
    let calls = &AtomicU32::new(0);
    let config = RetryConfig {
        retryable_kinds: [ErrorKind::Network].into_iter().collect(),
        ..Default::default()
    };

    let result: Result<(), AppError> = with_retry(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::new("500", "Internal Server Error"))
        },
        &config,
    )
    .await;

    assert_error_kind(result, ErrorKind::ServerError);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
