use tracing::Subscriber;
use tracing::subscriber::set_global_default;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

use crate::error::AppError;

/// Log an error if it exists using the alternate selector, which emits the
/// error chain.
pub fn log_error(e: impl Into<anyhow::Error>) {
    let e: anyhow::Error = e.into();
    tracing::error!("{e:#}");
}

/// Log the full structured form of an AppError. Users only ever see
/// `ErrorKind::user_message`; this is the diagnostic counterpart.
pub fn log_app_error(context: &str, e: &AppError) {
    tracing::error!(
        kind = %e.kind,
        code = e.code.as_deref().unwrap_or("-"),
        details = e.details.as_deref().unwrap_or("-"),
        timestamp = %e.timestamp,
        "{context}: {}",
        e.message
    );
}

/// Build a subscriber that writes pretty logs to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter` when set.
pub fn get_subscriber(default_filter: String) -> impl Subscriber + Sync + Send {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stderr = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .pretty()
        .with_span_events(fmt::format::FmtSpan::CLOSE);
    Registry::default().with(env_filter).with(stderr)
}

/// Register a subscriber as global default to process span data.
///
/// It should only be called once!
pub fn init_subscriber(
    subscriber: impl Subscriber + Sync + Send,
) -> anyhow::Result<()> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}
