//! Error taxonomy for everything that crosses the record store boundary.
//!
//! Raw backend and transport errors are classified into an [`ErrorKind`]
//! and wrapped in an [`AppError`]. Callers never see the raw error; the
//! user-facing text is one fixed sentence per kind.

use derive_more::Display;
use jiff::Timestamp;
use payloads::{ClientError, responses::BackendError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[display("NETWORK")]
    Network,
    #[display("TIMEOUT")]
    Timeout,
    #[display("RATE_LIMIT")]
    RateLimit,
    #[display("AUTHENTICATION")]
    Authentication,
    #[display("VALIDATION")]
    Validation,
    #[display("SERVER_ERROR")]
    ServerError,
    #[display("NOT_FOUND")]
    NotFound,
    #[display("CONFLICT")]
    Conflict,
    #[display("UNKNOWN")]
    Unknown,
}

impl ErrorKind {
    /// Kinds that are worth retrying when the caller's policy allows it.
    pub const TRANSIENT: [ErrorKind; 4] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::RateLimit,
        ErrorKind::ServerError,
    ];

    /// Validation and authentication failures will fail the same way on
    /// every attempt, whatever a retry policy says.
    pub fn is_structurally_retryable(&self) -> bool {
        !matches!(self, Self::Validation | Self::Authentication)
    }

    /// The sentence shown to users for this kind of failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network => {
                "Connection problem. Check your internet connection and try \
                 again."
            }
            Self::Timeout => "The request took too long. Please try again.",
            Self::RateLimit => {
                "Too many requests. Please wait a moment and try again."
            }
            Self::Authentication => {
                "Your session has expired. Please sign in again."
            }
            Self::Validation => "Some of the data provided is invalid.",
            Self::ServerError => {
                "The server ran into a problem. Please try again later."
            }
            Self::NotFound => "The requested record was not found.",
            Self::Conflict => "This record conflicts with an existing one.",
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }
}

/// A classified failure, carrying enough context to log it in full.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub timestamp: Timestamp,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            details: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Classify a raw `(code, message)` pair.
    ///
    /// The code is consulted first; the message only when the code is absent
    /// or unrecognised.
    pub fn classify(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = code
            .and_then(kind_from_code)
            .or_else(|| kind_from_message(&message))
            .unwrap_or(ErrorKind::Unknown);
        Self {
            kind,
            code: code.map(str::to_owned),
            message,
            details: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }
}

/// Map a backend error code to a kind.
///
/// Recognises PostgREST codes (`PGRST…`), Postgres SQLSTATE codes and bare
/// HTTP status codes. Conflicts are only ever detected through their own
/// codes (`23505`, `409`).
fn kind_from_code(code: &str) -> Option<ErrorKind> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    match code {
        "23505" | "409" => return Some(ErrorKind::Conflict),
        "PGRST116" | "PGRST205" | "42P01" | "404" => {
            return Some(ErrorKind::NotFound);
        }
        "PGRST301" | "PGRST302" | "PGRST303" | "42501" | "28000"
        | "28P01" | "401" | "403" => return Some(ErrorKind::Authentication),
        "57014" | "408" | "504" => return Some(ErrorKind::Timeout),
        "429" => return Some(ErrorKind::RateLimit),
        "400" | "422" => return Some(ErrorKind::Validation),
        _ => {}
    }

    if let Some(rest) = code.strip_prefix("PGRST") {
        return match rest.chars().next() {
            // PGRST0xx: connection to the database failed
            Some('0') => Some(ErrorKind::Network),
            // PGRST1xx: malformed request
            Some('1') => Some(ErrorKind::Validation),
            // PGRST2xx: schema cache / unknown relation
            Some('2') => Some(ErrorKind::NotFound),
            // PGRST3xx: JWT problems
            Some('3') => Some(ErrorKind::Authentication),
            _ => Some(ErrorKind::ServerError),
        };
    }

    if code.len() == 3 && code.chars().all(|c| c.is_ascii_digit()) {
        return match code.as_bytes()[0] {
            b'5' => Some(ErrorKind::ServerError),
            b'4' => Some(ErrorKind::Validation),
            _ => None,
        };
    }

    // SQLSTATE classes
    match code.get(..2)? {
        "08" => Some(ErrorKind::Network),
        "22" | "23" => Some(ErrorKind::Validation),
        "53" | "54" | "55" | "57" | "58" | "XX" => Some(ErrorKind::ServerError),
        _ => None,
    }
}

fn kind_from_message(message: &str) -> Option<ErrorKind> {
    let message = message.to_lowercase();
    let contains_any =
        |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if contains_any(&["timeout", "timed out"]) {
        Some(ErrorKind::Timeout)
    } else if contains_any(&["network", "fetch", "connection", "offline"]) {
        Some(ErrorKind::Network)
    } else if contains_any(&["rate limit", "too many requests"]) {
        Some(ErrorKind::RateLimit)
    } else if contains_any(&["jwt", "unauthorized", "not authenticated"]) {
        Some(ErrorKind::Authentication)
    } else {
        None
    }
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        let mut app_error = AppError::classify(e.code.as_deref(), e.message);
        app_error.details = e.details.or(e.hint);
        app_error
    }
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::APIError(status, body) => {
                from_api_error(status, body)
            }
            ClientError::Network(e) => {
                let kind = if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Network
                };
                AppError::new(kind, e.to_string())
            }
            e @ ClientError::InvalidContentRange(_) => {
                AppError::new(ErrorKind::ServerError, e.to_string())
            }
        }
    }
}

/// Prefer the backend's own code; fall back to the HTTP status when the body
/// had none or the code was not recognised.
fn from_api_error(status: StatusCode, body: BackendError) -> AppError {
    let status_code = status.as_u16().to_string();
    let mut app_error = AppError::from(body);
    if app_error.kind == ErrorKind::Unknown || app_error.code.is_none() {
        if let Some(kind) = kind_from_code(&status_code) {
            app_error.kind = kind;
        }
    }
    if app_error.code.is_none() {
        app_error.code = Some(status_code);
    }
    app_error
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string()).with_code("DECODE")
    }
}

/// Local session controls, implemented by the hosting application.
pub trait SessionHandler {
    fn clear_session(&self);
    fn redirect_to_login(&self);
}

/// Clear the local session and send the user to the login screen when `e`
/// is an authentication failure. Returns whether it did so.
///
/// Never invoked automatically; callers that need it call it explicitly.
pub fn handle_authentication_error(
    e: &AppError,
    session: &dyn SessionHandler,
) -> bool {
    if !e.is_authentication() {
        return false;
    }
    tracing::warn!(code = ?e.code, "Authentication failed, ending session");
    session.clear_session();
    session.redirect_to_login();
    true
}
