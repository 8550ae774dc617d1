//! # Failure Taxonomy
//!
//! Closed set of failure kinds produced anywhere in the data layer. Boundary
//! adapters (remote clients, local stores) map their own errors into a
//! [`Failure`] exactly once; from then on failures travel through
//! [`Outcome`](crate::outcome::Outcome) chains untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Field-less tag naming each [`Failure`] variant.
///
/// Used by retry predicates and configuration, where only the kind matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Timeout,
    Validation,
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    RateLimit,
    Server,
    CircuitOpen,
    Cache,
    Unexpected,
}

impl FailureKind {
    /// Every kind, in declaration order
    pub const ALL: [FailureKind; 12] = [
        FailureKind::Network,
        FailureKind::Timeout,
        FailureKind::Validation,
        FailureKind::Auth,
        FailureKind::Forbidden,
        FailureKind::NotFound,
        FailureKind::Conflict,
        FailureKind::RateLimit,
        FailureKind::Server,
        FailureKind::CircuitOpen,
        FailureKind::Cache,
        FailureKind::Unexpected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Validation => "validation",
            FailureKind::Auth => "auth",
            FailureKind::Forbidden => "forbidden",
            FailureKind::NotFound => "not_found",
            FailureKind::Conflict => "conflict",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::Server => "server",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::Cache => "cache",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single invalid field reported by a validation failure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Tagged failure carried by every unsuccessful [`Outcome`](crate::outcome::Outcome).
///
/// Every variant has a human-readable `message` and an optional
/// machine-readable `code`. A failure never changes its variant implicitly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("Network failure: {message}")]
    Network {
        message: String,
        code: Option<String>,
    },

    #[error("Timed out: {message}")]
    Timeout {
        message: String,
        code: Option<String>,
    },

    #[error("Validation failed: {message} ({} field errors)", .field_errors.len())]
    Validation {
        message: String,
        code: Option<String>,
        field_errors: Vec<FieldError>,
    },

    #[error("Authentication required: {message}")]
    Auth {
        message: String,
        code: Option<String>,
    },

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        code: Option<String>,
    },

    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: Option<String>,
    },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        code: Option<String>,
    },

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        code: Option<String>,
        retry_after: Option<Duration>,
    },

    #[error("Server error {status_code}: {message}")]
    Server {
        message: String,
        code: Option<String>,
        status_code: u16,
    },

    #[error("Circuit open: {message}")]
    CircuitOpen {
        message: String,
        code: Option<String>,
    },

    #[error("Cache failure: {message}")]
    Cache {
        message: String,
        code: Option<String>,
    },

    #[error("Unexpected failure: {message}")]
    Unexpected {
        message: String,
        code: Option<String>,
    },
}

impl Failure {
    pub fn network(message: impl Into<String>) -> Self {
        Failure::Network {
            message: message.into(),
            code: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Failure::Timeout {
            message: message.into(),
            code: None,
        }
    }

    pub fn validation(message: impl Into<String>, field_errors: Vec<FieldError>) -> Self {
        Failure::Validation {
            message: message.into(),
            code: None,
            field_errors,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Failure::Auth {
            message: message.into(),
            code: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Failure::Forbidden {
            message: message.into(),
            code: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Failure::NotFound {
            message: message.into(),
            code: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Failure::Conflict {
            message: message.into(),
            code: None,
        }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Failure::RateLimit {
            message: message.into(),
            code: None,
            retry_after,
        }
    }

    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        Failure::Server {
            message: message.into(),
            code: None,
            status_code,
        }
    }

    /// Fail-fast rejection issued by the breaker guarding `component`
    pub fn circuit_open(component: &str) -> Self {
        Failure::CircuitOpen {
            message: format!("Circuit breaker is open for {component}"),
            code: Some("CIRCUIT_OPEN".to_string()),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Failure::Cache {
            message: message.into(),
            code: None,
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Failure::Unexpected {
            message: message.into(),
            code: None,
        }
    }

    /// Map a non-success HTTP status to its failure kind.
    ///
    /// Intended for remote client implementations; the code is set to the
    /// numeric status.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let failure = match status {
            400 | 422 => Failure::validation(message, Vec::new()),
            401 => Failure::auth(message),
            403 => Failure::forbidden(message),
            404 | 410 => Failure::not_found(message),
            408 | 504 => Failure::timeout(message),
            409 | 412 => Failure::conflict(message),
            429 => Failure::rate_limit(message, None),
            500..=599 => Failure::server(status, message),
            _ => Failure::unexpected(message),
        };
        failure.with_code(status.to_string())
    }

    /// Attach a machine-readable code, keeping the variant
    pub fn with_code(mut self, new_code: impl Into<String>) -> Self {
        *self.code_mut() = Some(new_code.into());
        self
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Network { .. } => FailureKind::Network,
            Failure::Timeout { .. } => FailureKind::Timeout,
            Failure::Validation { .. } => FailureKind::Validation,
            Failure::Auth { .. } => FailureKind::Auth,
            Failure::Forbidden { .. } => FailureKind::Forbidden,
            Failure::NotFound { .. } => FailureKind::NotFound,
            Failure::Conflict { .. } => FailureKind::Conflict,
            Failure::RateLimit { .. } => FailureKind::RateLimit,
            Failure::Server { .. } => FailureKind::Server,
            Failure::CircuitOpen { .. } => FailureKind::CircuitOpen,
            Failure::Cache { .. } => FailureKind::Cache,
            Failure::Unexpected { .. } => FailureKind::Unexpected,
        }
    }

    pub fn is(&self, kind: FailureKind) -> bool {
        self.kind() == kind
    }

    pub fn message(&self) -> &str {
        match self {
            Failure::Network { message, .. }
            | Failure::Timeout { message, .. }
            | Failure::Validation { message, .. }
            | Failure::Auth { message, .. }
            | Failure::Forbidden { message, .. }
            | Failure::NotFound { message, .. }
            | Failure::Conflict { message, .. }
            | Failure::RateLimit { message, .. }
            | Failure::Server { message, .. }
            | Failure::CircuitOpen { message, .. }
            | Failure::Cache { message, .. }
            | Failure::Unexpected { message, .. } => message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Failure::Network { code, .. }
            | Failure::Timeout { code, .. }
            | Failure::Validation { code, .. }
            | Failure::Auth { code, .. }
            | Failure::Forbidden { code, .. }
            | Failure::NotFound { code, .. }
            | Failure::Conflict { code, .. }
            | Failure::RateLimit { code, .. }
            | Failure::Server { code, .. }
            | Failure::CircuitOpen { code, .. }
            | Failure::Cache { code, .. }
            | Failure::Unexpected { code, .. } => code.as_deref(),
        }
    }

    fn code_mut(&mut self) -> &mut Option<String> {
        match self {
            Failure::Network { code, .. }
            | Failure::Timeout { code, .. }
            | Failure::Validation { code, .. }
            | Failure::Auth { code, .. }
            | Failure::Forbidden { code, .. }
            | Failure::NotFound { code, .. }
            | Failure::Conflict { code, .. }
            | Failure::RateLimit { code, .. }
            | Failure::Server { code, .. }
            | Failure::CircuitOpen { code, .. }
            | Failure::Cache { code, .. }
            | Failure::Unexpected { code, .. } => code,
        }
    }

    /// Server-suggested wait before the next attempt (rate limits only)
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Failure::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Failure::Validation { field_errors, .. } => field_errors,
            _ => &[],
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Failure::Server { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: FailureKind) -> Failure {
        match kind {
            FailureKind::Network => Failure::network("offline"),
            FailureKind::Timeout => Failure::timeout("took too long"),
            FailureKind::Validation => {
                Failure::validation("bad input", vec![FieldError::new("email", "missing")])
            }
            FailureKind::Auth => Failure::auth("token expired"),
            FailureKind::Forbidden => Failure::forbidden("not yours"),
            FailureKind::NotFound => Failure::not_found("user 7"),
            FailureKind::Conflict => Failure::conflict("stale revision"),
            FailureKind::RateLimit => {
                Failure::rate_limit("slow down", Some(Duration::from_secs(2)))
            }
            FailureKind::Server => Failure::server(503, "unavailable"),
            FailureKind::CircuitOpen => Failure::circuit_open("users_api"),
            FailureKind::Cache => Failure::cache("poisoned"),
            FailureKind::Unexpected => Failure::unexpected("boom"),
        }
    }

    #[test]
    fn test_every_kind_round_trips_through_its_variant() {
        for kind in FailureKind::ALL {
            assert_eq!(sample(kind).kind(), kind);
        }
    }

    #[test]
    fn test_with_code_keeps_variant_and_message() {
        let failure = Failure::server(500, "exploded").with_code("E_INTERNAL");

        assert_eq!(failure.kind(), FailureKind::Server);
        assert_eq!(failure.message(), "exploded");
        assert_eq!(failure.code(), Some("E_INTERNAL"));
        assert_eq!(failure.status_code(), Some(500));
    }

    #[test]
    fn test_variant_specific_accessors() {
        let rate_limited = sample(FailureKind::RateLimit);
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(2)));
        assert!(rate_limited.field_errors().is_empty());

        let invalid = sample(FailureKind::Validation);
        assert_eq!(invalid.field_errors().len(), 1);
        assert_eq!(invalid.field_errors()[0].field, "email");
        assert_eq!(invalid.retry_after(), None);
    }

    #[test]
    fn test_circuit_open_message_names_component() {
        let failure = Failure::circuit_open("orders_api");
        assert_eq!(failure.code(), Some("CIRCUIT_OPEN"));
        assert!(failure.to_string().contains("orders_api"));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Failure::from_http_status(404, "x").kind(), FailureKind::NotFound);
        assert_eq!(Failure::from_http_status(429, "x").kind(), FailureKind::RateLimit);
        assert_eq!(Failure::from_http_status(504, "x").kind(), FailureKind::Timeout);
        assert_eq!(Failure::from_http_status(409, "x").kind(), FailureKind::Conflict);

        let server = Failure::from_http_status(503, "unavailable");
        assert_eq!(server.status_code(), Some(503));
        assert_eq!(server.code(), Some("503"));

        assert_eq!(Failure::from_http_status(302, "x").kind(), FailureKind::Unexpected);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::RateLimit).unwrap();
        assert_eq!(json, "\"rate_limit\"");
        let parsed: FailureKind = serde_json::from_str("\"circuit_open\"").unwrap();
        assert_eq!(parsed, FailureKind::CircuitOpen);
    }
}
