//! Typed errors for the data layer.
//!
//! Every call against the backend resolves to `Result<T, ApiError>`. Views and
//! the session layer branch on the variant instead of string matching; the
//! application shell converts to `color_eyre::Report` at the edges.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// Could not reach the backend at all
  #[error("connection error: {0}")]
  Network(String),

  /// Request exceeded its deadline
  #[error("request timed out")]
  Timeout,

  /// 401 - token missing, expired or revoked
  #[error("session expired or unauthorized")]
  Unauthorized,

  /// 403 - authenticated but not allowed
  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// 400 / 422 - backend rejected the payload
  #[error("invalid data: {0}")]
  Validation(String),

  /// 429 from the backend, or no local rate-limit slot within the allowed wait
  #[error("rate limit exceeded for {0}")]
  RateLimited(String),

  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// Any other non-success status
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("unexpected response body: {0}")]
  Decode(String),

  /// Superseded or cancelled; never shown to the user
  #[error("request cancelled")]
  Aborted,

  /// Rejected locally before any request was made
  #[error("{0}")]
  InvalidInput(String),

  /// The token could not be written to or read from disk
  #[error("local storage error: {0}")]
  Storage(String),
}

/// Error body shape used by the backend: `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(alias = "message")]
  error: String,
}

impl ApiError {
  /// Translate a non-success HTTP status plus raw body into a typed error.
  pub fn from_status(status: StatusCode, endpoint: &str, body: &str) -> Self {
    let message = extract_message(body)
      .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    match status.as_u16() {
      401 => ApiError::Unauthorized,
      403 => ApiError::Forbidden(message),
      404 => ApiError::NotFound(message),
      409 => ApiError::Conflict(message),
      400 | 422 => ApiError::Validation(message),
      429 => ApiError::RateLimited(endpoint.to_string()),
      s if s >= 500 => ApiError::Server { status: s, message },
      s => ApiError::Http { status: s, message },
    }
  }

  /// Transient failures worth retrying with backoff.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ApiError::Network(_) | ApiError::Timeout | ApiError::RateLimited(_) | ApiError::Server { .. }
    )
  }

  /// Definitive authentication failures: the stored token must go.
  pub fn is_auth_failure(&self) -> bool {
    matches!(self, ApiError::Unauthorized | ApiError::Forbidden(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      ApiError::Timeout
    } else if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else {
      ApiError::Network(e.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Decode(e.to_string())
  }
}

fn extract_message(body: &str) -> Option<String> {
  let body = body.trim();
  if body.is_empty() {
    return None;
  }
  match serde_json::from_str::<ErrorBody>(body) {
    Ok(parsed) => Some(parsed.error),
    // Plain-text bodies are passed through, HTML error pages are not
    Err(_) if !body.starts_with('<') => Some(body.to_string()),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backend_error_message_is_extracted() {
    let err = ApiError::from_status(
      StatusCode::CONFLICT,
      "/api/usuario-almacenes",
      r#"{"error":"Almacén ya asignado"}"#,
    );
    assert_eq!(err, ApiError::Conflict("Almacén ya asignado".to_string()));
  }

  #[test]
  fn test_plain_text_body_is_kept() {
    let err = ApiError::from_status(StatusCode::BAD_REQUEST, "/api/fechas", "fecha inválida");
    assert_eq!(err, ApiError::Validation("fecha inválida".to_string()));
  }

  #[test]
  fn test_empty_body_falls_back_to_reason() {
    let err = ApiError::from_status(StatusCode::NOT_FOUND, "/api/almacenes/9", "");
    assert_eq!(err, ApiError::NotFound("Not Found".to_string()));
  }

  #[test]
  fn test_status_classification() {
    assert_eq!(
      ApiError::from_status(StatusCode::UNAUTHORIZED, "/api/asistencias", "{}"),
      ApiError::Unauthorized
    );
    assert_eq!(
      ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "/api/asistencias", ""),
      ApiError::RateLimited("/api/asistencias".to_string())
    );
    assert!(matches!(
      ApiError::from_status(StatusCode::BAD_GATEWAY, "/x", "<html>"),
      ApiError::Server { status: 502, .. }
    ));
  }

  #[test]
  fn test_retry_and_auth_predicates() {
    assert!(ApiError::Timeout.is_retryable());
    assert!(ApiError::RateLimited("/a".into()).is_retryable());
    assert!(!ApiError::Unauthorized.is_retryable());
    assert!(ApiError::Unauthorized.is_auth_failure());
    assert!(ApiError::Forbidden("no".into()).is_auth_failure());
    assert!(!ApiError::Timeout.is_auth_failure());
  }
}
