//! Status-code handling (spec §4.9 "ParseResponse") and the transport's
//! error taxonomy.

use thiserror::Error;

use crate::model::{SnapshotErrorResponse, SnapshotResponse};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("authentication failed")]
    AuthFailed,
    #[error("quota exceeded")]
    QuotaExceeded { retry_after_seconds: u64 },
    #[error("agent deprecated")]
    Deprecated,
    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },
    #[error("server error (HTTP {0})")]
    Server(u16),
    #[error("unexpected status (HTTP {0})")]
    Unexpected(u16),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response body decode error: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("json encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("send canceled")]
    Canceled,
}

/// "authentication failed" / "quota exceeded" / "agent deprecated" short-
/// circuit the retry loop (spec §4.9).
pub fn is_non_retryable(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::AuthFailed | TransportError::QuotaExceeded { .. } | TransportError::Deprecated
    )
}

/// Recovers the `(status, retry_after_seconds)` pair a failed send was
/// decoded from, so the caller can drive `StateMachine::handle_http_status`
/// the same way a successful send's `(200, 0)` does (spec §4.12 design
/// note: the transport already decoded the status once).
pub fn status_hint(err: &TransportError) -> Option<(u16, u64)> {
    match err {
        TransportError::AuthFailed => Some((401, 0)),
        TransportError::QuotaExceeded { retry_after_seconds } => Some((402, *retry_after_seconds)),
        TransportError::Deprecated => Some((410, 0)),
        TransportError::RateLimited { retry_after_seconds } => Some((429, *retry_after_seconds)),
        TransportError::Server(code) => Some((*code, 0)),
        TransportError::Unexpected(_) | TransportError::Request(_) | TransportError::Decode(_) => None,
        TransportError::Json(_) | TransportError::Canceled => None,
    }
}

pub async fn parse_status(response: reqwest::Response) -> Result<SnapshotResponse, TransportError> {
    let status = response.status();
    match status.as_u16() {
        200 => response.json::<SnapshotResponse>().await.map_err(TransportError::Decode),
        401 | 403 => Err(TransportError::AuthFailed),
        402 => {
            let retry_after_seconds = error_body_retry_after(response).await;
            Err(TransportError::QuotaExceeded { retry_after_seconds })
        }
        410 => Err(TransportError::Deprecated),
        429 => {
            let from_header = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let retry_after_seconds = match from_header {
                Some(secs) => secs,
                None => error_body_retry_after(response).await,
            };
            Err(TransportError::RateLimited { retry_after_seconds })
        }
        500..=599 => Err(TransportError::Server(status.as_u16())),
        other => Err(TransportError::Unexpected(other)),
    }
}

/// Decodes the 402 error body for a suggested retry-after; defaults to 5s
/// (spec §4.9: "a suggested retry-after in seconds if the body provides
/// one").
async fn error_body_retry_after(response: reqwest::Response) -> u64 {
    response
        .json::<SnapshotErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.retry_after_seconds)
        .unwrap_or(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_quota_and_deprecation_are_non_retryable() {
        assert!(is_non_retryable(&TransportError::AuthFailed));
        assert!(is_non_retryable(&TransportError::QuotaExceeded {
            retry_after_seconds: 5
        }));
        assert!(is_non_retryable(&TransportError::Deprecated));
    }

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        assert!(!is_non_retryable(&TransportError::Server(503)));
        assert!(!is_non_retryable(&TransportError::RateLimited {
            retry_after_seconds: 30
        }));
        assert!(!is_non_retryable(&TransportError::Unexpected(418)));
    }

    #[test]
    fn status_hint_recovers_the_decoded_status_for_state_machine_driven_errors() {
        assert_eq!(status_hint(&TransportError::AuthFailed), Some((401, 0)));
        assert_eq!(
            status_hint(&TransportError::QuotaExceeded { retry_after_seconds: 120 }),
            Some((402, 120))
        );
        assert_eq!(status_hint(&TransportError::Deprecated), Some((410, 0)));
        assert_eq!(
            status_hint(&TransportError::RateLimited { retry_after_seconds: 30 }),
            Some((429, 30))
        );
        assert_eq!(status_hint(&TransportError::Server(503)), Some((503, 0)));
        assert_eq!(status_hint(&TransportError::Unexpected(418)), None);
    }
}
