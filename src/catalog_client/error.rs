//! Error types for the remote catalog client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Credentials were rejected by the remote catalog. Not retryable;
    /// the caller has to abort the whole user refresh.
    #[error("catalog auth rejected (status {status})")]
    Auth { status: u16 },

    /// Rate limited and still failing after honoring every Retry-After.
    #[error("rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Server-side failures that survived the backoff schedule.
    #[error("transient failure (status {status}) after {attempts} attempts")]
    TransientExhausted { status: u16, attempts: u32 },

    /// Any other non-success response.
    #[error("catalog request failed (status {status}): {body}")]
    Api { status: u16, body: String },

    /// Transport failures and malformed payloads, straight from the HTTP
    /// layer.
    #[error("catalog transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CatalogError {
    /// Auth failures poison every subsequent call for the same user, so the
    /// refresh run must stop instead of skipping the batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::Auth { .. })
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(CatalogError::Auth { status: 401 }.is_fatal());
        assert!(!CatalogError::RateLimitExhausted { attempts: 5 }.is_fatal());
        assert!(!CatalogError::TransientExhausted {
            status: 503,
            attempts: 5
        }
        .is_fatal());
        assert!(!CatalogError::Api {
            status: 404,
            body: "not found".to_string()
        }
        .is_fatal());
    }
}
