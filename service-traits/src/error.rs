use thiserror::Error;

/// Failures reported by a [`RemoteService`](crate::remote::RemoteService)
/// implementation.
///
/// Every remote interaction either fails to reach the service at all
/// (`Network`) or yields an HTTP status (`Http`). `UnknownToken` covers wire
/// values outside the documented vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unrecognized wire token: {0}")]
    UnknownToken(String),
}

impl ServiceError {
    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this failure is expected to resolve on retry.
    ///
    /// Connection-level failures, HTTP 5xx, and HTTP 429 are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Network(_) => true,
            ServiceError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            ServiceError::UnknownToken(_) => false,
        }
    }

    /// Whether this failure indicates rejected or expired credentials
    /// (HTTP 401/403).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ServiceError::Http { status, .. } if *status == 401 || *status == 403)
    }

    /// Whether this failure is a permanent rejection of the request itself
    /// (4xx excluding auth and 429).
    pub fn is_bad_request(&self) -> bool {
        match self {
            ServiceError::Http { status, .. } => {
                (400..500).contains(status) && !self.is_auth_failure() && *status != 429
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Network("connection reset".to_string()).is_transient());
        for status in [500, 502, 503, 599, 429] {
            let err = ServiceError::Http {
                status,
                message: "unavailable".to_string(),
            };
            assert!(err.is_transient(), "HTTP {} should be transient", status);
        }
    }

    #[test]
    fn test_permanent_classification() {
        for status in [400, 404, 422, 409] {
            let err = ServiceError::Http {
                status,
                message: "rejected".to_string(),
            };
            assert!(!err.is_transient());
            assert!(err.is_bad_request(), "HTTP {} should be a bad request", status);
            assert!(!err.is_auth_failure());
        }
    }

    #[test]
    fn test_auth_classification() {
        for status in [401, 403] {
            let err = ServiceError::Http {
                status,
                message: "forbidden".to_string(),
            };
            assert!(err.is_auth_failure(), "HTTP {} should be an auth failure", status);
            assert!(!err.is_transient());
            assert!(!err.is_bad_request());
        }
    }

    #[test]
    fn test_rate_limit_is_not_bad_request() {
        let err = ServiceError::Http {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(err.is_transient());
        assert!(!err.is_bad_request());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(
            ServiceError::Http {
                status: 503,
                message: String::new()
            }
            .status(),
            Some(503)
        );
        assert_eq!(ServiceError::Network("x".to_string()).status(), None);
    }
}
