use std::time::Duration;
use thiserror::Error;

/// Failure of one etymology, illustration or search operation.
///
/// Upstream variants are classified once, from the HTTP status the upstream
/// returned, by the client that made the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{service} API key is not configured")]
    Misconfigured { service: &'static str },

    #[error("{service} request failed: {message}")]
    UpstreamFailure {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{service} returned no usable result")]
    UpstreamEmptyResult { service: &'static str },

    #[error("{service} rate limit exceeded")]
    RateLimited { service: &'static str },

    #[error("{service} rejected the request: {message}")]
    ContentRejected {
        service: &'static str,
        message: String,
    },

    #[error("{service} did not answer within {timeout:?}")]
    Timeout {
        service: &'static str,
        timeout: Duration,
    },
}

/// What an upstream means when it answers HTTP 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadRequest {
    /// The prompt itself was refused, as the image API does.
    ContentRejected,
    /// A fault on our side of the call, such as an invalid key.
    Failure,
}

impl ServiceError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(
        service: &'static str,
        status: u16,
        bad_request: BadRequest,
        message: impl Into<String>,
    ) -> Self {
        match (status, bad_request) {
            (429, _) => ServiceError::RateLimited { service },
            (400, BadRequest::ContentRejected) => ServiceError::ContentRejected {
                service,
                message: message.into(),
            },
            _ => ServiceError::UpstreamFailure {
                service,
                status: Some(status),
                message: message.into(),
            },
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout { .. } => true,
            ServiceError::UpstreamFailure { status, .. } => {
                status.is_none_or(|code| code >= 500 || code == 408)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_variants() {
        assert_eq!(
            ServiceError::from_status("OpenAI", 429, BadRequest::ContentRejected, "slow down"),
            ServiceError::RateLimited { service: "OpenAI" }
        );
        assert!(matches!(
            ServiceError::from_status("OpenAI", 400, BadRequest::ContentRejected, "policy"),
            ServiceError::ContentRejected { .. }
        ));
        assert!(matches!(
            ServiceError::from_status("OpenAI", 503, BadRequest::ContentRejected, "down"),
            ServiceError::UpstreamFailure { status: Some(503), .. }
        ));
    }

    #[test]
    fn bad_request_is_a_failure_unless_the_api_rejects_content() {
        assert_eq!(
            ServiceError::from_status("Gemini", 400, BadRequest::Failure, "API key not valid"),
            ServiceError::UpstreamFailure {
                service: "Gemini",
                status: Some(400),
                message: "API key not valid".into(),
            }
        );
        assert_eq!(
            ServiceError::from_status("Gemini", 429, BadRequest::Failure, ""),
            ServiceError::RateLimited { service: "Gemini" }
        );
    }

    #[test]
    fn only_network_and_server_errors_are_transient() {
        let network = ServiceError::UpstreamFailure {
            service: "Gemini",
            status: None,
            message: "connection reset".into(),
        };
        assert!(network.is_transient());
        assert!(ServiceError::from_status("Gemini", 502, BadRequest::Failure, "").is_transient());
        assert!(!ServiceError::from_status("Gemini", 401, BadRequest::Failure, "").is_transient());
        assert!(!ServiceError::from_status("Gemini", 400, BadRequest::Failure, "").is_transient());
        assert!(!ServiceError::RateLimited { service: "Gemini" }.is_transient());
        assert!(
            ServiceError::Timeout {
                service: "Gemini",
                timeout: Duration::from_secs(1)
            }
            .is_transient()
        );
    }
}
