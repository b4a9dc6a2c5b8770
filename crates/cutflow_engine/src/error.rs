use std::time::Duration;

use cutflow_core::CallFailure;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Transport(String),
    /// The backend answered with a non-success status. `detail` is the
    /// backend's own message when it sent one.
    #[error("{detail} (http {status})")]
    Application { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("local io error: {0}")]
    Io(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RequestError>,
    },
}

impl RequestError {
    /// Timeouts and transport failures are worth another attempt; anything
    /// the backend actually answered is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RequestError::Timeout(_) | RequestError::Transport(_))
    }

    pub fn into_call_failure(self) -> CallFailure {
        match self {
            RequestError::RetriesExhausted { .. } => CallFailure::Exhausted(self.to_string()),
            RequestError::Application { detail, .. } => CallFailure::Rejected(detail),
            other => CallFailure::Rejected(other.to_string()),
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_builder() {
        return RequestError::InvalidRequest(err.to_string());
    }
    if err.is_decode() {
        return RequestError::Malformed(err.to_string());
    }
    RequestError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(RequestError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(RequestError::Transport("refused".into()).is_transient());
        assert!(!RequestError::Application {
            status: 422,
            detail: "bad".into()
        }
        .is_transient());
        assert!(!RequestError::Malformed("eof".into()).is_transient());
    }

    #[test]
    fn call_failure_keeps_backend_detail_verbatim() {
        let failure = RequestError::Application {
            status: 404,
            detail: "project not found".into(),
        }
        .into_call_failure();
        assert_eq!(failure, CallFailure::Rejected("project not found".into()));

        let exhausted = RequestError::RetriesExhausted {
            attempts: 3,
            last: Box::new(RequestError::Timeout(Duration::from_millis(30_000))),
        }
        .into_call_failure();
        assert_eq!(
            exhausted,
            CallFailure::Exhausted("gave up after 3 attempts: request timed out after 30000ms".into())
        );
    }
}
