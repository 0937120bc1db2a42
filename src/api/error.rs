use reqwest::StatusCode;
use thiserror::Error;

use crate::effect::AbortError;

use super::response::ResponseBody;

const ABORTED_DESCRIPTION: &str = "The request may have been called several times in a row.";

/// Error type for the request wrapper.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The request was rejected before reaching the network.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP Response Code: {}", status.as_u16())]
    Status {
        status: StatusCode,
        description: String,
        /// Best-effort parsed response body.
        data: ResponseBody,
    },

    /// The request's cancellation token fired.
    #[error("Request was aborted")]
    Aborted,

    /// A request body could not be serialized.
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// A response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other transport failure, propagated unchanged.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl HttpError {
    pub(crate) fn status(status: StatusCode, data: ResponseBody) -> Self {
        Self::Status {
            status,
            description: format!(
                "Status code of response of the request is {} and it means this request has error.",
                status.as_u16()
            ),
            data,
        }
    }

    /// The HTTP status code, for [`HttpError::Status`] only.
    #[must_use]
    pub const fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short, user-facing cause of the failure.
    #[must_use]
    pub fn cause(&self) -> String {
        self.to_string()
    }

    /// Longer explanation shown next to the cause, when one exists.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Status { description, .. } => Some(description),
            Self::Aborted => Some(ABORTED_DESCRIPTION),
            _ => None,
        }
    }

    /// The parsed body of a failed response.
    #[must_use]
    pub const fn data(&self) -> Option<&ResponseBody> {
        match self {
            Self::Status { data, .. } => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl AbortError for HttpError {
    fn is_abort(&self) -> bool {
        self.is_aborted()
    }
}

/// Result type alias for request wrapper operations.
pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_display() {
        let err = HttpError::status(StatusCode::NOT_FOUND, ResponseBody::Json(json!({})));
        assert_eq!(err.to_string(), "HTTP Response Code: 404");
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            err.description(),
            Some("Status code of response of the request is 404 and it means this request has error.")
        );
    }

    #[test]
    fn test_status_error_keeps_body() {
        let body = ResponseBody::Json(json!({ "message": "missing" }));
        let err = HttpError::status(StatusCode::BAD_REQUEST, body.clone());
        assert_eq!(err.data(), Some(&body));
    }

    #[test]
    fn test_aborted_is_abort() {
        let err = HttpError::Aborted;
        assert!(err.is_abort());
        assert_eq!(err.cause(), "Request was aborted");
        assert_eq!(err.description(), Some(ABORTED_DESCRIPTION));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_encode_and_decode_messages_differ() {
        let source = || serde_json::from_str::<u8>("x").expect_err("invalid");
        assert!(HttpError::Encode(source()).to_string().starts_with("Failed to encode request body"));
        assert!(HttpError::from(source()).to_string().starts_with("Failed to decode response"));
    }

    #[test]
    fn test_invalid_argument_is_not_abort() {
        let err = HttpError::InvalidArgument("Method GET does not support a body.".to_string());
        assert!(!err.is_abort());
        assert_eq!(err.description(), None);
        assert_eq!(
            err.to_string(),
            "Invalid argument: Method GET does not support a body."
        );
    }
}
