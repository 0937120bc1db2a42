use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// An untyped response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// The body parsed as JSON.
    Json(Value),
    /// The raw body text, returned verbatim when it is not valid JSON.
    Text(String),
}

impl ResponseBody {
    /// Parses a successful response body.
    ///
    /// A body declared as `application/json` must parse. Any other content type
    /// is sniffed: valid JSON text is returned as [`ResponseBody::Json`], anything
    /// else as [`ResponseBody::Text`].
    ///
    /// # Errors
    ///
    /// Returns an error if the content type is JSON but the body is not.
    pub fn parse(content_type: Option<&str>, text: String) -> Result<Self, serde_json::Error> {
        if content_type.is_some_and(|ct| ct.contains("application/json")) {
            serde_json::from_str(&text).map(Self::Json)
        } else {
            Ok(Self::sniff(text))
        }
    }

    /// Attempts a JSON parse of `text`, falling back to the text itself.
    #[must_use]
    pub fn sniff(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    /// Decodes the body into `T`.
    ///
    /// Raw text decodes as a JSON string, so `T = String` receives it unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not match the shape of `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            Self::Json(value) => serde_json::from_value(value),
            Self::Text(text) => serde_json::from_value(Value::String(text)),
        }
    }

    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// A successful response: the parsed body and its status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse<T> {
    pub result: T,
    pub status: StatusCode,
}

impl<T> FetchResponse<T> {
    /// Maps the parsed body, keeping the status code.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResponse<U> {
        FetchResponse {
            result: f(self.result),
            status: self.status,
        }
    }
}
