use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::Form;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::{HttpError, Result};

/// HTTP methods supported by the request wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Returns `true` if requests with this method may carry a body.
    #[must_use]
    pub const fn allows_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A request body.
#[derive(Debug)]
pub enum Body {
    /// Serialized as JSON with a JSON content type.
    Json(Value),
    /// Sent as `multipart/form-data`; the content type is left to the form.
    Form(Form),
}

impl Body {
    /// Serializes `value` into a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> std::result::Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    #[must_use]
    pub const fn is_form(&self) -> bool {
        matches!(self, Self::Form(_))
    }
}

/// Per-request options for [`ApiClient::request`](super::ApiClient::request).
///
/// # Example
///
/// ```
/// use tasklist::api::RequestConfig;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let config = RequestConfig::get()
///     .query("_limit", 10)
///     .query("completed", false)
///     .cancellation(token);
/// assert_eq!(config.query_pairs().len(), 2);
/// ```
#[derive(Debug)]
pub struct RequestConfig {
    method: Method,
    query: Vec<(String, String)>,
    body: Option<Body>,
    headers: HeaderMap,
    token: Option<CancellationToken>,
}

impl RequestConfig {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            token: None,
        }
    }

    #[must_use]
    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    #[must_use]
    pub fn post() -> Self {
        Self::new(Method::Post)
    }

    #[must_use]
    pub fn put() -> Self {
        Self::new(Method::Put)
    }

    #[must_use]
    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    /// Appends a query parameter. The value is stringified with `Display`.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends several query parameters, in order.
    #[must_use]
    pub fn queries<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a JSON body serialized from `value`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Encode`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = Body::json(value).map_err(HttpError::Encode)?;
        Ok(self.body(body))
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Ties the request to a cancellation token.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub const fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// Rejects a body on methods that cannot carry one.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.body.is_some() && !self.method.allows_body() {
            return Err(HttpError::InvalidArgument(format!(
                "Method {} does not support a body.",
                self.method
            )));
        }
        Ok(())
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Method,
        Vec<(String, String)>,
        Option<Body>,
        HeaderMap,
        Option<CancellationToken>,
    ) {
        (self.method, self.query, self.body, self.headers, self.token)
    }
}

/// Builds the target URL from the base URL, a path and query parameters.
///
/// The query string is only appended when at least one parameter is given.
///
/// # Errors
///
/// Returns [`HttpError::InvalidArgument`] if the result is not a valid URL.
pub fn make_url(base: &Url, path: &str, query: &[(String, String)]) -> Result<Url> {
    let base = base.as_str().trim_end_matches('/');
    let joined = if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };

    let mut url = Url::parse(&joined)
        .map_err(|e| HttpError::InvalidArgument(format!("invalid url {joined}: {e}")))?;

    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(url)
}
