use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::error::{HttpError, Result};
use super::request::{Body, RequestConfig, make_url};
use super::response::{FetchResponse, ResponseBody};

/// Base URL of the public task API.
pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Every request path is appended to this URL.
    pub base_url: Url,
    pub connect_timeout: Duration,
    /// Headers sent with every request unless the request overrides them.
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            connect_timeout: Duration::from_secs(10),
            default_headers: HeaderMap::new(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given base URL with default settings.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            ..Self::default()
        }
    }
}

/// The request wrapper.
///
/// Every call performs exactly one network request: no retries, no caching.
///
/// # Example
///
/// ```rust,no_run
/// use tasklist::api::{ApiClient, RequestConfig};
/// use tasklist::tasks::Task;
///
/// # async fn run() -> Result<(), tasklist::api::HttpError> {
/// let client = ApiClient::new()?;
/// let response = client
///     .request::<Vec<Task>>("/todos", RequestConfig::get().query("_limit", 10))
///     .await?;
/// println!("{} tasks ({})", response.result.len(), response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
}

impl ApiClient {
    /// Creates a client for the default task API.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(config.default_headers.clone())
            .build()?;

        Ok(Self { http, config })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// Performs a request and decodes the body into `T`.
    ///
    /// # Errors
    ///
    /// - [`HttpError::InvalidArgument`] if a `GET`/`DELETE` request carries a body
    /// - [`HttpError::Status`] on a non-2xx response
    /// - [`HttpError::Aborted`] if the request's cancellation token fired
    /// - [`HttpError::Decode`] if the body does not match `T`
    /// - [`HttpError::Transport`] for any other failure
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        config: RequestConfig,
    ) -> Result<FetchResponse<T>> {
        let outcome = match self.send(path, config).await {
            Ok(FetchResponse { result, status }) => result
                .decode()
                .map(|result| FetchResponse { result, status })
                .map_err(HttpError::from),
            Err(err) => Err(err),
        };
        outcome.inspect_err(|err| log_failure(path, err))
    }

    /// Performs a request and returns the untyped body.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::request`], except that decoding cannot fail once the
    /// body has been read.
    pub async fn request_raw(
        &self,
        path: &str,
        config: RequestConfig,
    ) -> Result<FetchResponse<ResponseBody>> {
        self.send(path, config)
            .await
            .inspect_err(|err| log_failure(path, err))
    }

    async fn send(&self, path: &str, config: RequestConfig) -> Result<FetchResponse<ResponseBody>> {
        config.validate()?;

        let (method, query, body, mut headers, token) = config.into_parts();
        let url = make_url(&self.config.base_url, path, &query)?;

        let is_form = body.as_ref().is_some_and(Body::is_form);
        if !is_form {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let mut builder = self.http.request(method.into(), url.clone()).headers(headers);
        match body {
            Some(Body::Json(value)) => {
                builder = builder.body(serde_json::to_vec(&value).map_err(HttpError::Encode)?);
            }
            Some(Body::Form(form)) => builder = builder.multipart(form),
            None => {}
        }

        debug!(%method, %url, "sending request");
        let exchange = async move { read_response(builder.send().await?).await };

        let outcome = match &token {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(HttpError::Aborted),
                    outcome = exchange => outcome,
                }
            }
            None => exchange.await,
        };

        outcome.map_err(|err| abort_if_cancelled(err, token.as_ref()))
    }
}

/// A failure observed after the token fired is reported as an abort.
fn abort_if_cancelled(err: HttpError, token: Option<&CancellationToken>) -> HttpError {
    let cancelled = token.is_some_and(CancellationToken::is_cancelled);
    match err {
        HttpError::Status { .. } => err,
        _ if cancelled => HttpError::Aborted,
        _ => err,
    }
}

async fn read_response(response: Response) -> Result<FetchResponse<ResponseBody>> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let text = response.text().await?;

    if !status.is_success() {
        return Err(HttpError::status(status, ResponseBody::sniff(text)));
    }

    let result = ResponseBody::parse(content_type.as_deref(), text)?;
    Ok(FetchResponse { result, status })
}

fn log_failure(path: &str, err: &HttpError) {
    if err.is_aborted() {
        debug!(path, "request aborted");
    } else {
        debug!(path, error = %err, "request failed");
    }
}
