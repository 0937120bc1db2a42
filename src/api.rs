//! The request wrapper.
//!
//! [`ApiClient`] builds a URL from a path and query parameters, performs a single
//! HTTP call and classifies the response:
//!
//! - **2xx**: the body is parsed as JSON when the server declares a JSON content
//!   type. Otherwise it is sniffed: valid JSON text is parsed, anything else is
//!   returned verbatim as text.
//! - **non-2xx**: the call fails with [`HttpError::Status`], carrying the status
//!   code, a description and the best-effort parsed body.
//! - **cancelled**: if the request's [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   fires, the call fails with [`HttpError::Aborted`] instead of the raw transport
//!   error.

mod client;
mod error;
mod request;
mod response;

pub use client::{ApiClient, ClientConfig, DEFAULT_BASE_URL};
pub use error::{HttpError, Result};
pub use request::{Body, Method, RequestConfig, make_url};
pub use response::{FetchResponse, ResponseBody};
