//! HTTP queries: one cancellable fetch cycle per set of dependencies.
//!
//! A [`Query`] is a subscription. Its id hashes the request (path, query
//! parameters, headers) and its dependencies, so the runtime starts a fresh cycle
//! whenever any of them change and cancels the previous cycle first.
//!
//! Each cycle emits [`QueryUpdate`]s tagged with the cycle's dependency hash:
//!
//! 1. [`QueryAction::Start`]
//! 2. [`QueryAction::Success`] with the decoded body, or [`QueryAction::Error`]
//!
//! Nothing is emitted once the cycle's token has been signaled. Feeding the
//! actions into [`QueryState::reduce`] yields the state to render.
//!
//! # Example
//!
//! ```rust,ignore
//! fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!     vec![
//!         Subscription::new(
//!             Query::<Vec<Task>>::new(self.client.clone(), "/todos").deps(&self.retries),
//!         )
//!         .map(Message::Todos),
//!     ]
//! }
//!
//! fn update(&mut self, msg: Message) -> Command<Message> {
//!     match msg {
//!         Message::Todos(update) if update.cycle == self.todos_cycle() => {
//!             self.todos = std::mem::take(&mut self.todos).reduce(update.action);
//!             Command::none()
//!         }
//!         Message::Todos(_) => Command::none(),
//!     }
//! }
//! ```

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ApiClient, HttpError, RequestConfig};
use crate::effect::{Abortable, AsyncEffect};
use crate::subscription::{SubscriptionId, SubscriptionSource};

/// The state of a query.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// A request is in flight. `previous` holds the last successful data, if any.
    Loading { previous: Option<T> },
    /// The last request failed. `stale` holds data from an earlier success, if any.
    Errored {
        err: Arc<HttpError>,
        stale: Option<T>,
    },
    /// The last request succeeded.
    Success { data: T },
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::Loading { previous: None }
    }
}

/// A state transition of a query.
#[derive(Debug, Clone)]
pub enum QueryAction<T> {
    Start,
    Error(Arc<HttpError>),
    Success(T),
}

impl<T> QueryState<T> {
    /// Applies a transition. The last successful data survives `Start` and
    /// `Error` until the next `Success` replaces it.
    #[must_use]
    pub fn reduce(self, action: QueryAction<T>) -> Self {
        match action {
            QueryAction::Start => Self::Loading {
                previous: self.into_last_data(),
            },
            QueryAction::Error(err) => Self::Errored {
                err,
                stale: self.into_last_data(),
            },
            QueryAction::Success(data) => Self::Success { data },
        }
    }

    fn into_last_data(self) -> Option<T> {
        match self {
            Self::Loading { previous } => previous,
            Self::Errored { stale, .. } => stale,
            Self::Success { data } => Some(data),
        }
    }

    /// Returns the fresh data on success, or stale data after an error.
    /// Nothing is returned while loading.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Errored { stale, .. } => stale.as_ref(),
            Self::Loading { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&HttpError> {
        match self {
            Self::Errored { err, .. } => Some(err.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Errored { .. })
    }
}

/// An action emitted by one query cycle.
#[derive(Debug, Clone)]
pub struct QueryUpdate<T> {
    /// Hash of the dependencies the cycle was started with.
    pub cycle: u64,
    pub action: QueryAction<T>,
}

impl<T> QueryUpdate<T> {
    const fn new(cycle: u64, action: QueryAction<T>) -> Self {
        Self { cycle, action }
    }
}

/// Hashes a dependency value into a cycle id.
#[must_use]
pub fn cycle_of(deps: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    deps.hash(&mut hasher);
    hasher.finish()
}

/// A `GET` request run as a subscription.
pub struct Query<T> {
    client: Arc<ApiClient>,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cycle: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Query<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Creates a query for `path` with no dependencies.
    pub fn new(client: Arc<ApiClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            cycle: cycle_of(&()),
            _marker: PhantomData,
        }
    }

    /// Appends a query parameter, stringified with `Display`.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the dependencies. A change starts a new cycle.
    #[must_use]
    pub fn deps(mut self, deps: &impl Hash) -> Self {
        self.cycle = cycle_of(deps);
        self
    }

    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<T> SubscriptionSource for Query<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = QueryUpdate<T>;

    fn stream(&self, token: CancellationToken) -> BoxStream<'static, Self::Output> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::clone(&self.client);
        let path = self.path.clone();
        let config = RequestConfig::get()
            .queries(self.query.clone())
            .headers(self.headers.clone());
        let cycle = self.cycle;

        // Detached: the effect settles once `token` is cancelled.
        AsyncEffect::spawn(token, move |bind, token| async move {
            let _ = tx.send(QueryUpdate::new(cycle, QueryAction::Start));

            let label = path.clone();
            let fetched = Abortable::from_future(async {
                client
                    .request::<T>(&path, config.cancellation(token.clone()))
                    .await
                    .map(|response| response.result)
                    .map_err(Arc::new)
            })
            .await
            .with_cleanup(move || debug!(path = %label, cycle, "query cycle torn down"));

            let outcome = bind
                .then(fetched, |data| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(QueryUpdate::new(cycle, QueryAction::Success(data)));
                        Ok(())
                    }
                })
                .await;

            if let Some(err) = outcome.error() {
                if !token.is_cancelled() {
                    let _ = tx.send(QueryUpdate::new(cycle, QueryAction::Error(Arc::clone(err))));
                }
            }

            outcome
        });

        UnboundedReceiverStream::new(rx).boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<T> Hash for Query<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.query.hash(state);
        for (name, value) in &self.headers {
            name.as_str().hash(state);
            value.as_bytes().hash(state);
        }
        self.cycle.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClientConfig, ResponseBody};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Arc<ApiClient> {
        let base_url = Url::parse(&server.uri()).expect("mock server uri");
        Arc::new(ApiClient::with_config(ClientConfig::new(base_url)).expect("client init"))
    }

    fn offline_client() -> Arc<ApiClient> {
        Arc::new(ApiClient::new().expect("client init"))
    }

    fn status_error(code: StatusCode) -> Arc<HttpError> {
        Arc::new(HttpError::status(code, ResponseBody::Text(String::new())))
    }

    #[test]
    fn test_reduce_start_hides_data() {
        let state = QueryState::Success { data: 1 }.reduce(QueryAction::Start);
        assert!(state.is_loading());
        assert_eq!(state.data(), None);
        assert!(state.error().is_none());
    }

    #[test]
    fn test_reduce_success() {
        let state = QueryState::default().reduce(QueryAction::Success(vec![1, 2]));
        assert!(state.is_success());
        assert_eq!(state.data(), Some(&vec![1, 2]));
        assert!(state.error().is_none());
    }

    #[test]
    fn test_reduce_error_after_loading_has_no_data() {
        let state: QueryState<i32> = QueryState::default()
            .reduce(QueryAction::Start)
            .reduce(QueryAction::Error(status_error(StatusCode::NOT_FOUND)));
        assert!(state.is_error());
        assert_eq!(state.data(), None);
        assert_eq!(
            state.error().and_then(HttpError::status_code),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[test]
    fn test_reduce_error_after_success_keeps_stale_data() {
        let state = QueryState::Success { data: 5 }
            .reduce(QueryAction::Error(status_error(StatusCode::BAD_GATEWAY)));
        assert!(state.is_error());
        assert_eq!(state.data(), Some(&5));

        let state = state.reduce(QueryAction::Error(status_error(StatusCode::SERVICE_UNAVAILABLE)));
        assert_eq!(state.data(), Some(&5));
        assert_eq!(
            state.error().and_then(HttpError::status_code),
            Some(StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_refetch_error_keeps_stale_data() {
        let state = [
            QueryAction::Start,
            QueryAction::Success(vec![1, 2]),
            QueryAction::Start,
            QueryAction::Error(status_error(StatusCode::BAD_GATEWAY)),
        ]
        .into_iter()
        .fold(QueryState::default(), QueryState::reduce);

        assert!(state.is_error());
        assert_eq!(state.data(), Some(&vec![1, 2]));

        let state = state
            .reduce(QueryAction::Start)
            .reduce(QueryAction::Success(vec![3]));
        assert_eq!(state.data(), Some(&vec![3]));
    }

    #[test]
    fn test_query_id_changes_with_deps() {
        let base = || Query::<Vec<u32>>::new(offline_client(), "/todos");

        assert_eq!(base().deps(&0_u32).id(), base().deps(&0_u32).id());
        assert_ne!(base().deps(&0_u32).id(), base().deps(&1_u32).id());
        assert_ne!(base().deps(&0_u32).cycle(), base().deps(&1_u32).cycle());
    }

    #[test]
    fn test_query_id_changes_with_request() {
        let client = offline_client();
        let todos = Query::<Vec<u32>>::new(client.clone(), "/todos");
        let limited = Query::<Vec<u32>>::new(client.clone(), "/todos").query("_limit", 5);
        let users = Query::<Vec<u32>>::new(client.clone(), "/users");
        let other_type = Query::<String>::new(client, "/todos");

        assert_ne!(todos.id(), limited.id());
        assert_ne!(todos.id(), users.id());
        assert_ne!(todos.id(), other_type.id());
    }

    #[tokio::test]
    async fn test_query_stream_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .and(query_param("_limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([7])))
            .expect(1)
            .mount(&server)
            .await;

        let query = Query::<Vec<u32>>::new(client_for(&server), "/todos")
            .query("_limit", 1)
            .deps(&3_u8);
        let cycle = query.cycle();
        let token = CancellationToken::new();

        let updates: Vec<_> = timeout(Duration::from_secs(2), query.stream(token.clone()).collect::<Vec<_>>())
            .await
            .expect("cycle settles");
        token.cancel();

        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.cycle == cycle));
        assert!(matches!(updates[0].action, QueryAction::Start));
        assert!(matches!(&updates[1].action, QueryAction::Success(data) if data == &vec![7]));
    }

    #[tokio::test]
    async fn test_query_stream_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "down" })))
            .mount(&server)
            .await;

        let query = Query::<Vec<u32>>::new(client_for(&server), "/todos");
        let token = CancellationToken::new();

        let updates: Vec<_> = timeout(Duration::from_secs(2), query.stream(token.clone()).collect::<Vec<_>>())
            .await
            .expect("cycle settles");
        token.cancel();

        assert_eq!(updates.len(), 2);
        match &updates[1].action {
            QueryAction::Error(err) => {
                assert_eq!(err.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
                assert_eq!(
                    err.data().and_then(ResponseBody::as_json),
                    Some(&json!({ "error": "down" }))
                );
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_cycle_is_reported_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let logs = Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
        let sink = Arc::clone(&logs);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || LogSink(Arc::clone(&sink)))
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let query = Query::<Vec<u32>>::new(client_for(&server), "/todos");
        let token = CancellationToken::new();
        let updates: Vec<_> = timeout(Duration::from_secs(2), query.stream(token.clone()).collect::<Vec<_>>())
            .await
            .expect("cycle settles");
        assert!(matches!(updates[1].action, QueryAction::Error(_)));

        token.cancel();
        let text = || String::from_utf8_lossy(&logs.lock().expect("log buffer")).into_owned();
        timeout(Duration::from_secs(1), async {
            while !text().contains("effect failed") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("teardown logs the failure");

        let reported: Vec<String> = text()
            .lines()
            .filter(|line| line.contains("tasklist") && (line.contains(" WARN ") || line.contains(" ERROR ")))
            .map(str::to_owned)
            .collect();
        assert_eq!(reported.len(), 1, "{reported:#?}");
        assert!(reported[0].contains("effect failed"));
    }

    struct LogSink(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_query_stream_cancelled_mid_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([1]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let query = Query::<Vec<u32>>::new(client_for(&server), "/todos");
        let token = CancellationToken::new();
        let mut stream = query.stream(token.clone());

        let first = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("start arrives")
            .expect("stream open");
        assert!(matches!(first.action, QueryAction::Start));

        token.cancel();

        let rest: Vec<_> = timeout(Duration::from_secs(2), stream.collect::<Vec<_>>())
            .await
            .expect("stream ends");
        assert!(rest.is_empty(), "no outcome after cancellation: {rest:?}");
    }
}
