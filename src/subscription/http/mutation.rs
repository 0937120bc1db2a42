//! HTTP mutations: one-off `POST` and `PUT` requests run as commands.
//!
//! Unlike queries, mutations are not subscriptions. [`Mutation::send`] returns a
//! [`Command`] that emits [`QueryAction::Start`] and then the outcome, so the
//! same [`QueryState`](super::QueryState) reducer can track it.
//!
//! The command is tied to a cancellation token owned by the caller. Cancelling it
//! aborts the request and suppresses the outcome; typically the caller cancels it
//! when the data it was mutating is refetched.

use std::future::ready;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, Body, Method, RequestConfig};
use crate::command::Command;

use super::query::QueryAction;

/// Methods a mutation may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMethod {
    Post,
    Put,
}

impl From<MutationMethod> for Method {
    fn from(method: MutationMethod) -> Self {
        match method {
            MutationMethod::Post => Self::Post,
            MutationMethod::Put => Self::Put,
        }
    }
}

/// A data modification whose response decodes into `T`.
pub struct Mutation<T> {
    _phantom: PhantomData<T>,
}

impl<T> Mutation<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Sends `body` to `path` and reports the outcome as [`QueryAction`]s.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// Message::Toggle(task) => {
    ///     let body = Body::json(&task.toggled()).expect("task serializes");
    ///     Mutation::<Task>::send(
    ///         self.client.clone(),
    ///         MutationMethod::Put,
    ///         format!("/todos/{}", task.id),
    ///         body,
    ///         self.mutation_token.clone(),
    ///     )
    ///     .map(Message::Toggled)
    /// }
    /// ```
    pub fn send(
        client: Arc<ApiClient>,
        method: MutationMethod,
        path: impl Into<String>,
        body: Body,
        token: CancellationToken,
    ) -> Command<QueryAction<T>> {
        let path = path.into();

        let outcome = stream::once(async move {
            let config = RequestConfig::new(method.into())
                .body(body)
                .cancellation(token.clone());
            let result = client.request::<T>(&path, config).await;

            if token.is_cancelled() {
                return None;
            }

            Some(match result {
                Ok(response) => QueryAction::Success(response.result),
                Err(err) => QueryAction::Error(Arc::new(err)),
            })
        })
        .filter_map(ready);

        Command::stream(stream::once(ready(QueryAction::Start)).chain(outcome))
    }
}
