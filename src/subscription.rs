//! Subscriptions: long-lived event sources that feed messages into the runtime.
//!
//! An application returns its subscriptions from
//! [`Application::subscriptions`](crate::application::Application::subscriptions)
//! after every update. The [`SubscriptionManager`] compares them by
//! [`SubscriptionId`] with the ones already running:
//!
//! - subscriptions that disappeared are cancelled first,
//! - subscriptions that are new are started afterwards,
//! - subscriptions that are unchanged keep running untouched.
//!
//! Because the id of a parameterized source hashes its parameters, changing a
//! parameter (for example the dependencies of an HTTP query) replaces the
//! subscription. The old one's cancellation token is signaled before the new one
//! starts, so a stale source can never report after its replacement.

pub mod http;
pub mod terminal;

use std::any::TypeId;
use std::collections::HashMap;
use std::convert::Infallible;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::effect::{Abortable, AsyncEffect};

/// Identity of a subscription: the source type plus a hash of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    /// Creates an id for source type `T` with the given parameter hash.
    #[must_use]
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of subscription events.
pub trait SubscriptionSource: Send + 'static {
    type Output;

    /// Creates the event stream. The stream must stop producing once `token`
    /// is cancelled.
    fn stream(&self, token: CancellationToken) -> BoxStream<'static, Self::Output>;

    fn id(&self) -> SubscriptionId;
}

/// A subscription producing messages of type `T`.
pub struct Subscription<T> {
    pub(crate) id: SubscriptionId,
    pub(crate) spawn: Box<dyn FnOnce(CancellationToken) -> BoxStream<'static, T> + Send>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn new(source: impl SubscriptionSource<Output = T>) -> Self {
        let id = source.id();
        Self {
            id,
            spawn: Box::new(move |token| source.stream(token)),
        }
    }

    /// Maps each event to another type, typically the application's message.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + 'static,
    {
        let spawn = self.spawn;
        Subscription {
            id: self.id,
            spawn: Box::new(move |token| spawn(token).map(f).boxed()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Runs subscriptions and forwards their events to the runtime.
pub struct SubscriptionManager<Msg> {
    running: HashMap<SubscriptionId, AsyncEffect>,
    tx: mpsc::UnboundedSender<Msg>,
}

impl<Msg: Send + 'static> SubscriptionManager<Msg> {
    pub fn new(tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self {
            running: HashMap::new(),
            tx,
        }
    }

    /// Brings the running set in line with `subscriptions`.
    pub fn update(&mut self, subscriptions: impl IntoIterator<Item = Subscription<Msg>>) {
        let mut wanted: HashMap<SubscriptionId, Subscription<Msg>> = HashMap::new();
        for sub in subscriptions {
            wanted.entry(sub.id).or_insert(sub);
        }

        let stale: Vec<SubscriptionId> = self
            .running
            .keys()
            .filter(|id| !wanted.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(effect) = self.running.remove(&id) {
                debug!(?id, "stopping subscription");
                effect.cancel();
            }
        }

        for (id, sub) in wanted {
            if self.running.contains_key(&id) {
                continue;
            }
            debug!(?id, "starting subscription");
            let effect = forward(sub, self.tx.clone());
            self.running.insert(id, effect);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.running.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    #[must_use]
    pub fn is_running(&self, id: &SubscriptionId) -> bool {
        self.running.contains_key(id)
    }

    /// Cancels every subscription and waits for their teardown.
    pub async fn shutdown(&mut self) {
        for (_, effect) in self.running.drain() {
            effect.teardown().await;
        }
    }
}

/// Pipes a subscription's stream into `tx` until its token is cancelled.
fn forward<Msg: Send + 'static>(sub: Subscription<Msg>, tx: mpsc::UnboundedSender<Msg>) -> AsyncEffect {
    AsyncEffect::spawn(CancellationToken::new(), move |_bind, token| async move {
        let mut stream = (sub.spawn)(token.clone());
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                item = stream.next() => match item {
                    Some(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        Abortable::<(), Infallible>::from_value(())
    })
}
