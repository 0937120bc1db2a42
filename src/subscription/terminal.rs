use std::hash::{DefaultHasher, Hash, Hasher};
use std::io;

use crossterm::event::{Event, EventStream};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio_util::sync::CancellationToken;

use super::{SubscriptionId, SubscriptionSource};

/// Terminal input events from crossterm's `EventStream`.
///
/// Read errors are forwarded as `Err` and end the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminalEvents;

impl TerminalEvents {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SubscriptionSource for TerminalEvents {
    type Output = Result<Event, io::Error>;

    fn stream(&self, token: CancellationToken) -> BoxStream<'static, Self::Output> {
        stream::unfold(
            Some((EventStream::new(), token)),
            |state| async move {
                let (mut events, token) = state?;
                let next = tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    next = events.next() => next,
                };
                match next? {
                    Ok(event) => Some((Ok(event), Some((events, token)))),
                    Err(err) => Some((Err(err), None)),
                }
            },
        )
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl Hash for TerminalEvents {
    fn hash<H: Hasher>(&self, state: &mut H) {
        "terminal".hash(state);
    }
}
