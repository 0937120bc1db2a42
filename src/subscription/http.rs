//! HTTP data fetching on top of [`ApiClient`](crate::api::ApiClient).
//!
//! - [`Query`] is a subscription: it fetches when started and again whenever its
//!   request or dependencies change. Its updates drive a [`QueryState`].
//! - [`Mutation`] is a command for one-off `POST`/`PUT` requests. It reports
//!   through the same [`QueryAction`]s, so a [`QueryState`] can track it too.
//!
//! # Example
//!
//! ```rust,ignore
//! fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!     vec![
//!         Subscription::new(Query::<Vec<Task>>::new(self.client.clone(), "/todos").deps(&self.retries))
//!             .map(Message::Tasks),
//!     ]
//! }
//!
//! fn update(&mut self, msg: Message) -> Command<Message> {
//!     match msg {
//!         Message::Tasks(update) if update.cycle == self.cycle => {
//!             self.tasks.reduce(update.action);
//!             Command::none()
//!         }
//!         Message::Tasks(_) => Command::none(),
//!         Message::Retry => {
//!             self.retries += 1;
//!             Command::none()
//!         }
//!     }
//! }
//! ```

pub mod mutation;
pub mod query;

pub use mutation::{Mutation, MutationMethod};
pub use query::{Query, QueryAction, QueryState, QueryUpdate, cycle_of};
