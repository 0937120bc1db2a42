//! # tasklist
//!
//! A terminal task list backed by a JSON API, built on a small Elm-style
//! runtime over [ratatui](https://ratatui.rs/).
//!
//! ## Layers
//!
//! - [`api`]: the request wrapper. One `reqwest` call per request, cancellable
//!   through a `CancellationToken`, with status and body decoding rules.
//! - [`effect`]: cancellable effect chains. Stages are [`Abortable`](effect::Abortable)
//!   values bound with [`Bind`](effect::Bind); cleanups run in reverse on teardown.
//! - [`subscription`]: long-lived event sources diffed by id. HTTP
//!   [`Query`](subscription::http::Query) and
//!   [`Mutation`](subscription::http::Mutation) live under `subscription::http`.
//! - [`runtime`]: the event loop driving an [`Application`](application::Application).
//! - [`app`] and [`tasks`]: the task list itself.
//!
//! ## Architecture
//!
//! 1. **Model**: the application state
//! 2. **Message**: events that can change the state
//! 3. **Update**: processes messages and returns [`Command`](command::Command)s
//! 4. **View**: renders the state
//! 5. **Subscriptions**: event sources derived from the state

pub mod api;
pub mod app;
pub mod application;
pub mod command;
pub mod config;
pub mod effect;
pub mod logging;
pub mod prelude;
pub mod runtime;
pub mod subscription;
pub mod tasks;
