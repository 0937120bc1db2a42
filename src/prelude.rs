//! Common imports for writing an application.
//!
//! ```
//! use tasklist::prelude::*;
//! ```

pub use crate::api::{ApiClient, HttpError, RequestConfig};
pub use crate::application::Application;
pub use crate::command::{Action, Command};
pub use crate::effect::{Abortable, AsyncEffect, Bind};
pub use crate::runtime::Runtime;
pub use crate::subscription::Subscription;
pub use crate::subscription::http::{Mutation, MutationMethod, Query, QueryAction, QueryState, QueryUpdate};
