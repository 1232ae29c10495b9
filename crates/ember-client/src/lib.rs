//! Client side of the ember chat API.
//!
//! * [`ApiClient`]: typed calls against `ember-server`.
//! * [`Poller`]: waits for an assistant placeholder to leave `pending`.
//! * [`ChatSession`]: the composer and selection state of one chat view.

pub mod api;
pub mod error;
pub mod poller;
pub mod session;

pub use api::{ApiClient, MessageSource};
pub use error::ClientError;
pub use poller::{PollOutcome, Poller};
pub use session::{ChatSession, ViewState};
