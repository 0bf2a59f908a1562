//! Trip-scoped event fan-out.
//!
//! [`EventPublisher`] is the contract the chat service emits through;
//! [`Dispatcher`] is the in-process implementation real-time transports
//! subscribe to.

pub mod dispatcher;
pub mod publisher;

pub use dispatcher::Dispatcher;
pub use publisher::{EventPublisher, PublishError};
