//! Chat Service: the only entry point to the chat core.
//!
//! Every operation resolves the actor from the [`RequestContext`], asks the
//! [`TripDirectory`] for the actor's role, checks [`policy`], runs the store
//! work in one transaction and publishes an event after commit.

pub mod context;
pub mod error;
pub mod policy;
pub mod profiles;
pub mod sequencer;
pub mod service;
pub mod trips;

pub use context::RequestContext;
pub use error::ChatError;
pub use profiles::{ProfileError, ProfileLookup, StaticProfiles};
pub use service::{ChatService, DEFAULT_EMIT_TIMEOUT};
pub use trips::{HttpTripDirectory, StaticTripDirectory, TripAccessError, TripDirectory};
