//! Shared types for the trip chat core.
//!
//! Entities, event envelopes and token claims live here so the store, the
//! service, the gateway and the HTTP edge agree on one wire shape.

pub mod api;
pub mod events;
pub mod models;
