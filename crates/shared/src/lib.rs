//! Shared types for the campusnet client: REST models, realtime wire
//! protocol and the client error type.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
