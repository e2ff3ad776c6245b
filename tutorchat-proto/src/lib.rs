//! Shared payload definitions for the `TutorChat` request gateway.

pub mod codec;
pub mod message;
pub mod session;
