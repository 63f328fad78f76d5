//! Messaging transport abstractions.

pub mod port;
pub mod throttled;
pub mod types;
