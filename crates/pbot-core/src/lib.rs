//! Core domain + application logic for the persona chat bot.
//!
//! This crate is framework-agnostic. Telegram and Gemini live behind ports
//! (traits) implemented in adapter crates; the SQLite history store lives here.

pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;
pub mod followup;
pub mod history;
pub mod imaging;
pub mod logging;
pub mod messaging;
pub mod persona;
pub mod router;
pub mod session;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
