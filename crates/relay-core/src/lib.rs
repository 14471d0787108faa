//! # relay-core
//!
//! Core types, collaborator traits, configuration, and error handling for wa-relay.

pub mod config;
pub mod error;
pub mod message;
pub mod phone;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::shellexpand;
pub use error::RelayError;
