//! chat-relay - credential-injecting relay for chat-completion APIs
//!
//! This library provides the core of the relay: configuration, the error
//! envelope, and the HTTP handler that forwards chat requests upstream in
//! buffered or streaming mode.

pub mod config;
pub mod error;
pub mod relay;

pub use config::Config;
pub use error::{Error, Result};
