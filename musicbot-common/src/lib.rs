//! Shared types for the musicbot daemon
//!
//! Carries the message bus (envelopes, message catalog, mailboxes,
//! dispatcher), the canonical track types, the error type and the
//! configuration loader used by every actor.

pub mod bus;
pub mod config;
pub mod error;
pub mod track;

pub use error::{Error, Result};
