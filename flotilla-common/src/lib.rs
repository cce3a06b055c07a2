//! Flotilla Common
//!
//! Common utilities for the Flotilla fleet stack.
//!
//! This crate provides:
//! - Component-based structured logging with node ID context
//! - Logging configuration applied at node startup

pub mod logging;

pub use logging::{Component, LogLevel, Logger, LoggingConfig};
