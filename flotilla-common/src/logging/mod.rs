// Logging utilities for the Flotilla system
//
// This module provides a structured logging layer over the `log` crate:
// - Component-based prefixes so log lines identify the subsystem
// - Node ID tracking through logger inheritance, so lines from different
//   fleet nodes in the same process can be told apart
// - A small configuration type applied once at node startup

use log::{debug, error, info, warn};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Node,
    Notify,
    Dispatch,
    Driver,
    Store,
    Cache,
    Registry,
    Transport,
    System,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Node => "Node",
            Component::Notify => "Notify",
            Component::Dispatch => "Dispatch",
            Component::Driver => "Driver",
            Component::Store => "Store",
            Component::Cache => "Cache",
            Component::Registry => "Registry",
            Component::Transport => "Transport",
            Component::System => "System",
            Component::Custom(name) => name,
        }
    }
}

/// A helper for creating component-specific loggers with node ID tracking
#[derive(Clone)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Node ID for distributed tracing
    node_id: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
}

impl Logger {
    /// Create a new root logger for a specific component and node ID
    /// This should only be called by the Node root component
    pub fn new_root(component: Component, node_id: &str) -> Self {
        Self {
            component,
            node_id: node_id.to_string(),
            parent_component: None,
        }
    }

    /// Create a child logger with the same node ID but different component
    /// This is the preferred way to create loggers in subsystems
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            node_id: self.node_id.clone(),
            parent_component: Some(self.component),
        }
    }

    /// Get a reference to the node ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the component prefix for logging, including parent if available
    fn component_prefix(&self) -> String {
        match self.parent_component {
            Some(parent) if parent != Component::Node => {
                format!("{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => self.component.as_str().to_string(),
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            if self.component == Component::Node && self.parent_component.is_none() {
                debug!("[{}] {}", self.node_id, message.into());
            } else {
                debug!(
                    "[{}][{}] {}",
                    self.node_id,
                    self.component_prefix(),
                    message.into()
                );
            }
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            if self.component == Component::Node && self.parent_component.is_none() {
                info!("[{}] {}", self.node_id, message.into());
            } else {
                info!(
                    "[{}][{}] {}",
                    self.node_id,
                    self.component_prefix(),
                    message.into()
                );
            }
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            if self.component == Component::Node && self.parent_component.is_none() {
                warn!("[{}] {}", self.node_id, message.into());
            } else {
                warn!(
                    "[{}][{}] {}",
                    self.node_id,
                    self.component_prefix(),
                    message.into()
                );
            }
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            if self.component == Component::Node && self.parent_component.is_none() {
                error!("[{}] {}", self.node_id, message.into());
            } else {
                error!(
                    "[{}][{}] {}",
                    self.node_id,
                    self.component_prefix(),
                    message.into()
                );
            }
        }
    }
}

/// Log level for logging configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Logging configuration applied once at node startup
///
/// Wraps env_logger so RUST_LOG still works; the configured default level
/// applies when no environment filter is present.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    default_level: LogLevel,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self {
            default_level: LogLevel::Info,
        }
    }

    /// Shorthand for the common default-info configuration
    pub fn default_info() -> Self {
        Self::new()
    }

    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Install the global logger. Safe to call more than once; later calls
    /// are no-ops because the global logger can only be set once.
    pub fn apply(&self) {
        let mut builder = env_logger::Builder::from_default_env();
        builder.filter_level(self.default_level.to_filter());
        let _ = builder.try_init();
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new()
    }
}
