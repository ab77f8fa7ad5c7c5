//! Error types and handling
//!
//! This module provides the error types used throughout the carnav engine and
//! the motor server. All errors implement the `NavErrorExt` trait which provides
//! operator-facing hints and indicates whether errors are recoverable.
//!
//! Recoverability is a hint only. The navigation loop owns the decision to
//! retry or terminate; components never retry on their own.

use thiserror::Error;

/// Result type for carnav operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Trait for carnav error extensions
///
/// Provides additional context for errors, including operator-facing hints
/// and recoverability information.
pub trait NavErrorExt {
    /// Returns a short hint for the operator
    ///
    /// The hint never contains API keys or raw model output.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors may be retried by the navigation loop under its
    /// retry policy. Non-recoverable errors end the session.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Capture**: camera unavailable or produced no usable image
/// - **Classify**: vision model unreachable, timed out or returned garbage
/// - **Decode**: model text contained no known action code
/// - **Actuator**: motor command could not be confirmed
/// - **Configuration**: invalid or missing configuration
///
/// # Examples
///
/// ```
/// use carnav_sdk::errors::{EngineError, NavErrorExt};
///
/// let error = EngineError::Capture("camera busy".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Actuator("no response".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    // Capability errors
    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Classification failed: {0}")]
    Classify(String),

    #[error("No action code found in classifier output: {raw:?}")]
    Decode { raw: String },

    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session cancelled")]
    Cancelled,

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NavErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::InvalidGoal(_) => "Describe the target in a few words",

            Self::Capture(_) => "Camera unavailable. Check the capture command and device",
            Self::Classify(_) => "Vision model unavailable. Check your API key and network",
            Self::Decode { .. } => "The vision model answered without an action code",
            Self::Actuator(_) => "Motor command failed. Stop the car manually and check power",
            Self::Timeout { .. } => "A component took too long to respond. Try again",

            Self::Network(_) => "Network operation failed. Check your connection",

            Self::SessionNotFound(_) => "No such navigation session",
            Self::Cancelled => "Navigation was cancelled",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::InvalidGoal(_)
            | Self::Decode { .. }
            | Self::Actuator(_)
            | Self::SessionNotFound(_)
            | Self::Cancelled => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
