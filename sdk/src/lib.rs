//! Carnav SDK
//!
//! Shared library providing the navigation vocabulary and capability traits.
//! This crate is used by both the engine and the motor server.

/// Classifier action codes and the decoder for free-text model output
pub mod action;

/// Camera, classifier and actuator capability traits
pub mod capability;

/// Error types and handling
pub mod errors;

/// Navigation goal type
pub mod goal;

/// Movement commands and the hardware duration envelope
pub mod movement;

// Re-export commonly used types
pub use action::{decode, ActionCode, ClassificationResult, DecodedAction};
pub use capability::{ActuatorOutcome, Camera, Image, MotionActuator, SceneClassifier};
pub use errors::{EngineError, NavErrorExt, Result};
pub use goal::Goal;
pub use movement::{Direction, MovementCommand, MAX_DURATION_SECS, MIN_DURATION_SECS};
