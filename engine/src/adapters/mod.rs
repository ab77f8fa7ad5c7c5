//! Capability adapters
//!
//! Concrete [`Camera`](carnav_sdk::Camera), [`SceneClassifier`](carnav_sdk::SceneClassifier)
//! and [`MotionActuator`](carnav_sdk::MotionActuator) backends. The navigation
//! loop never depends on these types directly.

pub mod camera;
pub mod car;
pub mod gemini;
pub mod simulated;

pub use camera::{camera_from_config, CommandCamera, FileCamera, HttpCamera};
pub use car::{CarStatus, HttpActuator};
pub use gemini::GeminiClassifier;
pub use simulated::{SimulatedActuator, VehicleState};
