//! Capability traits
//!
//! The navigation loop talks to the outside world only through these three
//! traits. How an image is captured, how a model is reached and how a motor
//! command travels to the car are adapter concerns.

use crate::errors::Result;
use crate::goal::Goal;
use crate::movement::{Direction, MovementCommand};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque image payload with its MIME tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
    mime_type: String,
}

impl Image {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of an actuator call that completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorOutcome {
    /// The command that was carried out
    pub command: MovementCommand,

    /// Free-form message from the actuator backend
    pub message: String,
}

impl ActuatorOutcome {
    pub fn new(command: MovementCommand, message: impl Into<String>) -> Self {
        Self {
            command,
            message: message.into(),
        }
    }
}

/// Camera capability
#[async_trait]
pub trait Camera: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Take one picture of the current scene
    async fn capture(&self) -> Result<Image>;
}

/// Scene classifier capability
#[async_trait]
pub trait SceneClassifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Ask the model what to do next given `image` and `goal`.
    ///
    /// Returns the raw model text. Decoding it is the caller's job.
    async fn classify(&self, image: &Image, goal: &Goal) -> Result<String>;
}

/// Motion actuator capability
///
/// Every motion call is bounded by the command duration and the backend
/// guarantees the motors stop when it elapses. `stop` must be idempotent and
/// safe to call at any time.
#[async_trait]
pub trait MotionActuator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run one movement and return once the motors have stopped
    async fn execute(&self, command: &MovementCommand) -> Result<ActuatorOutcome>;

    /// Stop all motors immediately
    async fn stop(&self) -> Result<ActuatorOutcome>;

    async fn forward(&self, duration_secs: f64) -> Result<ActuatorOutcome> {
        self.execute(&MovementCommand::new(Direction::Forward, duration_secs))
            .await
    }

    async fn backward(&self, duration_secs: f64) -> Result<ActuatorOutcome> {
        self.execute(&MovementCommand::new(Direction::Backward, duration_secs))
            .await
    }

    async fn turn_left(&self, duration_secs: f64) -> Result<ActuatorOutcome> {
        self.execute(&MovementCommand::new(Direction::Left, duration_secs))
            .await
    }

    async fn turn_right(&self, duration_secs: f64) -> Result<ActuatorOutcome> {
        self.execute(&MovementCommand::new(Direction::Right, duration_secs))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MovementCommand>>,
    }

    #[async_trait]
    impl MotionActuator for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn execute(&self, command: &MovementCommand) -> Result<ActuatorOutcome> {
            self.seen.lock().unwrap().push(*command);
            Ok(ActuatorOutcome::new(*command, "ok"))
        }

        async fn stop(&self) -> Result<ActuatorOutcome> {
            self.execute(&MovementCommand::stop()).await
        }
    }

    #[tokio::test]
    async fn test_convenience_methods_clamp() {
        let actuator = Recorder::default();
        actuator.forward(5.0).await.unwrap();
        actuator.turn_left(0.3).await.unwrap();
        actuator.stop().await.unwrap();

        let seen = actuator.seen.lock().unwrap();
        assert_eq!(seen[0].direction(), Direction::Forward);
        assert_eq!(seen[0].duration_secs(), crate::movement::MAX_DURATION_SECS);
        assert_eq!(seen[1].direction(), Direction::Left);
        assert!(seen[2].is_stop());
    }

    #[test]
    fn test_image_accessors() {
        let image = Image::new(vec![1u8, 2, 3], "image/bmp");
        assert_eq!(image.len(), 3);
        assert_eq!(image.mime_type(), "image/bmp");
        assert!(!image.is_empty());
    }
}
