//! In-memory vehicle
//!
//! Records every command it receives. Used by `--simulate` dry runs and by
//! the navigation tests.

use async_trait::async_trait;
use carnav_sdk::capability::{ActuatorOutcome, MotionActuator};
use carnav_sdk::errors::{EngineError, Result};
use carnav_sdk::movement::{Direction, MovementCommand};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Physical state of the simulated car
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleState {
    pub moving: bool,
    pub last_motion: Option<MovementCommand>,
    /// Accumulated motor-on time (seconds)
    pub motion_secs: f64,
}

#[derive(Debug, Default)]
struct Inner {
    state: VehicleState,
    commands: Vec<MovementCommand>,
    motions: usize,
    stops: usize,
}

/// Simulated actuator
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    inner: Mutex<Inner>,
    realtime: bool,
    fail_on_motion: Option<usize>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for each movement's duration, like real hardware
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Fail the `n`-th movement (1-based) with an actuator error
    pub fn failing_on_motion(mut self, n: usize) -> Self {
        self.fail_on_motion = Some(n);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> VehicleState {
        self.lock().state.clone()
    }

    /// Every command received, stops included, in order
    pub fn commands(&self) -> Vec<MovementCommand> {
        self.lock().commands.clone()
    }

    /// Number of movement calls (stops excluded)
    pub fn motion_count(&self) -> usize {
        self.lock().motions
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }
}

#[async_trait]
impl MotionActuator for SimulatedActuator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn execute(&self, command: &MovementCommand) -> Result<ActuatorOutcome> {
        if command.direction() == Direction::Stop {
            return self.stop().await;
        }

        {
            let mut inner = self.lock();
            inner.commands.push(*command);
            inner.motions += 1;
            if self.fail_on_motion == Some(inner.motions) {
                return Err(EngineError::Actuator(format!(
                    "simulated failure on {}",
                    command
                )));
            }
            inner.state.moving = true;
            inner.state.last_motion = Some(*command);
        }

        info!("Simulated car: {}", command);
        if self.realtime {
            tokio::time::sleep(command.duration()).await;
        }

        let mut inner = self.lock();
        inner.state.moving = false;
        inner.state.motion_secs += command.duration_secs();

        Ok(ActuatorOutcome::new(*command, format!("simulated {}", command)))
    }

    async fn stop(&self) -> Result<ActuatorOutcome> {
        let mut inner = self.lock();
        inner.commands.push(MovementCommand::stop());
        inner.stops += 1;
        inner.state.moving = false;

        Ok(ActuatorOutcome::new(MovementCommand::stop(), "simulated stop"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let once = SimulatedActuator::new();
        once.forward(0.3).await.unwrap();
        once.stop().await.unwrap();

        let twice = SimulatedActuator::new();
        twice.forward(0.3).await.unwrap();
        twice.stop().await.unwrap();
        twice.stop().await.unwrap();

        assert_eq!(once.state(), twice.state());
        assert!(!twice.state().moving);
    }

    #[tokio::test]
    async fn test_stop_without_motion_is_safe() {
        let car = SimulatedActuator::new();
        car.stop().await.unwrap();
        assert_eq!(car.state(), VehicleState::default());
        assert_eq!(car.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_records_motion() {
        let car = SimulatedActuator::new();
        car.turn_left(0.4).await.unwrap();
        car.backward(0.2).await.unwrap();

        let state = car.state();
        assert_eq!(car.motion_count(), 2);
        assert!((state.motion_secs - 0.6).abs() < 1e-9);
        assert_eq!(
            state.last_motion.map(|cmd| cmd.direction()),
            Some(Direction::Backward)
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let car = SimulatedActuator::new().failing_on_motion(2);
        car.forward(0.3).await.unwrap();
        assert!(matches!(
            car.forward(0.3).await,
            Err(EngineError::Actuator(_))
        ));
    }
}
