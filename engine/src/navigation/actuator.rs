//! System-wide actuator serialization
//!
//! Concurrent motor commands compose unpredictably in hardware, so every
//! session in a process drives the car through one [`SerializedActuator`].

use async_trait::async_trait;
use carnav_sdk::capability::{ActuatorOutcome, MotionActuator};
use carnav_sdk::errors::Result;
use carnav_sdk::movement::MovementCommand;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Wraps an actuator so that at most one movement is in flight
///
/// `execute` holds an async lock for the whole movement. `stop` skips the
/// lock and always reaches the backend immediately.
pub struct SerializedActuator {
    inner: Arc<dyn MotionActuator>,
    gate: Mutex<()>,
    name: String,
}

impl SerializedActuator {
    pub fn new(inner: Arc<dyn MotionActuator>) -> Self {
        let name = format!("serialized({})", inner.name());
        Self {
            inner,
            gate: Mutex::new(()),
            name,
        }
    }

    /// The wrapped actuator
    pub fn inner(&self) -> &Arc<dyn MotionActuator> {
        &self.inner
    }
}

#[async_trait]
impl MotionActuator for SerializedActuator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &MovementCommand) -> Result<ActuatorOutcome> {
        if command.is_stop() {
            return self.stop().await;
        }

        let _guard = self.gate.lock().await;
        debug!("Actuator lock acquired for {}", command);
        self.inner.execute(command).await
    }

    async fn stop(&self) -> Result<ActuatorOutcome> {
        self.inner.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnav_sdk::movement::Direction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the peak number of overlapping movements
    #[derive(Default)]
    struct OverlapTracker {
        active: AtomicUsize,
        peak: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl MotionActuator for OverlapTracker {
        fn name(&self) -> &str {
            "tracker"
        }

        async fn execute(&self, command: &MovementCommand) -> Result<ActuatorOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(command.duration()).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ActuatorOutcome::new(*command, "done"))
        }

        async fn stop(&self) -> Result<ActuatorOutcome> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(ActuatorOutcome::new(MovementCommand::stop(), "stopped"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_movements_never_overlap() {
        let tracker = Arc::new(OverlapTracker::default());
        let actuator = Arc::new(SerializedActuator::new(tracker.clone()));

        let mut tasks = Vec::new();
        for direction in Direction::MOTION {
            let actuator = actuator.clone();
            tasks.push(tokio::spawn(async move {
                actuator
                    .execute(&MovementCommand::new(direction, 0.5))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_bypasses_lock() {
        let tracker = Arc::new(OverlapTracker::default());
        let actuator = Arc::new(SerializedActuator::new(tracker.clone()));

        let mover = actuator.clone();
        let movement = tokio::spawn(async move {
            mover
                .execute(&MovementCommand::new(Direction::Forward, 1.5))
                .await
        });
        tokio::task::yield_now().await;

        // The movement still holds the lock; stop must not wait for it
        tokio::time::timeout(Duration::from_millis(10), actuator.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.stops.load(Ordering::SeqCst), 1);

        movement.await.unwrap().unwrap();
    }
}
