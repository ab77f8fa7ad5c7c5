//! Navigation Controller
//!
//! Drives the sense-classify-act cycle:
//!
//! 1. Capture an image (bounded retries, no motion while the camera fails)
//! 2. Ask the classifier what to do (bounded retries)
//! 3. Decode the answer into an action code
//! 4. Resolve a bounded movement through the duration governor and execute it
//! 5. Settle, then go back to 1 until the goal, the cap or a failure
//!
//! Every capability call runs under its own timeout and races the session's
//! cancel signal. No actuator call is made after a session terminates.

use super::actuator::SerializedActuator;
use super::cancel::CancelSignal;
use super::handle::{SessionHandle, SessionRegistry};
use super::retry::RetryPolicy;
use super::session::{
    HistoryEntry, NavState, NavigationReport, NavigationSession, Pending, StateSnapshot,
    Termination,
};
use crate::config::NavigationConfig;
use crate::governor::DurationGovernor;
use carnav_sdk::action::{ActionCode, ClassificationResult, DecodedAction};
use carnav_sdk::capability::{Camera, MotionActuator, SceneClassifier};
use carnav_sdk::errors::{EngineError, NavErrorExt, Result};
use carnav_sdk::goal::Goal;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Loop limits and retry envelope
#[derive(Debug, Clone, PartialEq)]
pub struct NavigatorSettings {
    /// Safety cap on movements per session
    pub max_iterations: u32,
    pub capture_timeout: Duration,
    pub classify_timeout: Duration,
    pub actuator_timeout: Duration,
    pub capture_retry: RetryPolicy,
    pub classify_retry: RetryPolicy,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self::from_config(&NavigationConfig::default())
    }
}

impl NavigatorSettings {
    pub fn from_config(config: &NavigationConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            capture_timeout: config.capture_timeout(),
            classify_timeout: config.classify_timeout(),
            actuator_timeout: config.actuator_timeout(),
            capture_retry: config.capture_retry,
            classify_retry: config.classify_retry,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Closed-loop navigation controller
///
/// Cloning is cheap; clones share the capabilities, the actuator lock and
/// the session registry.
#[derive(Clone)]
pub struct Navigator {
    camera: Arc<dyn Camera>,
    classifier: Arc<dyn SceneClassifier>,
    actuator: Arc<SerializedActuator>,
    governor: DurationGovernor,
    settings: NavigatorSettings,
    registry: SessionRegistry,
}

impl Navigator {
    /// Create a navigator
    ///
    /// The actuator is wrapped so that sessions started from this navigator
    /// (and its clones) never overlap movements.
    pub fn new(
        camera: Arc<dyn Camera>,
        classifier: Arc<dyn SceneClassifier>,
        actuator: Arc<dyn MotionActuator>,
        governor: DurationGovernor,
        settings: NavigatorSettings,
    ) -> Self {
        Self {
            camera,
            classifier,
            actuator: Arc::new(SerializedActuator::new(actuator)),
            governor,
            settings,
            registry: SessionRegistry::default(),
        }
    }

    pub fn governor(&self) -> &DurationGovernor {
        &self.governor
    }

    pub fn settings(&self) -> &NavigatorSettings {
        &self.settings
    }

    /// Sessions started through [`Navigator::start`]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create an idle session for single-step mode
    pub fn begin(&self, goal: Goal) -> NavigationSession {
        NavigationSession::new(
            goal,
            self.governor.profile_name(),
            self.settings.max_iterations,
        )
    }

    /// Spawn a session and return a handle to it
    pub fn start(&self, goal: Goal) -> SessionHandle {
        let session = self.begin(goal);
        let id = session.id();
        let cancel = session.cancel_signal();
        let (status_tx, status_rx) = watch::channel(session.snapshot());

        self.registry.prune_terminated();
        self.registry.register(id, cancel.clone(), status_rx.clone());

        let navigator = self.clone();
        let join = tokio::spawn(async move {
            let mut session = session;
            while !session.is_terminated() {
                let snapshot = navigator.step(&mut session).await;
                status_tx.send_replace(snapshot);
            }
            session.into_report()
        });

        SessionHandle::new(id, cancel, status_rx, join)
    }

    /// Run a session to termination on the current task
    pub async fn run(&self, mut session: NavigationSession) -> NavigationReport {
        while !session.is_terminated() {
            self.step(&mut session).await;
        }
        session.into_report()
    }

    /// Advance `session` by one state transition
    ///
    /// Calling `step` on a terminated session does nothing.
    pub async fn step(&self, session: &mut NavigationSession) -> StateSnapshot {
        if session.is_terminated() {
            return session.snapshot();
        }

        let cancel = session.cancel_signal();
        if cancel.is_cancelled() {
            self.finish_cancelled(session).await;
            return session.snapshot();
        }

        debug!("Session {} step: {}", session.id(), session.state());

        match session.state() {
            NavState::Idle => {
                info!(
                    "Session {} started: goal '{}', profile {}, cap {}",
                    session.id(),
                    session.goal(),
                    self.governor.profile_name(),
                    session.max_iterations()
                );
                session.state = NavState::Sensing;
            }
            NavState::Sensing => self.sense(session, &cancel).await,
            NavState::Classifying => self.classify(session, &cancel).await,
            NavState::Deciding => self.decide(session).await,
            NavState::Acting => self.act(session, &cancel).await,
            NavState::Terminated => {}
        }

        session.snapshot()
    }

    async fn sense(&self, session: &mut NavigationSession, cancel: &CancelSignal) {
        let camera = &self.camera;
        let result = with_retry(
            "capture",
            self.settings.capture_retry,
            self.settings.capture_timeout,
            cancel,
            || camera.capture(),
        )
        .await;

        match result {
            Ok(image) => {
                debug!(
                    "Session {}: captured {} bytes ({})",
                    session.id(),
                    image.len(),
                    image.mime_type()
                );
                session.pending = Pending::Image(image);
                session.state = NavState::Classifying;
            }
            Err(EngineError::Cancelled) => self.finish_cancelled(session).await,
            Err(e) => self.fail(session, format!("capture failed: {}", e)),
        }
    }

    async fn classify(&self, session: &mut NavigationSession, cancel: &CancelSignal) {
        let image = match std::mem::take(&mut session.pending) {
            Pending::Image(image) => image,
            _ => {
                // Nothing to classify; take a fresh picture
                session.state = NavState::Sensing;
                return;
            }
        };

        let classifier = &self.classifier;
        let goal = session.goal().clone();
        let result = with_retry(
            "classify",
            self.settings.classify_retry,
            self.settings.classify_timeout,
            cancel,
            || classifier.classify(&image, &goal),
        )
        .await;

        match result {
            Ok(raw) => {
                let classification = ClassificationResult::from_raw(raw);
                debug!(
                    "Session {}: classifier answered {:?}",
                    session.id(),
                    classification.raw
                );
                session.last_explanation = Some(classification.explanation.clone());
                session.pending = Pending::Classification(classification);
                session.state = NavState::Deciding;
            }
            Err(EngineError::Cancelled) => self.finish_cancelled(session).await,
            Err(e) => self.fail(session, format!("classification failed: {}", e)),
        }
    }

    async fn decide(&self, session: &mut NavigationSession) {
        let classification = match std::mem::take(&mut session.pending) {
            Pending::Classification(classification) => classification,
            _ => {
                session.state = NavState::Sensing;
                return;
            }
        };

        match classification.action {
            DecodedAction::Known(ActionCode::GoalAchieved) => {
                session.last_action = Some(ActionCode::GoalAchieved);
                info!(
                    "Session {}: goal achieved after {} movements",
                    session.id(),
                    session.iteration()
                );
                session.terminate(Termination::Success);
            }
            DecodedAction::Known(action) => {
                session.last_action = Some(action);
                match self.governor.command(action, None) {
                    Some(command) => {
                        session.pending = Pending::Command {
                            action,
                            command,
                            explanation: classification.explanation,
                        };
                        session.state = NavState::Acting;
                    }
                    None => self.fail(session, format!("{} has no movement", action)),
                }
            }
            DecodedAction::Unknown(raw) => {
                self.safety_stop(session).await;
                self.fail(session, EngineError::Decode { raw }.to_string());
            }
        }
    }

    async fn act(&self, session: &mut NavigationSession, cancel: &CancelSignal) {
        let (action, command, explanation) = match std::mem::take(&mut session.pending) {
            Pending::Command {
                action,
                command,
                explanation,
            } => (action, command, explanation),
            _ => {
                session.state = NavState::Sensing;
                return;
            }
        };

        let actuator = &self.actuator;
        let result = guarded(
            "actuate",
            self.settings.actuator_timeout,
            cancel,
            actuator.execute(&command),
        )
        .await;

        match result {
            Ok(outcome) => {
                session.iteration += 1;
                info!(
                    "Session {} iteration {}/{}: {} -> {}",
                    session.id(),
                    session.iteration(),
                    session.max_iterations(),
                    action,
                    command
                );
                session.history.push(HistoryEntry {
                    iteration: session.iteration,
                    action,
                    duration_secs: command.duration_secs(),
                    outcome,
                    explanation,
                    at: Utc::now(),
                });

                if session.iteration >= session.max_iterations() {
                    warn!(
                        "Session {} reached the iteration cap ({})",
                        session.id(),
                        session.max_iterations()
                    );
                    session.terminate(Termination::Exhausted {
                        iterations: session.iteration,
                    });
                    return;
                }

                session.state = NavState::Sensing;
                if pause(self.governor.settle(), cancel).await.is_err() {
                    self.finish_cancelled(session).await;
                }
            }
            Err(EngineError::Cancelled) => self.finish_cancelled(session).await,
            Err(e) => {
                error!(
                    "Session {}: {} failed: {}. Issuing fallback stop",
                    session.id(),
                    command,
                    e
                );
                self.safety_stop(session).await;
                session.terminate(Termination::Failed {
                    reason: format!("actuator failed: {}", e),
                });
            }
        }
    }

    async fn finish_cancelled(&self, session: &mut NavigationSession) {
        info!("Session {} cancelled in state {}", session.id(), session.state());
        if session.has_moved() {
            self.safety_stop(session).await;
        }
        session.terminate(Termination::Cancelled);
    }

    fn fail(&self, session: &mut NavigationSession, reason: String) {
        error!("Session {} failed: {}", session.id(), reason);
        session.terminate(Termination::Failed { reason });
    }

    /// Best-effort stop; failures are logged, never propagated
    async fn safety_stop(&self, session: &NavigationSession) {
        match timeout(self.settings.actuator_timeout, self.actuator.stop()).await {
            Ok(Ok(_)) => info!("Session {}: motors stopped", session.id()),
            Ok(Err(e)) => error!("Session {}: fallback stop failed: {}", session.id(), e),
            Err(_) => error!(
                "Session {}: fallback stop timed out after {:?}",
                session.id(),
                self.settings.actuator_timeout
            ),
        }
    }
}

/// Await `call` under `limit`, giving up early if `cancel` fires
async fn guarded<T, F>(operation: &str, limit: Duration, cancel: &CancelSignal, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        outcome = timeout(limit, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                operation: operation.to_string(),
                timeout_ms: limit.as_millis() as u64,
            }),
        },
    }
}

/// Sleep unless cancelled first
async fn pause(delay: Duration, cancel: &CancelSignal) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Run `call` under `policy`, retrying recoverable errors only
async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    limit: Duration,
    cancel: &CancelSignal,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match guarded(operation, limit, cancel, call()).await {
            Ok(value) => return Ok(value),
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) if e.is_recoverable() && policy.allows_retry(attempt) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} attempt {}/{} failed: {}. Retrying in {}ms",
                    operation,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                pause(delay, cancel).await?;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    "{} gave up after {} attempt(s): {}",
                    operation, attempt, e
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancelSignal::new();

        let value = with_retry(
            "capture",
            RetryPolicy::new(3, 100, 1000),
            Duration::from_secs(1),
            &cancel,
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EngineError::Capture("busy".into()))
                } else {
                    Ok(7)
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_at_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancelSignal::new();

        let result: Result<()> = with_retry(
            "capture",
            RetryPolicy::new(4, 100, 1000),
            Duration::from_secs(1),
            &cancel,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Capture("no device".into()))
            },
        )
        .await;

        assert!(matches!(result, Err(EngineError::Capture(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_recoverable_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancelSignal::new();

        let result: Result<()> = with_retry(
            "classify",
            RetryPolicy::new(5, 100, 1000),
            Duration::from_secs(1),
            &cancel,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Config("bad key".into()))
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cancel = CancelSignal::new();
        let result: Result<()> = guarded(
            "capture",
            Duration::from_millis(50),
            &cancel,
            std::future::pending(),
        )
        .await;

        match result {
            Err(EngineError::Timeout {
                operation,
                timeout_ms,
            }) => {
                assert_eq!(operation, "capture");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let result: Result<()> = with_retry(
            "capture",
            RetryPolicy::new(10, 1000, 1000),
            Duration::from_secs(1),
            &cancel,
            || async { Err(EngineError::Capture("busy".into())) },
        )
        .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
