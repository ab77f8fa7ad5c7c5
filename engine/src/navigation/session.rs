//! Navigation session state
//!
//! A [`NavigationSession`] is owned and mutated by exactly one loop. Callers
//! observe it through [`StateSnapshot`]s and receive a [`NavigationReport`]
//! once it terminates.

use super::cancel::CancelSignal;
use carnav_sdk::action::{ActionCode, ClassificationResult};
use carnav_sdk::capability::{ActuatorOutcome, Image};
use carnav_sdk::goal::Goal;
use carnav_sdk::movement::MovementCommand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    Idle,
    Sensing,
    Classifying,
    Deciding,
    Acting,
    Terminated,
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sensing => "sensing",
            Self::Classifying => "classifying",
            Self::Deciding => "deciding",
            Self::Acting => "acting",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Termination {
    /// The classifier reported GOAL_ACHIEVED
    Success,

    /// The iteration cap was reached; not an error
    Exhausted { iterations: u32 },

    /// A component failed or the classifier output could not be decoded
    Failed { reason: String },

    /// Cancelled from outside
    Cancelled,
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Exhausted { iterations } => {
                write!(f, "exhausted after {} iterations", iterations)
            }
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One executed movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Iteration number (1-based)
    pub iteration: u32,

    pub action: ActionCode,

    /// Duration chosen by the governor
    pub duration_secs: f64,

    pub outcome: ActuatorOutcome,

    pub explanation: String,

    pub at: DateTime<Utc>,
}

/// Externally visible session status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub session_id: Uuid,
    pub state: NavState,
    pub iteration: u32,
    pub max_iterations: u32,
    pub last_action: Option<ActionCode>,
    pub last_explanation: Option<String>,
    pub termination: Option<Termination>,
}

impl StateSnapshot {
    pub fn is_terminated(&self) -> bool {
        self.state == NavState::Terminated
    }
}

/// Final record of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationReport {
    pub session_id: Uuid,
    pub goal: String,
    pub profile: String,
    pub termination: Termination,
    pub iterations: u32,
    pub max_iterations: u32,
    pub last_explanation: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Work carried between single steps
#[derive(Debug, Default)]
pub(crate) enum Pending {
    #[default]
    Nothing,
    Image(Image),
    Classification(ClassificationResult),
    Command {
        action: ActionCode,
        command: MovementCommand,
        explanation: String,
    },
}

/// One run of the navigation loop
#[derive(Debug)]
pub struct NavigationSession {
    id: Uuid,
    goal: Goal,
    profile: String,
    pub(crate) state: NavState,
    pub(crate) iteration: u32,
    max_iterations: u32,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) last_action: Option<ActionCode>,
    pub(crate) last_explanation: Option<String>,
    pub(crate) termination: Option<Termination>,
    pub(crate) pending: Pending,
    cancel: CancelSignal,
    started_at: DateTime<Utc>,
}

impl NavigationSession {
    pub fn new(goal: Goal, profile: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal,
            profile: profile.into(),
            state: NavState::Idle,
            iteration: 0,
            max_iterations,
            history: Vec::new(),
            last_action: None,
            last_explanation: None,
            termination: None,
            pending: Pending::Nothing,
            cancel: CancelSignal::new(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.state == NavState::Terminated
    }

    /// Handle for cancelling this session from another task
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Whether this session may have set the car in motion
    pub(crate) fn has_moved(&self) -> bool {
        self.iteration > 0 || self.state == NavState::Acting
    }

    pub(crate) fn terminate(&mut self, termination: Termination) {
        self.pending = Pending::Nothing;
        self.state = NavState::Terminated;
        self.termination = Some(termination);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            session_id: self.id,
            state: self.state,
            iteration: self.iteration,
            max_iterations: self.max_iterations,
            last_action: self.last_action,
            last_explanation: self.last_explanation.clone(),
            termination: self.termination.clone(),
        }
    }

    /// Consume the session into its report
    ///
    /// A session that never terminated is reported as failed.
    pub fn into_report(self) -> NavigationReport {
        let termination = self.termination.unwrap_or_else(|| Termination::Failed {
            reason: format!("session abandoned in state {}", self.state),
        });

        NavigationReport {
            session_id: self.id,
            goal: self.goal.to_string(),
            profile: self.profile,
            termination,
            iterations: self.iteration,
            max_iterations: self.max_iterations,
            last_explanation: self.last_explanation,
            history: self.history,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = NavigationSession::new(Goal::new("red ball").unwrap(), "default-approach", 5);
        let snapshot = session.snapshot();

        assert_eq!(snapshot.state, NavState::Idle);
        assert_eq!(snapshot.iteration, 0);
        assert_eq!(snapshot.max_iterations, 5);
        assert!(snapshot.termination.is_none());
        assert!(!session.has_moved());
    }

    #[test]
    fn test_terminate_clears_pending() {
        let mut session = NavigationSession::new(Goal::new("door").unwrap(), "p", 5);
        session.pending = Pending::Image(Image::new(vec![1u8], "image/png"));
        session.terminate(Termination::Cancelled);

        assert!(session.is_terminated());
        assert!(matches!(session.pending, Pending::Nothing));

        let report = session.into_report();
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.goal, "door");
    }

    #[test]
    fn test_termination_serialization() {
        let json = serde_json::to_string(&Termination::Exhausted { iterations: 20 }).unwrap();
        assert_eq!(json, r#"{"outcome":"exhausted","iterations":20}"#);

        let back: Termination = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Termination::Exhausted { iterations: 20 });
    }

    #[test]
    fn test_unterminated_report_is_failure() {
        let session = NavigationSession::new(Goal::new("chair").unwrap(), "p", 5);
        let report = session.into_report();
        assert!(matches!(report.termination, Termination::Failed { .. }));
    }
}
