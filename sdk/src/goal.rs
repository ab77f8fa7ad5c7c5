//! Navigation goal

use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Natural-language description of the target state the car seeks.
///
/// A goal is fixed for the lifetime of a navigation session. Clones share the
/// same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Goal(Arc<str>);

impl Goal {
    /// Create a goal, rejecting empty or whitespace-only descriptions
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidGoal(
                "goal description is empty".to_string(),
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// The goal text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Goal {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        Goal::new(value)
    }
}

impl From<Goal> for String {
    fn from(goal: Goal) -> Self {
        goal.0.to_string()
    }
}
