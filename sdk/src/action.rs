//! Action codes and the classifier output decoder
//!
//! The vision model answers in free text. The decoder treats that text as
//! untrusted input and maps every string to exactly one outcome: a known
//! [`ActionCode`] or [`DecodedAction::Unknown`]. It never guesses a movement.
//!
//! Literals are tested in [`ActionCode::PRIORITY`] order with a case-sensitive
//! substring match, and the first literal present wins. `GOAL_ACHIEVED` comes
//! first so that it is never shadowed by a directional code mentioned in the
//! same answer.

use crate::movement::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic recommendation produced by the scene classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCode {
    /// Target is centered and close; navigation is done
    GoalAchieved,
    /// Target visible in the left quarter of the frame
    MoveLeft,
    /// Target visible in the right quarter of the frame
    MoveRight,
    /// Target visible but far away
    MoveForward,
    /// Target visible but too close
    MoveBackward,
    /// Target not visible; rotate left to search
    TurnLeft,
    /// Target not visible; rotate right to search
    TurnRight,
    /// Target absent from the view
    NotFound,
}

impl ActionCode {
    /// Decoder priority order
    pub const PRIORITY: [ActionCode; 8] = [
        ActionCode::GoalAchieved,
        ActionCode::MoveLeft,
        ActionCode::MoveRight,
        ActionCode::MoveForward,
        ActionCode::MoveBackward,
        ActionCode::TurnLeft,
        ActionCode::TurnRight,
        ActionCode::NotFound,
    ];

    /// The literal the classifier is asked to emit
    pub fn literal(self) -> &'static str {
        match self {
            ActionCode::GoalAchieved => "GOAL_ACHIEVED",
            ActionCode::MoveLeft => "MOVE_LEFT",
            ActionCode::MoveRight => "MOVE_RIGHT",
            ActionCode::MoveForward => "MOVE_FORWARD",
            ActionCode::MoveBackward => "MOVE_BACKWARD",
            ActionCode::TurnLeft => "TURN_LEFT",
            ActionCode::TurnRight => "TURN_RIGHT",
            ActionCode::NotFound => "NOT_FOUND",
        }
    }

    /// Exact literal lookup (no substring search)
    pub fn from_literal(literal: &str) -> Option<Self> {
        Self::PRIORITY
            .iter()
            .copied()
            .find(|code| code.literal() == literal)
    }

    /// Motor direction that carries out this action.
    ///
    /// `NOT_FOUND` is a systematic search turn to the left. `GOAL_ACHIEVED`
    /// moves nothing.
    pub fn direction(self) -> Option<Direction> {
        match self {
            ActionCode::GoalAchieved => None,
            ActionCode::MoveLeft | ActionCode::TurnLeft | ActionCode::NotFound => {
                Some(Direction::Left)
            }
            ActionCode::MoveRight | ActionCode::TurnRight => Some(Direction::Right),
            ActionCode::MoveForward => Some(Direction::Forward),
            ActionCode::MoveBackward => Some(Direction::Backward),
        }
    }

    /// Whether the target is out of view and the car is searching
    pub fn is_search(self) -> bool {
        matches!(
            self,
            ActionCode::TurnLeft | ActionCode::TurnRight | ActionCode::NotFound
        )
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// Outcome of decoding one classifier answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DecodedAction {
    /// A known action code was found
    Known(ActionCode),
    /// No action code was found; carries the raw text for diagnosis
    Unknown(String),
}

impl DecodedAction {
    pub fn code(&self) -> Option<ActionCode> {
        match self {
            DecodedAction::Known(code) => Some(*code),
            DecodedAction::Unknown(_) => None,
        }
    }
}

/// Decode raw classifier text into an action.
///
/// # Examples
///
/// ```
/// use carnav_sdk::action::{decode, ActionCode, DecodedAction};
///
/// assert_eq!(decode("MOVE_LEFT\nMug is on the left."), DecodedAction::Known(ActionCode::MoveLeft));
/// assert!(matches!(decode("reorient slightly"), DecodedAction::Unknown(_)));
/// ```
pub fn decode(raw: &str) -> DecodedAction {
    match find_code(raw) {
        Some((code, _)) => DecodedAction::Known(code),
        None => DecodedAction::Unknown(raw.to_string()),
    }
}

/// First code in priority order present in `raw`, with the byte offset of
/// its first occurrence.
fn find_code(raw: &str) -> Option<(ActionCode, usize)> {
    ActionCode::PRIORITY
        .iter()
        .find_map(|code| raw.find(code.literal()).map(|pos| (*code, pos)))
}

/// A decoded classifier answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub action: DecodedAction,
    pub explanation: String,
    pub raw: String,
}

impl ClassificationResult {
    /// Decode raw model text.
    ///
    /// The classifier is prompted to put the code on the first line and a
    /// short explanation on the next. The explanation is the text after the
    /// line holding the code, falling back to the rest of that line.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (action, explanation) = match find_code(&raw) {
            Some((code, pos)) => {
                let explanation = explanation_after(&raw, pos + code.literal().len());
                (DecodedAction::Known(code), explanation)
            }
            None => (DecodedAction::Unknown(raw.clone()), raw.trim().to_string()),
        };

        Self {
            action,
            explanation,
            raw,
        }
    }

    pub fn code(&self) -> Option<ActionCode> {
        self.action.code()
    }
}

fn explanation_after(raw: &str, end_of_code: usize) -> String {
    let after = &raw[end_of_code..];
    let (same_line, following) = match after.find('\n') {
        Some(newline) => (&after[..newline], &after[newline + 1..]),
        None => (after, ""),
    };

    let following = following.trim();
    if !following.is_empty() {
        return following.to_string();
    }

    same_line
        .trim_start_matches(|c: char| matches!(c, ':' | '-' | '*' | '"' | '`') || c.is_whitespace())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_literal_decodes() {
        for code in ActionCode::PRIORITY {
            let raw = format!("{}\nbecause reasons", code.literal());
            assert_eq!(decode(&raw), DecodedAction::Known(code));
        }
    }

    #[test]
    fn test_goal_wins_over_directional() {
        let raw = "MOVE_FORWARD would overshoot, so GOAL_ACHIEVED";
        assert_eq!(decode(raw), DecodedAction::Known(ActionCode::GoalAchieved));
    }

    #[test]
    fn test_priority_not_position() {
        // NOT_FOUND appears first in the text but MOVE_RIGHT ranks higher.
        let raw = "NOT_FOUND earlier, now MOVE_RIGHT";
        assert_eq!(decode(raw), DecodedAction::Known(ActionCode::MoveRight));
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(
            decode("move_left please"),
            DecodedAction::Unknown("move_left please".to_string())
        );
    }

    #[test]
    fn test_unknown_keeps_raw() {
        let result = ClassificationResult::from_raw("  ERROR: quota exceeded ");
        assert_eq!(
            result.action,
            DecodedAction::Unknown("  ERROR: quota exceeded ".to_string())
        );
        assert_eq!(result.explanation, "ERROR: quota exceeded");
        assert!(result.code().is_none());
    }

    #[test]
    fn test_explanation_on_next_line() {
        let result =
            ClassificationResult::from_raw("MOVE_LEFT\nThe keychain is in the left quarter.\n");
        assert_eq!(result.code(), Some(ActionCode::MoveLeft));
        assert_eq!(result.explanation, "The keychain is in the left quarter.");
    }

    #[test]
    fn test_explanation_on_same_line() {
        let result = ClassificationResult::from_raw("**TURN_RIGHT**: nothing visible ahead");
        assert_eq!(result.code(), Some(ActionCode::TurnRight));
        assert_eq!(result.explanation, "nothing visible ahead");

        let bare = ClassificationResult::from_raw("GOAL_ACHIEVED");
        assert_eq!(bare.explanation, "");
    }

    #[test]
    fn test_direction_mapping() {
        assert_eq!(ActionCode::GoalAchieved.direction(), None);
        assert_eq!(ActionCode::NotFound.direction(), Some(Direction::Left));
        assert_eq!(ActionCode::TurnRight.direction(), Some(Direction::Right));
        assert_eq!(ActionCode::MoveBackward.direction(), Some(Direction::Backward));
        assert!(ActionCode::NotFound.is_search());
        assert!(!ActionCode::MoveForward.is_search());
    }

    #[test]
    fn test_literal_round_trip() {
        for code in ActionCode::PRIORITY {
            assert_eq!(ActionCode::from_literal(code.literal()), Some(code));
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.literal()));
        }
        assert_eq!(ActionCode::from_literal("REORIENT"), None);
    }
}
