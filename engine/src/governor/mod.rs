//! Duration Governor
//!
//! Turns an [`ActionCode`] into a bounded [`MovementCommand`]. This is the
//! single gate between a (possibly malformed) duration request and the
//! motors: whatever comes in, the selected duration lies within the active
//! profile's `[min_secs, max_secs]`.
//!
//! Profiles are chosen per deployment, never per call:
//!
//! - **fine-adjustment**: short pulses for final centering
//! - **default-approach**: the general-purpose profile
//! - **bold-search**: longer pulses that cover ground while searching

use carnav_sdk::action::ActionCode;
use carnav_sdk::errors::EngineError;
use carnav_sdk::movement::{Direction, MovementCommand, MAX_DURATION_SECS, MIN_DURATION_SECS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Name of the profile used when configuration does not pick one
pub const DEFAULT_PROFILE: &str = "default-approach";

/// Duration policy for one deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationProfile {
    /// Duration used when neither the request nor an override gives one
    pub default_secs: f64,

    /// Lower bound for every movement
    pub min_secs: f64,

    /// Upper bound for every movement
    pub max_secs: f64,

    /// Pause after each movement before the next photo (milliseconds)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Per-action defaults, keyed by action literal (e.g. "MOVE_LEFT")
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

fn default_settle_ms() -> u64 {
    500
}

impl DurationProfile {
    /// Create a profile without per-action overrides
    pub fn new(default_secs: f64, min_secs: f64, max_secs: f64) -> Self {
        Self {
            default_secs,
            min_secs,
            max_secs,
            settle_ms: default_settle_ms(),
            overrides: BTreeMap::new(),
        }
    }

    /// Add a per-action default
    pub fn with_override(mut self, action: ActionCode, secs: f64) -> Self {
        self.overrides.insert(action.literal().to_string(), secs);
        self
    }

    /// Set the settle pause
    pub fn with_settle_ms(mut self, settle_ms: u64) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    /// Per-action default for `action`, if configured
    pub fn override_for(&self, action: ActionCode) -> Option<f64> {
        self.overrides.get(action.literal()).copied()
    }

    /// Check bounds against the hardware envelope
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if:
    /// - Any bound is not finite
    /// - `min_secs > max_secs`
    /// - Bounds fall outside the hardware envelope
    /// - `default_secs` lies outside `[min_secs, max_secs]`
    /// - An override names an unknown action or is not finite
    pub fn validate(&self, name: &str) -> Result<(), EngineError> {
        let bounds = [self.default_secs, self.min_secs, self.max_secs];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::Config(format!(
                "profile '{}': durations must be finite numbers",
                name
            )));
        }

        if self.min_secs > self.max_secs {
            return Err(EngineError::Config(format!(
                "profile '{}': min_secs ({}) is greater than max_secs ({})",
                name, self.min_secs, self.max_secs
            )));
        }

        if self.min_secs < MIN_DURATION_SECS || self.max_secs > MAX_DURATION_SECS {
            return Err(EngineError::Config(format!(
                "profile '{}': bounds must lie within {}s..{}s",
                name, MIN_DURATION_SECS, MAX_DURATION_SECS
            )));
        }

        if self.default_secs < self.min_secs || self.default_secs > self.max_secs {
            return Err(EngineError::Config(format!(
                "profile '{}': default_secs ({}) is outside {}s..{}s",
                name, self.default_secs, self.min_secs, self.max_secs
            )));
        }

        for (literal, secs) in &self.overrides {
            if ActionCode::from_literal(literal).is_none() {
                return Err(EngineError::Config(format!(
                    "profile '{}': unknown action '{}' in overrides",
                    name, literal
                )));
            }
            if !secs.is_finite() {
                return Err(EngineError::Config(format!(
                    "profile '{}': override for {} must be a finite number",
                    name, literal
                )));
            }
        }

        Ok(())
    }
}

/// Built-in profiles
///
/// Values come from field tuning of the car: 0.2s nudges to center the
/// target, 0.3s approach steps and longer search turns.
pub fn builtin_profiles() -> BTreeMap<String, DurationProfile> {
    let mut profiles = BTreeMap::new();

    profiles.insert(
        "fine-adjustment".to_string(),
        DurationProfile::new(0.3, 0.1, 0.5)
            .with_override(ActionCode::MoveLeft, 0.2)
            .with_override(ActionCode::MoveRight, 0.2),
    );

    profiles.insert(
        DEFAULT_PROFILE.to_string(),
        DurationProfile::new(0.45, 0.2, 0.85)
            .with_override(ActionCode::MoveLeft, 0.2)
            .with_override(ActionCode::MoveRight, 0.2)
            .with_override(ActionCode::MoveForward, 0.3)
            .with_override(ActionCode::MoveBackward, 0.3)
            .with_override(ActionCode::TurnLeft, 0.4)
            .with_override(ActionCode::TurnRight, 0.4)
            .with_override(ActionCode::NotFound, 0.5),
    );

    profiles.insert(
        "bold-search".to_string(),
        DurationProfile::new(0.6, 0.3, 1.0)
            .with_settle_ms(300)
            .with_override(ActionCode::TurnLeft, 0.8)
            .with_override(ActionCode::TurnRight, 0.8)
            .with_override(ActionCode::NotFound, 0.8),
    );

    profiles
}

/// Selects bounded movement durations under one profile
#[derive(Debug, Clone)]
pub struct DurationGovernor {
    name: String,
    profile: DurationProfile,
}

impl DurationGovernor {
    /// Create a governor; the profile is validated first
    pub fn new(name: impl Into<String>, profile: DurationProfile) -> Result<Self, EngineError> {
        let name = name.into();
        profile.validate(&name)?;
        Ok(Self { name, profile })
    }

    /// Look up `name` in `profiles`
    pub fn from_profiles(
        name: &str,
        profiles: &BTreeMap<String, DurationProfile>,
    ) -> Result<Self, EngineError> {
        let profile = profiles.get(name).cloned().ok_or_else(|| {
            EngineError::Config(format!(
                "Unknown duration profile '{}'. Available: {}",
                name,
                profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        Self::new(name, profile)
    }

    pub fn profile_name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &DurationProfile {
        &self.profile
    }

    /// `clamp(requested ?? override(action) ?? default, min, max)`
    ///
    /// Non-finite requests count as absent.
    pub fn select(&self, action: ActionCode, requested: Option<f64>) -> f64 {
        let wanted = requested
            .filter(|secs| secs.is_finite())
            .or_else(|| self.profile.override_for(action))
            .unwrap_or(self.profile.default_secs);
        self.clamp(wanted)
    }

    /// Movement for `action`; `None` for `GOAL_ACHIEVED`
    pub fn command(&self, action: ActionCode, requested: Option<f64>) -> Option<MovementCommand> {
        let direction = action.direction()?;
        Some(MovementCommand::new(
            direction,
            self.select(action, requested),
        ))
    }

    /// Manual movement under the same bounds
    pub fn manual(&self, direction: Direction, requested: Option<f64>) -> MovementCommand {
        let wanted = requested
            .filter(|secs| secs.is_finite())
            .unwrap_or(self.profile.default_secs);
        MovementCommand::new(direction, self.clamp(wanted))
    }

    /// Pause after a movement
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.profile.settle_ms)
    }

    fn clamp(&self, secs: f64) -> f64 {
        secs.clamp(self.profile.min_secs, self.profile.max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approach() -> DurationGovernor {
        DurationGovernor::from_profiles(DEFAULT_PROFILE, &builtin_profiles()).unwrap()
    }

    #[test]
    fn test_builtin_profiles_are_valid() {
        for (name, profile) in builtin_profiles() {
            profile.validate(&name).unwrap();
        }
    }

    #[test]
    fn test_requested_duration_wins() {
        let governor = approach();
        assert_eq!(governor.select(ActionCode::MoveForward, Some(0.6)), 0.6);
    }

    #[test]
    fn test_override_then_default() {
        let governor = approach();
        assert_eq!(governor.select(ActionCode::MoveLeft, None), 0.2);
        assert_eq!(governor.select(ActionCode::NotFound, None), 0.5);

        let plain = DurationGovernor::new("plain", DurationProfile::new(0.45, 0.2, 0.85)).unwrap();
        assert_eq!(plain.select(ActionCode::MoveForward, None), 0.45);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let governor = approach();
        assert_eq!(governor.select(ActionCode::MoveForward, Some(5.0)), 0.85);
        assert_eq!(governor.select(ActionCode::MoveForward, Some(0.01)), 0.2);
        assert_eq!(governor.select(ActionCode::MoveForward, Some(-3.0)), 0.2);
        assert_eq!(governor.select(ActionCode::MoveForward, Some(f64::NAN)), 0.3);
    }

    #[test]
    fn test_goal_has_no_command() {
        let governor = approach();
        assert!(governor.command(ActionCode::GoalAchieved, None).is_none());

        let cmd = governor.command(ActionCode::TurnRight, None).unwrap();
        assert_eq!(cmd.direction(), Direction::Right);
        assert_eq!(cmd.duration_secs(), 0.4);
    }

    #[test]
    fn test_unknown_profile() {
        let err = DurationGovernor::from_profiles("warp-speed", &builtin_profiles()).unwrap_err();
        assert!(err.to_string().contains("warp-speed"));
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        assert!(DurationProfile::new(0.3, 0.5, 0.2).validate("x").is_err());
        assert!(DurationProfile::new(0.3, 0.01, 0.5).validate("x").is_err());
        assert!(DurationProfile::new(0.3, 0.1, 5.0).validate("x").is_err());
        assert!(DurationProfile::new(0.9, 0.1, 0.5).validate("x").is_err());
        assert!(DurationProfile::new(f64::NAN, 0.1, 0.5).validate("x").is_err());

        let mut bad_key = DurationProfile::new(0.3, 0.1, 0.5);
        bad_key.overrides.insert("REORIENT".to_string(), 0.2);
        assert!(bad_key.validate("x").is_err());
    }

    #[test]
    fn test_settle() {
        let governor =
            DurationGovernor::from_profiles("bold-search", &builtin_profiles()).unwrap();
        assert_eq!(governor.settle(), Duration::from_millis(300));
    }
}
