//! Navigation loop
//!
//! The state machine that turns one image classification into one bounded
//! movement, repeated until the goal is reached, the iteration cap is hit,
//! a component fails or the session is cancelled:
//!
//! ```text
//! Idle -> Sensing -> Classifying -> Deciding -> Acting -> (Sensing | Terminated)
//! ```
//!
//! # Safety invariants
//!
//! - No movement while the camera is failing
//! - Unknown classifier output is never turned into a movement
//! - At most one movement in flight per process ([`SerializedActuator`])
//! - No actuator call after a session has terminated, except the single
//!   fallback stop issued on the way into `Terminated`

mod actuator;
mod cancel;
mod controller;
mod handle;
mod retry;
mod session;

pub use actuator::SerializedActuator;
pub use cancel::CancelSignal;
pub use controller::{Navigator, NavigatorSettings};
pub use handle::{SessionHandle, SessionRegistry};
pub use retry::RetryPolicy;
pub use session::{
    HistoryEntry, NavState, NavigationReport, NavigationSession, StateSnapshot, Termination,
};
