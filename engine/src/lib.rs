//! Carnav Engine Library
//!
//! This library provides the closed-loop navigation controller and its
//! adapters. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Duration governor and profiles
pub mod governor;

/// Navigation loop, sessions and cancellation
pub mod navigation;

/// Camera, classifier and actuator backends
pub mod adapters;

/// Session journal
pub mod journal;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
