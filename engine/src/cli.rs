//! CLI interface for carnav
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the car.

use carnav_sdk::movement::Direction;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Carnav visual navigation controller
///
/// Photographs the scene, asks a vision model where the target is and drives
/// a remote-controlled car toward it one bounded movement at a time.
#[derive(Parser, Debug)]
#[command(name = "carnav")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive toward a goal until it is reached or the iteration cap is hit
    Navigate {
        /// What the car should find, e.g. "the red mug"
        goal: String,

        /// Duration profile to use instead of the configured one
        #[arg(long)]
        profile: Option<String>,

        /// Override the iteration cap
        #[arg(long, value_name = "N")]
        max_iterations: Option<u32>,

        /// Use the simulated car instead of the motor server
        #[arg(long)]
        simulate: bool,
    },

    /// Navigate one state transition at a time, waiting for Enter between steps
    Step {
        /// What the car should find
        goal: String,

        /// Duration profile to use instead of the configured one
        #[arg(long)]
        profile: Option<String>,

        /// Use the simulated car instead of the motor server
        #[arg(long)]
        simulate: bool,
    },

    /// Send one manual movement to the car
    Move {
        /// forward, backward, left or right
        direction: Direction,

        /// Duration in seconds (clamped to the active profile)
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// Stop the car immediately
    Stop,

    /// Classify an image file without moving the car
    Classify {
        /// Path to the image
        image: PathBuf,

        /// What the car should find
        goal: String,
    },

    /// Show motor server reachability and the active profile
    Status,

    /// List duration profiles
    Profiles,

    /// Show finished navigation sessions
    History {
        /// Number of sessions to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run the motor server with the simulated driver
    Serve {
        /// Address to bind (defaults to server.bind from config)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}
