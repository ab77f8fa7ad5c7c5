//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - navigate: Run one navigation session to termination
//! - step: Single-step a navigation session
//! - move / stop: Manual car control
//! - classify: Classify one image file
//! - status, profiles, history: Inspection
//! - serve: Run the motor server

use anyhow::{Context, Result};
use carnav_sdk::action::ClassificationResult;
use carnav_sdk::capability::{Camera, MotionActuator, SceneClassifier};
use carnav_sdk::goal::Goal;
use carnav_sdk::movement::{Direction, MovementCommand};
use motor_server::{MotorServer, SimulatedDriver};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::adapters::{
    camera_from_config, CommandCamera, FileCamera, GeminiClassifier, HttpActuator,
    SimulatedActuator,
};
use crate::config::Config;
use crate::journal::SessionJournal;
use crate::navigation::{NavigationReport, Navigator, NavigatorSettings, StateSnapshot};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Wire a navigator from configuration
fn build_navigator(
    config: &Config,
    profile: Option<&str>,
    max_iterations: Option<u32>,
    simulate: bool,
) -> Result<Navigator> {
    let governor = config.governor(profile)?;

    let mut settings = NavigatorSettings::from_config(&config.navigation);
    if let Some(max_iterations) = max_iterations {
        anyhow::ensure!(max_iterations > 0, "--max-iterations must be at least 1");
        settings = settings.with_max_iterations(max_iterations);
    }

    let camera = camera_from_config(&config.camera, &config.car);
    let classifier: Arc<dyn SceneClassifier> = Arc::new(
        GeminiClassifier::from_config(&config.classifier)
            .context("Failed to set up the vision classifier")?,
    );
    let actuator: Arc<dyn MotionActuator> = if simulate {
        tracing::info!("Using the simulated car");
        Arc::new(SimulatedActuator::new())
    } else {
        Arc::new(HttpActuator::from_config(&config.car))
    };

    Ok(Navigator::new(camera, classifier, actuator, governor, settings))
}

fn print_snapshot(snapshot: &StateSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let action = snapshot
                .last_action
                .map(|action| action.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}/{}] {:<11} {:<14} {}",
                snapshot.iteration,
                snapshot.max_iterations,
                snapshot.state.to_string(),
                action,
                snapshot.last_explanation.as_deref().unwrap_or("")
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(snapshot)?);
        }
    }
    Ok(())
}

fn print_report(report: &NavigationReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!();
            println!("Session: {}", report.session_id);
            println!("  Goal: {}", report.goal);
            println!("  Profile: {}", report.profile);
            println!("  Outcome: {}", report.termination);
            println!(
                "  Movements: {}/{}",
                report.iterations, report.max_iterations
            );
            if let Some(explanation) = &report.last_explanation {
                println!("  Last explanation: {}", explanation);
            }
            let elapsed = report.finished_at - report.started_at;
            println!("  Elapsed: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

async fn journal_report(config: &Config, report: &NavigationReport) {
    let journal = SessionJournal::new(config.journal_path());
    if let Err(e) = journal.append(report).await {
        tracing::warn!("Failed to journal session {}: {}", report.session_id, e);
    }
}

/// Run a navigation session to termination
///
/// Ctrl-C cancels the session, which stops the car.
pub async fn handle_navigate(
    goal: String,
    profile: Option<String>,
    max_iterations: Option<u32>,
    simulate: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let goal = Goal::new(goal)?;
    let navigator = build_navigator(config, profile.as_deref(), max_iterations, simulate)?;

    let mut handle = navigator.start(goal);
    let mut last_iteration = 0;

    loop {
        tokio::select! {
            snapshot = handle.changed() => {
                let Some(snapshot) = snapshot else { break };
                if snapshot.iteration != last_iteration || snapshot.is_terminated() {
                    last_iteration = snapshot.iteration;
                    print_snapshot(&snapshot, format)?;
                }
                if snapshot.is_terminated() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling session {}", handle.id());
                handle.cancel();
            }
        }
    }

    let report = handle.wait().await?;
    journal_report(config, &report).await;
    print_report(&report, format)
}

/// Single-step a navigation session
///
/// Press Enter to advance, or type `q` to cancel.
pub async fn handle_step(
    goal: String,
    profile: Option<String>,
    simulate: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let goal = Goal::new(goal)?;
    let navigator = build_navigator(config, profile.as_deref(), None, simulate)?;
    let mut session = navigator.begin(goal);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_snapshot(&session.snapshot(), format)?;
    while !session.is_terminated() {
        match lines.next_line().await? {
            Some(line) if line.trim().eq_ignore_ascii_case("q") => {
                session.cancel_signal().cancel()
            }
            Some(_) => {}
            None => session.cancel_signal().cancel(),
        }

        let snapshot = navigator.step(&mut session).await;
        print_snapshot(&snapshot, format)?;
    }

    let report = session.into_report();
    journal_report(config, &report).await;
    print_report(&report, format)
}

/// Send one manual movement to the car
pub async fn handle_move(
    direction: Direction,
    duration: Option<f64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    if direction == Direction::Stop {
        return handle_stop(config, format).await;
    }

    let governor = config.governor(None)?;
    let command = governor.manual(direction, duration);
    let actuator = HttpActuator::from_config(&config.car);

    tracing::info!("Manual movement: {}", command);
    let outcome = actuator
        .execute(&command)
        .await
        .with_context(|| format!("Failed to move {}", direction))?;

    match format {
        OutputFormat::Text => println!("{} ({})", outcome.command, outcome.message),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

/// Stop the car immediately
pub async fn handle_stop(config: &Config, format: OutputFormat) -> Result<()> {
    let actuator = HttpActuator::from_config(&config.car);
    let outcome = actuator.stop().await.context("Failed to stop the car")?;

    match format {
        OutputFormat::Text => println!("Car stopped ({})", outcome.message),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

/// Classify an image file without moving the car
pub async fn handle_classify(
    image: PathBuf,
    goal: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let goal = Goal::new(goal)?;
    let image = FileCamera::new(image)
        .capture()
        .await
        .context("Failed to read image")?;
    let classifier = GeminiClassifier::from_config(&config.classifier)?;

    let raw = classifier
        .classify(&image, &goal)
        .await
        .context("Classification failed")?;
    let result = ClassificationResult::from_raw(raw);

    let governor = config.governor(None)?;
    let command: Option<MovementCommand> = result
        .code()
        .and_then(|code| governor.command(code, None));

    match format {
        OutputFormat::Text => {
            match result.code() {
                Some(code) => println!("Action: {}", code),
                None => println!("Action: unknown"),
            }
            println!("Explanation: {}", result.explanation);
            if let Some(command) = command {
                println!(
                    "Would send: {} (profile {})",
                    command,
                    governor.profile_name()
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "result": result,
                "command": command,
                "profile": governor.profile_name(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show motor server reachability and the active profile
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let actuator = HttpActuator::from_config(&config.car);
    let car = actuator.status().await;
    let key_present = std::env::var(&config.classifier.api_key_env)
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);

    match format {
        OutputFormat::Text => {
            match &car {
                Ok(status) => println!(
                    "Motor server: {} ({}, {})",
                    actuator.base_url(),
                    status.status,
                    if status.moving { "moving" } else { "idle" }
                ),
                Err(e) => println!("Motor server: {} unreachable ({})", actuator.base_url(), e),
            }
            println!(
                "Classifier:   {} ({} {})",
                config.classifier.model,
                config.classifier.api_key_env,
                if key_present { "set" } else { "missing" }
            );
            println!("Profile:      {}", config.navigation.profile);
            println!("Cap:          {} movements", config.navigation.max_iterations);
        }
        OutputFormat::Json => {
            let output = json!({
                "car": {
                    "base_url": actuator.base_url(),
                    "reachable": car.is_ok(),
                    "moving": car.as_ref().map(|s| s.moving).unwrap_or(false),
                    "last_command": car.as_ref().ok().and_then(|s| s.last_command.clone()),
                },
                "classifier": {
                    "model": config.classifier.model,
                    "api_key_present": key_present,
                },
                "profile": config.navigation.profile,
                "max_iterations": config.navigation.max_iterations,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// List duration profiles
pub async fn handle_profiles(config: &Config, format: OutputFormat) -> Result<()> {
    let profiles = config.all_profiles();

    match format {
        OutputFormat::Text => {
            for (name, profile) in &profiles {
                let marker = if *name == config.navigation.profile { "*" } else { " " };
                println!(
                    "{} {:<18} default {:.2}s  range {:.2}s..{:.2}s  settle {}ms",
                    marker,
                    name,
                    profile.default_secs,
                    profile.min_secs,
                    profile.max_secs,
                    profile.settle_ms
                );
                for (action, secs) in &profile.overrides {
                    println!("    {:<16} {:.2}s", action, secs);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "active": config.navigation.profile,
                "profiles": profiles,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show finished navigation sessions
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let journal = SessionJournal::new(config.journal_path());
    let reports = journal
        .recent(limit)
        .await
        .context("Failed to read session history")?;

    match format {
        OutputFormat::Text => {
            if reports.is_empty() {
                println!("No sessions in history");
                return Ok(());
            }

            println!("Session History (last {} sessions):", limit);
            println!();

            for report in &reports {
                println!("Session: {}", report.session_id);
                println!("  Goal: {}", report.goal);
                println!("  Outcome: {}", report.termination);
                println!(
                    "  Movements: {}/{}",
                    report.iterations, report.max_iterations
                );
                println!(
                    "  Started: {}",
                    report.started_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "count": reports.len(),
                "limit": limit,
                "sessions": reports,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run the motor server with the simulated driver until Ctrl-C
///
/// `POST /photo` runs the configured capture command on this host.
pub async fn handle_serve(bind: Option<String>, config: &Config) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let server = MotorServer::new(
        Arc::new(SimulatedDriver::new()),
        config.server.default_duration_secs,
    )
    .with_camera(Arc::new(CommandCamera::from_config(&config.camera)));

    server
        .serve(&bind, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
