// Carnav visual navigation controller
// Main entry point for the carnav binary

use clap::Parser;
use carnav_engine::cli::{Cli, Command};
use carnav_engine::config::Config;
use carnav_engine::handlers::{
    handle_classify, handle_history, handle_move, handle_navigate, handle_profiles, handle_serve,
    handle_status, handle_step, handle_stop, OutputFormat,
};
use carnav_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Carnav v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Navigate {
            goal,
            profile,
            max_iterations,
            simulate,
        } => {
            tracing::info!("Navigating toward: {}", goal);
            handle_navigate(goal, profile, max_iterations, simulate, &config, format).await
        }

        Command::Step {
            goal,
            profile,
            simulate,
        } => {
            tracing::info!("Single-stepping toward: {}", goal);
            handle_step(goal, profile, simulate, &config, format).await
        }

        Command::Move {
            direction,
            duration,
        } => handle_move(direction, duration, &config, format).await,

        Command::Stop => handle_stop(&config, format).await,

        Command::Classify { image, goal } => {
            tracing::info!("Classifying {}", image.display());
            handle_classify(image, goal, &config, format).await
        }

        Command::Status => handle_status(&config, format).await,

        Command::Profiles => handle_profiles(&config, format).await,

        Command::History { limit } => {
            tracing::info!("Showing last {} sessions", limit);
            handle_history(limit, &config, format).await
        }

        Command::Serve { bind } => {
            tracing::info!("Starting motor server...");
            handle_serve(bind, &config).await
        }
    }
}
