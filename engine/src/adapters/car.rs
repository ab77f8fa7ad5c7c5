//! HTTP actuator for the car's motor server

use crate::config::CarConfig;
use async_trait::async_trait;
use carnav_sdk::capability::{ActuatorOutcome, MotionActuator};
use carnav_sdk::errors::{EngineError, Result};
use carnav_sdk::movement::{Direction, MovementCommand};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ServerReply {
    #[serde(default)]
    message: Option<String>,
}

/// Motor server status as reported by `GET /`
#[derive(Debug, Clone, Deserialize)]
pub struct CarStatus {
    pub status: String,
    #[serde(default)]
    pub moving: bool,
    #[serde(default)]
    pub last_command: Option<String>,
}

/// Drives the car through the motor server's HTTP routes
pub struct HttpActuator {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpActuator {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(config: &CarConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the motor server's status route
    pub async fn status(&self) -> Result<CarStatus> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("{} unreachable: {}", self.base_url, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "{} answered {}",
                self.base_url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("Invalid status reply: {}", e)))
    }

    async fn post(&self, command: &MovementCommand) -> Result<ActuatorOutcome> {
        let direction = command.direction();
        let url = format!("{}/{}", self.base_url, direction.endpoint());

        // The server answers only after the movement has finished
        let timeout = self.request_timeout + command.duration();

        let request = self.client.post(&url).timeout(timeout);
        let request = if direction == Direction::Stop {
            request
        } else {
            request.json(&json!({ "duration": command.duration_secs() }))
        };

        debug!("POST {} ({})", url, command);

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Actuator(format!("{} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Actuator(format!(
                "{} answered {}: {}",
                url, status, text
            )));
        }

        let reply: ServerReply = response.json().await.unwrap_or(ServerReply { message: None });
        let message = reply
            .message
            .unwrap_or_else(|| format!("{} ok", direction.endpoint()));

        Ok(ActuatorOutcome::new(*command, message))
    }
}

#[async_trait]
impl MotionActuator for HttpActuator {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, command: &MovementCommand) -> Result<ActuatorOutcome> {
        self.post(command).await
    }

    async fn stop(&self) -> Result<ActuatorOutcome> {
        self.post(&MovementCommand::stop()).await
    }
}
