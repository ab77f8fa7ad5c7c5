//! Gemini scene classifier
//!
//! Sends the camera frame inline together with the navigation prompt and
//! returns the model's text untouched. Decoding is done by the loop.

use crate::config::ClassifierConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use carnav_sdk::action::ActionCode;
use carnav_sdk::capability::{Image, SceneClassifier};
use carnav_sdk::errors::{EngineError, Result};
use carnav_sdk::goal::Goal;
use serde_json::json;
use tracing::debug;

/// Build the navigation prompt for `goal`
///
/// The model must answer with one action code on the first line and a short
/// explanation on the second.
pub fn navigation_prompt(goal: &Goal) -> String {
    let codes = ActionCode::PRIORITY
        .iter()
        .map(|code| code.literal())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are the navigation system of a small remote-controlled car. \
         The image was taken by the car's front camera.\n\
         Goal: {goal}\n\n\
         Decide the single next movement that brings the car closer to the goal.\n\
         - GOAL_ACHIEVED: the target is centered in view and close enough\n\
         - MOVE_LEFT / MOVE_RIGHT: the target is visible but off-center, nudge toward it\n\
         - MOVE_FORWARD: the target is centered but still far away\n\
         - MOVE_BACKWARD: the car is too close or about to hit something\n\
         - TURN_LEFT / TURN_RIGHT: the target is at the edge of the frame\n\
         - NOT_FOUND: the target is not visible at all\n\n\
         Answer with exactly one of these codes on the first line: {codes}.\n\
         On the second line explain your decision in one or two sentences.\n\
         Never answer with any other code such as REORIENT or ADJUST.",
        goal = goal,
        codes = codes
    )
}

/// Scene classifier backed by the Gemini `generateContent` API
pub struct GeminiClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Create a classifier, reading the API key from the configured
    /// environment variable
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "Environment variable {} is not set; it must hold the Gemini API key",
                    config.api_key_env
                ))
            })?;

        Ok(Self::new(api_key, &config.model, &config.base_url))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(image: &Image, goal: &Goal) -> serde_json::Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": image.mime_type(),
                            "data": STANDARD.encode(image.bytes()),
                        }
                    },
                    { "text": navigation_prompt(goal) }
                ]
            }]
        })
    }
}

#[async_trait]
impl SceneClassifier for GeminiClassifier {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn classify(&self, image: &Image, goal: &Goal) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(
            "Classifying {} byte image with {} for goal '{}'",
            image.len(),
            self.model,
            goal
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(image, goal))
            .send()
            .await
            // reqwest errors carry the URL, which carries the key
            .map_err(|e| EngineError::Classify(format!("request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            let message = match status.as_u16() {
                400 | 404 => format!("invalid request ({}): {}", status, text),
                401 | 403 => {
                    return Err(EngineError::Config(format!(
                        "Gemini authentication failed ({}); check the API key",
                        status
                    )))
                }
                429 => "rate limit exceeded".to_string(),
                _ => format!("Gemini API error ({}): {}", status, text),
            };
            return Err(EngineError::Classify(message));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Classify(format!("unreadable response: {}", e.without_url())))?;

        extract_text(&data)
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(data: &serde_json::Value) -> Result<String> {
    let candidate = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| EngineError::Classify("No candidates in response".to_string()))?;

    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| EngineError::Classify("No parts in candidate content".to_string()))?;

    let full_text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if full_text.trim().is_empty() {
        return Err(EngineError::Classify("Empty answer from model".to_string()));
    }

    Ok(full_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_code() {
        let prompt = navigation_prompt(&Goal::new("the red mug").unwrap());
        assert!(prompt.contains("Goal: the red mug"));
        for code in ActionCode::PRIORITY {
            assert!(prompt.contains(code.literal()));
        }
    }

    #[test]
    fn test_request_body_inlines_image() {
        let image = Image::new(b"BM".to_vec(), "image/bmp");
        let body = GeminiClassifier::request_body(&image, &Goal::new("door").unwrap());

        let inline = &body["contents"][0]["parts"][0]["inline_data"];
        assert_eq!(inline["mime_type"], "image/bmp");
        assert_eq!(inline["data"], "Qk0=");
        assert!(body["contents"][0]["parts"][1]["text"]
            .as_str()
            .unwrap()
            .contains("door"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let data = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "MOVE_LEFT\n" }, { "text": "Mug on the left." }] }
            }]
        });
        assert_eq!(extract_text(&data).unwrap(), "MOVE_LEFT\nMug on the left.");
    }

    #[test]
    fn test_extract_text_errors() {
        assert!(extract_text(&json!({})).is_err());
        assert!(extract_text(&json!({ "candidates": [] })).is_err());
        assert!(extract_text(&json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] } }]
        }))
        .is_err());
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = ClassifierConfig {
            api_key_env: "CARNAV_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            GeminiClassifier::from_config(&config),
            Err(EngineError::Config(_))
        ));
    }
}
