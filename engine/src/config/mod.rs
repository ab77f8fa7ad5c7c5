//! Configuration management
//!
//! This module handles loading, validation, and management of the carnav configuration.
//! Configuration is stored in TOML format at ~/.carnav/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory
//! - **navigation**: active profile, iteration cap, timeouts, retry policies
//! - **profiles**: extra or overriding duration profiles
//! - **car**: motor server address
//! - **camera**: local capture command or the car's photo route
//! - **classifier**: vision model settings
//! - **server**: motor server bind address (for `carnav serve`)
//!
//! # Path Expansion
//!
//! `~` in `core.data_dir` is expanded to the user's home directory and the
//! directory is created if it doesn't exist.
//!
//! # Examples
//!
//! ```no_run
//! use carnav_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! // Access configuration values
//! println!("Profile: {}", config.navigation.profile);
//! println!("Car: {}", config.car.base_url);
//! # Ok(())
//! # }
//! ```

use crate::governor::{builtin_profiles, DurationGovernor, DurationProfile, DEFAULT_PROFILE};
use crate::navigation::RetryPolicy;
use carnav_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
///
/// Every section has defaults, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Navigation loop settings
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Duration profiles declared in the file (merged over the built-ins)
    #[serde(default)]
    pub profiles: BTreeMap<String, DurationProfile>,

    /// Motor server client settings
    #[serde(default)]
    pub car: CarConfig,

    /// Camera settings
    #[serde(default)]
    pub camera: CameraConfig,

    /// Vision classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Motor server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Navigation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Active duration profile name
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Safety cap on movements per session
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Timeout for a single capture (seconds)
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,

    /// Timeout for a single classification (seconds)
    #[serde(default = "default_classify_timeout")]
    pub classify_timeout_secs: u64,

    /// Timeout for a single actuator call (seconds)
    #[serde(default = "default_actuator_timeout")]
    pub actuator_timeout_secs: u64,

    /// Retry policy for camera failures
    #[serde(default = "default_capture_retry")]
    pub capture_retry: RetryPolicy,

    /// Retry policy for classifier failures
    #[serde(default = "default_classify_retry")]
    pub classify_retry: RetryPolicy,
}

/// Motor server client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarConfig {
    /// Base URL of the motor server on the car
    #[serde(default = "default_car_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_car_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    /// Run `command` on this host
    #[default]
    Command,
    /// Ask the motor server at `car.base_url` for a frame (`POST /photo`)
    Http,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Frame source
    #[serde(default)]
    pub source: CameraSource,

    /// Capture command; it must write the image to `output_path`
    #[serde(default = "default_camera_command")]
    pub command: String,

    /// Arguments; `{output}` is replaced with `output_path`
    #[serde(default = "default_camera_args")]
    pub args: Vec<String>,

    /// Where the capture command writes the image
    #[serde(default = "default_camera_output")]
    pub output_path: PathBuf,

    /// MIME type of the captured image
    #[serde(default = "default_camera_mime")]
    pub mime_type: String,
}

/// Vision classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL for the Gemini API
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    // Note: the key itself is never stored in config
}

/// Motor server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the motor server binds to
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Movement duration when a request carries none (seconds)
    #[serde(default = "default_server_duration")]
    pub default_duration_secs: f64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.carnav")
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_max_iterations() -> u32 {
    20
}

fn default_capture_timeout() -> u64 {
    10
}

fn default_classify_timeout() -> u64 {
    30
}

fn default_actuator_timeout() -> u64 {
    7
}

fn default_capture_retry() -> RetryPolicy {
    RetryPolicy::new(3, 500, 4000)
}

fn default_classify_retry() -> RetryPolicy {
    RetryPolicy::new(2, 1000, 4000)
}

fn default_car_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_car_request_timeout() -> u64 {
    7
}

fn default_camera_command() -> String {
    "screenshot".to_string()
}

fn default_camera_args() -> Vec<String> {
    vec!["-file={output}".to_string()]
}

fn default_camera_output() -> PathBuf {
    PathBuf::from("/tmp/carnav-capture.bmp")
}

fn default_camera_mime() -> String {
    "image/bmp".to_string()
}

fn default_classifier_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_classifier_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_server_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_server_duration() -> f64 {
    0.3
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            max_iterations: default_max_iterations(),
            capture_timeout_secs: default_capture_timeout(),
            classify_timeout_secs: default_classify_timeout(),
            actuator_timeout_secs: default_actuator_timeout(),
            capture_retry: default_capture_retry(),
            classify_retry: default_classify_retry(),
        }
    }
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            base_url: default_car_base_url(),
            request_timeout_secs: default_car_request_timeout(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::default(),
            command: default_camera_command(),
            args: default_camera_args(),
            output_path: default_camera_output(),
            mime_type: default_camera_mime(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
            default_duration_secs: default_server_duration(),
        }
    }
}

impl NavigationConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn actuator_timeout(&self) -> Duration {
        Duration::from_secs(self.actuator_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.carnav/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.carnav/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".carnav").join("config.toml"))
    }

    /// Built-in profiles with the file's profiles layered on top
    pub fn all_profiles(&self) -> BTreeMap<String, DurationProfile> {
        let mut profiles = builtin_profiles();
        profiles.extend(
            self.profiles
                .iter()
                .map(|(name, profile)| (name.clone(), profile.clone())),
        );
        profiles
    }

    /// Governor for the active profile, or `profile_override` if given
    pub fn governor(&self, profile_override: Option<&str>) -> Result<DurationGovernor, EngineError> {
        let name = profile_override.unwrap_or(&self.navigation.profile);
        DurationGovernor::from_profiles(name, &self.all_profiles())
    }

    /// Path of the session journal
    pub fn journal_path(&self) -> PathBuf {
        self.core.data_dir.join("sessions.jsonl")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, profiles, caps, timeouts and retry policies
    /// - Expands ~ in the data directory and creates it
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` describing the first invalid setting.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Validation without touching the file system
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for (name, profile) in &self.profiles {
            profile.validate(name)?;
        }

        // Resolves and validates the active profile
        self.governor(None)?;

        let nav = &self.navigation;
        if nav.max_iterations == 0 {
            return Err(EngineError::Config(
                "navigation.max_iterations must be at least 1".to_string(),
            ));
        }

        if nav.capture_timeout_secs == 0
            || nav.classify_timeout_secs == 0
            || nav.actuator_timeout_secs == 0
        {
            return Err(EngineError::Config(
                "navigation timeouts must be at least 1 second".to_string(),
            ));
        }

        nav.capture_retry.validate("navigation.capture_retry")?;
        nav.classify_retry.validate("navigation.classify_retry")?;

        if self.car.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "car.request_timeout_secs must be at least 1 second".to_string(),
            ));
        }

        if !self.server.default_duration_secs.is_finite()
            || self.server.default_duration_secs <= 0.0
        {
            return Err(EngineError::Config(
                "server.default_duration_secs must be a positive number".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.navigation.profile, "default-approach");
        assert_eq!(config.navigation.max_iterations, 20);
        assert_eq!(config.navigation.capture_retry.max_attempts, 3);
        assert_eq!(config.classifier.model, "gemini-2.5-flash");
        config.validate().unwrap();
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.navigation.profile, deserialized.navigation.profile);
        assert_eq!(
            config.navigation.classify_retry,
            deserialized.navigation.classify_retry
        );
    }

    #[test]
    fn test_file_profile_overrides_builtin() {
        let mut config = Config::default();
        config.profiles.insert(
            "default-approach".to_string(),
            DurationProfile::new(0.5, 0.4, 0.6),
        );

        let governor = config.governor(None).unwrap();
        assert_eq!(governor.profile().min_secs, 0.4);
        assert_eq!(config.all_profiles().len(), 3);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = Config::default();
        config.core.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.navigation.profile = "turbo".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.navigation.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.navigation.capture_retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.navigation.classify_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
