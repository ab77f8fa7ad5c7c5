//! Camera adapters

use crate::config::{CameraConfig, CameraSource, CarConfig};
use async_trait::async_trait;
use carnav_sdk::capability::{Camera, Image};
use carnav_sdk::errors::{EngineError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Placeholder in camera arguments replaced with the output path
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Guess an image MIME type from a file extension
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Runs an external capture program that writes one image file
///
/// Works with `screenshot` on the car's board as well as `libcamera-still`,
/// `fswebcam` or `scrot` on a workstation.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    command: String,
    args: Vec<String>,
    output_path: PathBuf,
    mime_type: String,
}

impl CommandCamera {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        output_path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            output_path: output_path.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            config.output_path.clone(),
            config.mime_type.clone(),
        )
    }

    fn expanded_args(&self) -> Vec<String> {
        let output = self.output_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

#[async_trait]
impl Camera for CommandCamera {
    fn name(&self) -> &str {
        &self.command
    }

    async fn capture(&self) -> Result<Image> {
        // A stale file from the previous cycle must never be classified again
        match tokio::fs::remove_file(&self.output_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(EngineError::Capture(format!(
                    "Cannot clear previous capture {}: {}",
                    self.output_path.display(),
                    e
                )))
            }
        }

        let args = self.expanded_args();
        debug!("Running camera command: {} {}", self.command, args.join(" "));

        let output = tokio::process::Command::new(&self.command)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                warn!("Failed to execute camera command {}: {}", self.command, e);
                EngineError::Capture(format!("Failed to run '{}': {}", self.command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Camera command failed: {}", stderr.trim());
            return Err(EngineError::Capture(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&self.output_path).await.map_err(|e| {
            EngineError::Capture(format!(
                "No image at {}: {}",
                self.output_path.display(),
                e
            ))
        })?;

        if bytes.is_empty() {
            return Err(EngineError::Capture(format!(
                "Empty image at {}",
                self.output_path.display()
            )));
        }

        Ok(Image::new(bytes, self.mime_type.clone()))
    }
}

/// Returns the same image file on every capture
///
/// Used for replaying a recorded frame and for the `classify` command.
#[derive(Debug, Clone)]
pub struct FileCamera {
    path: PathBuf,
    mime_type: String,
    name: String,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime_for_path(&path).to_string();
        let name = format!("file:{}", path.display());
        Self {
            path,
            mime_type,
            name,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

#[async_trait]
impl Camera for FileCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture(&self) -> Result<Image> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            EngineError::Capture(format!("Cannot read {}: {}", self.path.display(), e))
        })?;

        if bytes.is_empty() {
            return Err(EngineError::Capture(format!(
                "Empty image at {}",
                self.path.display()
            )));
        }

        Ok(Image::new(bytes, self.mime_type.clone()))
    }
}

/// Fetches frames from the motor server's `POST /photo` route
///
/// Used when the camera sits on the car's board and the controller runs
/// elsewhere.
pub struct HttpCamera {
    client: reqwest::Client,
    url: String,
    request_timeout: Duration,
}

impl HttpCamera {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/photo", base_url.trim_end_matches('/')),
            request_timeout,
        }
    }

    pub fn from_config(config: &CarConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl Camera for HttpCamera {
    fn name(&self) -> &str {
        "http"
    }

    async fn capture(&self) -> Result<Image> {
        debug!("POST {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| EngineError::Capture(format!("{} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Capture(format!(
                "{} answered {}: {}",
                self.url, status, text
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Capture(format!("Unreadable frame from {}: {}", self.url, e)))?;

        if bytes.is_empty() {
            return Err(EngineError::Capture(format!("Empty frame from {}", self.url)));
        }

        Ok(Image::new(bytes.to_vec(), mime_type))
    }
}

/// Camera selected by `[camera] source`
pub fn camera_from_config(camera: &CameraConfig, car: &CarConfig) -> Arc<dyn Camera> {
    match camera.source {
        CameraSource::Command => Arc::new(CommandCamera::from_config(camera)),
        CameraSource::Http => Arc::new(HttpCamera::from_config(car)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/b.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("shot.bmp")), "image/bmp");
        assert_eq!(mime_for_path(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(
            mime_for_path(Path::new("noext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_output_placeholder_expanded() {
        let camera = CommandCamera::new(
            "screenshot",
            vec!["-file={output}".to_string(), "-q".to_string()],
            "/tmp/shot.bmp",
            "image/bmp",
        );
        assert_eq!(camera.expanded_args(), vec!["-file=/tmp/shot.bmp", "-q"]);
    }

    #[tokio::test]
    async fn test_file_camera_reads_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let image = FileCamera::new(&path).capture().await.unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.len(), 4);
    }

    #[tokio::test]
    async fn test_file_camera_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = FileCamera::new(dir.path().join("missing.png"))
            .capture()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Capture(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_camera_runs_program() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("capture.bmp");
        let camera = CommandCamera::new(
            "sh",
            vec!["-c".to_string(), "printf BM > {output}".to_string()],
            &output,
            "image/bmp",
        );

        let image = camera.capture().await.unwrap();
        assert_eq!(image.bytes(), b"BM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_camera_failure() {
        let dir = TempDir::new().unwrap();
        let camera = CommandCamera::new(
            "sh",
            vec!["-c".to_string(), "exit 3".to_string()],
            dir.path().join("capture.bmp"),
            "image/bmp",
        );

        let err = camera.capture().await.unwrap_err();
        assert!(matches!(err, EngineError::Capture(_)));
    }
}
