//! Motor Server
//!
//! HTTP motor-control server that runs on the car's board. Each motion
//! request drives the motors for a bounded time and then halts them.
//!
//! # Endpoints
//!
//! - GET / - Server status
//! - POST /forward, /backward, /left, /right - Move for `{"duration": secs}`
//! - POST /stop - Halt immediately, cutting a running movement short
//! - POST /photo - Capture a frame with the attached camera
//!
//! # Guarantees
//!
//! - Durations are clamped into the hardware envelope
//! - One movement at a time; concurrent requests wait their turn
//! - A movement always ends with a halt, even if the client disconnects
//! - `/stop` never waits for a running movement, and cancels movements
//!   that were requested before it but have not started yet

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use carnav_sdk::capability::Camera;
use carnav_sdk::errors::EngineError;
use carnav_sdk::movement::{Direction, MovementCommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{error, info};

/// Low-level motor driver
///
/// `drive` starts the motors in one direction and returns immediately;
/// `halt` stops them. Both must be safe to call repeatedly.
pub trait MotorDriver: Send + Sync {
    fn name(&self) -> &str;

    fn drive(&self, direction: Direction) -> Result<(), EngineError>;

    fn halt(&self) -> Result<(), EngineError>;
}

/// Event seen by the [`SimulatedDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    Drive(Direction),
    Halt,
}

/// Driver that only records what it was asked to do
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    events: Mutex<Vec<DriverEvent>>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<DriverEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.log().clone()
    }
}

impl MotorDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    fn drive(&self, direction: Direction) -> Result<(), EngineError> {
        self.log().push(DriverEvent::Drive(direction));
        Ok(())
    }

    fn halt(&self) -> Result<(), EngineError> {
        self.log().push(DriverEvent::Halt);
        Ok(())
    }
}

/// Body of a motion request
#[derive(Debug, Default, Deserialize)]
struct MoveRequest {
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct MotorStatus {
    moving: bool,
    last_command: Option<String>,
}

struct Shared {
    driver: Arc<dyn MotorDriver>,
    motion: tokio::sync::Mutex<()>,
    interrupt: Notify,
    /// Bumped by every stop; a movement requested under an older value never starts
    stops: AtomicU64,
    status: Mutex<MotorStatus>,
    default_duration_secs: f64,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, MotorStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// How a motion request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionEnd {
    Completed,
    /// A stop arrived while the motors were running
    Interrupted,
    /// A stop arrived before the motors were started
    Cancelled,
}

/// Motor server state shared across handlers
#[derive(Clone)]
pub struct MotorServer {
    shared: Arc<Shared>,
    camera: Option<Arc<dyn Camera>>,
}

impl MotorServer {
    /// Create a server around `driver`
    ///
    /// `default_duration_secs` is used when a request carries no duration.
    pub fn new(driver: Arc<dyn MotorDriver>, default_duration_secs: f64) -> Self {
        Self {
            shared: Arc::new(Shared {
                driver,
                motion: tokio::sync::Mutex::new(()),
                interrupt: Notify::new(),
                stops: AtomicU64::new(0),
                status: Mutex::new(MotorStatus::default()),
                default_duration_secs,
            }),
            camera: None,
        }
    }

    /// Serve frames from `camera` on `POST /photo`
    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn is_moving(&self) -> bool {
        self.shared.status().moving
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/forward", post(forward_handler))
            .route("/backward", post(backward_handler))
            .route("/left", post(left_handler))
            .route("/right", post(right_handler))
            .route("/stop", post(stop_handler))
            .route("/photo", post(photo_handler))
            .with_state(self.clone())
    }

    /// Serve on `addr` until `shutdown` resolves, then halt the motors
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> Result<(), EngineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", addr, e)))?;

        let local = listener
            .local_addr()
            .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;

        info!(
            "Motor server listening on http://{} (driver: {})",
            local,
            self.shared.driver.name()
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| EngineError::Network(format!("Motor server error: {}", e)));

        info!("Motor server shutting down, halting motors");
        self.halt_now()?;
        result
    }

    /// Bind on `addr` and serve on a background task
    pub async fn spawn(self, addr: &str) -> Result<RunningServer, EngineError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", addr, e)))?;

        let local = listener
            .local_addr()
            .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = self.router();
        let server = self.clone();

        let join = tokio::spawn(async move {
            info!("Motor server listening on http://{}", local);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                    info!("Motor server shutting down gracefully");
                })
                .await
                .unwrap_or_else(|e| {
                    error!("Motor server error: {}", e);
                });

            server.halt_now().ok();
        });

        Ok(RunningServer {
            addr: local,
            shutdown_tx: Some(shutdown_tx),
            join,
        })
    }

    fn halt_now(&self) -> Result<(), EngineError> {
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
        self.shared.interrupt.notify_waiters();
        let result = self.shared.driver.halt();
        let mut status = self.shared.status();
        status.moving = false;
        status.last_command = Some("stop".to_string());
        result
    }

    /// Run one movement; `requested_at` is the stop count when it was requested
    async fn run_motion(
        &self,
        command: MovementCommand,
        requested_at: u64,
    ) -> Result<MotionEnd, EngineError> {
        let shared = &self.shared;
        let _guard = shared.motion.lock().await;

        if shared.stops.load(Ordering::SeqCst) != requested_at {
            return Ok(MotionEnd::Cancelled);
        }

        // Created before driving so a stop issued right after drive() is seen
        let interrupted = shared.interrupt.notified();

        if let Err(e) = shared.driver.drive(command.direction()) {
            shared.driver.halt().ok();
            return Err(e);
        }

        {
            let mut status = shared.status();
            status.moving = true;
            status.last_command = Some(command.direction().to_string());
        }

        let end = tokio::select! {
            _ = tokio::time::sleep(command.duration()) => MotionEnd::Completed,
            _ = interrupted => MotionEnd::Interrupted,
        };

        let halted = shared.driver.halt();
        shared.status().moving = false;
        halted?;

        Ok(end)
    }
}

/// Handle to a motor server running on a background task
pub struct RunningServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
}

impl RunningServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop serving and wait for the motors to be halted
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join.await.ok();
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "status": "error", "message": message.into() })),
    )
        .into_response()
}

/// Read the optional duration from a request body
///
/// An empty body means "use the default".
fn parse_duration(body: &[u8]) -> Result<Option<f64>, String> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    serde_json::from_slice::<MoveRequest>(body)
        .map(|request| request.duration)
        .map_err(|e| format!("Invalid request body: {}", e))
}

async fn index_handler(State(server): State<MotorServer>) -> Json<serde_json::Value> {
    let status = server.shared.status().clone();
    Json(json!({
        "status": "ok",
        "service": "motor-server",
        "driver": server.shared.driver.name(),
        "moving": status.moving,
        "last_command": status.last_command,
    }))
}

async fn drive(server: MotorServer, direction: Direction, body: Bytes) -> Response {
    let requested = match parse_duration(&body) {
        Ok(requested) => requested,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let command = MovementCommand::new(
        direction,
        requested.unwrap_or(server.shared.default_duration_secs),
    );
    let requested_at = server.shared.stops.load(Ordering::SeqCst);
    info!("Motor command: {}", command);

    // Run on its own task so a dropped connection cannot leave the motors on
    let motion = tokio::spawn({
        let server = server.clone();
        async move { server.run_motion(command, requested_at).await }
    });

    match motion.await {
        Ok(Ok(MotionEnd::Cancelled)) => {
            info!("Motor command {} cancelled by stop", command);
            error_response(
                StatusCode::CONFLICT,
                format!("Move {} cancelled by stop", direction),
            )
        }
        Ok(Ok(end)) => {
            let interrupted = end == MotionEnd::Interrupted;
            Json(json!({
                "status": "success",
                "message": if interrupted {
                    format!("Moved {} (stopped early)", direction)
                } else {
                    format!("Moved {} for {:.2}s", direction, command.duration_secs())
                },
                "duration_used": command.duration_secs(),
                "interrupted": interrupted,
            }))
            .into_response()
        }
        Ok(Err(e)) => {
            error!("Motor command {} failed: {}", command, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Motor task for {} failed: {}", command, e);
            server.halt_now().ok();
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "motor task failed")
        }
    }
}

async fn forward_handler(State(server): State<MotorServer>, body: Bytes) -> Response {
    drive(server, Direction::Forward, body).await
}

async fn backward_handler(State(server): State<MotorServer>, body: Bytes) -> Response {
    drive(server, Direction::Backward, body).await
}

async fn left_handler(State(server): State<MotorServer>, body: Bytes) -> Response {
    drive(server, Direction::Left, body).await
}

async fn right_handler(State(server): State<MotorServer>, body: Bytes) -> Response {
    drive(server, Direction::Right, body).await
}

async fn stop_handler(State(server): State<MotorServer>) -> Response {
    info!("Motor command: stop");
    match server.halt_now() {
        Ok(()) => Json(json!({ "status": "success", "message": "Motors stopped" })).into_response(),
        Err(e) => {
            error!("Stop failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn photo_handler(State(server): State<MotorServer>) -> Response {
    let Some(camera) = &server.camera else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "No camera attached");
    };

    match camera.capture().await {
        Ok(image) => {
            info!("Captured {} byte frame ({})", image.len(), image.mime_type());
            let mime_type = image.mime_type().to_string();
            (
                [(header::CONTENT_TYPE, mime_type)],
                image.bytes().to_vec(),
            )
                .into_response()
        }
        Err(e) => {
            error!("Photo failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
