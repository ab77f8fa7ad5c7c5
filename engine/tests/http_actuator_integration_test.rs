//! Integration tests for the HTTP actuator and camera
//!
//! Drives a real motor server (simulated driver) over loopback HTTP

use async_trait::async_trait;
use carnav_engine::adapters::{camera_from_config, HttpActuator, HttpCamera};
use carnav_engine::config::{CameraConfig, CameraSource, CarConfig};
use carnav_engine::governor::{builtin_profiles, DurationGovernor, DEFAULT_PROFILE};
use carnav_engine::navigation::{Navigator, NavigatorSettings, Termination};
use carnav_sdk::capability::{Camera, Image, MotionActuator, SceneClassifier};
use carnav_sdk::errors::{EngineError, NavErrorExt, Result};
use carnav_sdk::goal::Goal;
use carnav_sdk::movement::{Direction, MovementCommand};
use motor_server::{DriverEvent, MotorServer, RunningServer, SimulatedDriver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn start_server() -> (RunningServer, Arc<SimulatedDriver>) {
    let driver = Arc::new(SimulatedDriver::new());
    let server = MotorServer::new(driver.clone(), 0.1)
        .spawn("127.0.0.1:0")
        .await
        .expect("Failed to start motor server");
    (server, driver)
}

async fn start_server_with_camera() -> (RunningServer, Arc<SimulatedDriver>) {
    let driver = Arc::new(SimulatedDriver::new());
    let server = MotorServer::new(driver.clone(), 0.1)
        .with_camera(Arc::new(StillCamera))
        .spawn("127.0.0.1:0")
        .await
        .expect("Failed to start motor server");
    (server, driver)
}

fn actuator(server: &RunningServer) -> HttpActuator {
    HttpActuator::new(server.base_url(), Duration::from_secs(5))
}

#[tokio::test]
async fn test_execute_drives_then_halts() {
    let (server, driver) = start_server().await;
    let car = actuator(&server);

    let outcome = car
        .execute(&MovementCommand::new(Direction::Forward, 0.1))
        .await
        .unwrap();

    assert_eq!(outcome.command.direction(), Direction::Forward);
    assert!(outcome.message.contains("forward"));
    assert_eq!(
        driver.events(),
        vec![DriverEvent::Drive(Direction::Forward), DriverEvent::Halt]
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_stop_and_status() {
    let (server, driver) = start_server().await;
    let car = actuator(&server);

    let outcome = car.stop().await.unwrap();
    assert!(outcome.command.is_stop());
    assert_eq!(outcome.message, "Motors stopped");
    assert_eq!(driver.events(), vec![DriverEvent::Halt]);

    let status = car.status().await.unwrap();
    assert_eq!(status.status, "ok");
    assert!(!status.moving);
    assert_eq!(status.last_command.as_deref(), Some("stop"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_stop_cuts_movement_short() {
    let (server, _driver) = start_server().await;
    let car = Arc::new(actuator(&server));

    let mover = {
        let car = car.clone();
        tokio::spawn(async move {
            car.execute(&MovementCommand::new(Direction::Left, 2.0))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    car.stop().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(1), mover)
        .await
        .expect("movement should end right after the stop")
        .unwrap()
        .unwrap();
    assert!(outcome.message.contains("stopped early"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_server_is_an_actuator_error() {
    // Bind and drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let car = HttpActuator::new(format!("http://127.0.0.1:{}", port), Duration::from_secs(1));

    let err = car
        .execute(&MovementCommand::new(Direction::Right, 0.1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Actuator(_)));

    let err = car.status().await.unwrap_err();
    assert!(matches!(err, EngineError::Network(_)));
}

struct StillCamera;

#[async_trait]
impl Camera for StillCamera {
    fn name(&self) -> &str {
        "still"
    }

    async fn capture(&self) -> Result<Image> {
        Ok(Image::new(b"BM".to_vec(), "image/bmp"))
    }
}

/// Sees the target off to the right once, then centered
#[derive(Default)]
struct ApproachingClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl SceneClassifier for ApproachingClassifier {
    fn name(&self) -> &str {
        "approaching"
    }

    async fn classify(&self, _image: &Image, _goal: &Goal) -> Result<String> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok("MOVE_RIGHT\nSlightly to the right.".to_string()),
            _ => Ok("GOAL_ACHIEVED\nCentered.".to_string()),
        }
    }
}

#[tokio::test]
async fn test_navigation_over_http() {
    let (server, driver) = start_server().await;

    let navigator = Navigator::new(
        Arc::new(StillCamera),
        Arc::new(ApproachingClassifier::default()),
        Arc::new(actuator(&server)),
        DurationGovernor::from_profiles(DEFAULT_PROFILE, &builtin_profiles()).unwrap(),
        NavigatorSettings::default(),
    );

    let report = navigator
        .run(navigator.begin(Goal::new("the door").unwrap()))
        .await;

    assert_eq!(report.termination, Termination::Success);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.history[0].duration_secs, 0.2);
    assert_eq!(
        driver.events(),
        vec![DriverEvent::Drive(Direction::Right), DriverEvent::Halt]
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_http_camera_fetches_frame() {
    let (server, driver) = start_server_with_camera().await;
    let camera = HttpCamera::new(server.base_url(), Duration::from_secs(5));

    let image = camera.capture().await.unwrap();

    assert_eq!(image.bytes(), b"BM");
    assert_eq!(image.mime_type(), "image/bmp");
    // Taking a photo never touches the motors
    assert!(driver.events().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_http_camera_without_camera_is_capture_error() {
    let (server, _driver) = start_server().await;
    let camera = HttpCamera::new(server.base_url(), Duration::from_secs(5));

    let err = camera.capture().await.unwrap_err();

    assert!(matches!(err, EngineError::Capture(_)));
    assert!(err.is_recoverable());

    server.shutdown().await;
}

#[tokio::test]
async fn test_camera_source_from_config() {
    let car = CarConfig::default();

    let mut camera = CameraConfig::default();
    assert_eq!(camera_from_config(&camera, &car).name(), "screenshot");

    camera.source = CameraSource::Http;
    assert_eq!(camera_from_config(&camera, &car).name(), "http");
}

#[tokio::test]
async fn test_navigation_with_camera_on_the_car() {
    let (server, driver) = start_server_with_camera().await;

    let navigator = Navigator::new(
        Arc::new(HttpCamera::new(server.base_url(), Duration::from_secs(5))),
        Arc::new(ApproachingClassifier::default()),
        Arc::new(actuator(&server)),
        DurationGovernor::from_profiles(DEFAULT_PROFILE, &builtin_profiles()).unwrap(),
        NavigatorSettings::default(),
    );

    let report = navigator
        .run(navigator.begin(Goal::new("the door").unwrap()))
        .await;

    assert_eq!(report.termination, Termination::Success);
    assert_eq!(
        driver.events(),
        vec![DriverEvent::Drive(Direction::Right), DriverEvent::Halt]
    );

    server.shutdown().await;
}
