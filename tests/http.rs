//! End-to-end tests over real HTTP
//!
//! Runs the full stack with the test-pattern sensor and a simulated strip:
//! sensor → pipeline → frame slot → broadcaster → HTTP client.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use aquacam::capture::{FrameSink, Resolution, SensorDriver, SensorMode, TestPatternSensor};
use aquacam::lighting::{LightingActuator, Rgb, SimulatedStrip, StripHandle};
use aquacam::pipeline::{CapturePipeline, FrameSlot};
use aquacam::server::{self, AppState};
use aquacam::settings::{JsonFileStore, SettingsController, SettingsRecord};
use aquacam::stream::StreamHub;

// ── Helpers ──────────────────────────────────────────────────────────

struct TestServer {
    addr: SocketAddr,
    hub: Arc<StreamHub>,
    strip: StripHandle,
    settings_path: PathBuf,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Test-pattern sensor that refuses one frame rate
struct PickySensor {
    inner: TestPatternSensor,
    reject: u32,
}

impl SensorDriver for PickySensor {
    fn name(&self) -> &str {
        "picky"
    }

    fn configure(&mut self, mode: &SensorMode) -> aquacam::Result<()> {
        if mode.frame_rate == self.reject {
            return Err(aquacam::Error::hardware(format!("no {}fps", mode.frame_rate)));
        }
        self.inner.configure(mode)
    }

    fn start_encoding(&mut self, quality: u8, sink: FrameSink) -> aquacam::Result<()> {
        self.inner.start_encoding(quality, sink)
    }

    fn stop_encoding(&mut self) -> aquacam::Result<()> {
        self.inner.stop_encoding()
    }
}

async fn start_server() -> TestServer {
    start_server_with(Box::new(TestPatternSensor::new())).await
}

async fn start_server_with(sensor: Box<dyn SensorDriver>) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("camera_settings.json");
    let record = SettingsRecord {
        resolution: Resolution::new(64, 48),
        ..Default::default()
    };

    let pipeline = Arc::new(CapturePipeline::new(sensor, FrameSlot::new()));
    pipeline.start(record.capture_config()).await.unwrap();

    let strip = SimulatedStrip::new(5);
    let strip_handle = strip.handle();
    let lighting = Arc::new(LightingActuator::new(Box::new(strip)));
    let controller = Arc::new(SettingsController::new(
        record,
        Box::new(JsonFileStore::new(&settings_path)),
        pipeline.clone(),
        lighting,
    ));

    let cancel = CancellationToken::new();
    let hub = Arc::new(StreamHub::new(pipeline.slot().clone(), cancel.child_token()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(controller, hub.clone()));
    tokio::spawn(server::serve(listener, state, cancel.clone()));

    TestServer {
        addr,
        hub,
        strip: strip_handle,
        settings_path,
        cancel,
        _dir: dir,
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Splits a multipart/x-mixed-replace body into JPEG payloads
struct PartReader {
    stream: ByteStream,
    buf: Vec<u8>,
}

impl PartReader {
    fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buf: Vec::new(),
        }
    }

    async fn next_part(&mut self) -> Vec<u8> {
        loop {
            if let Some(part) = take_part(&mut self.buf) {
                return part;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("stream error");
            self.buf.extend_from_slice(&chunk);
        }
    }
}

fn take_part(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let header_end = buf.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let header = std::str::from_utf8(&buf[..header_end]).unwrap();
    assert!(
        header.starts_with("--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: "),
        "bad part header: {header:?}"
    );
    let len: usize = header
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    let end = header_end + len + 2;
    if buf.len() < end {
        return None;
    }
    assert_eq!(&buf[header_end + len..end], b"\r\n");
    let part = buf[header_end..header_end + len].to_vec();
    buf.drain(..end);
    Some(part)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ── Stream ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_delivers_decodable_jpeg_parts() {
    let server = start_server().await;

    let response = reqwest::get(server.url("/stream.mjpg")).await.unwrap();
    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(
        headers["content-type"],
        "multipart/x-mixed-replace; boundary=FRAME"
    );
    assert_eq!(headers["cache-control"], "no-cache, private");
    assert_eq!(headers["pragma"], "no-cache");
    assert_eq!(headers["age"], "0");

    let mut parts = PartReader::new(response);
    for _ in 0..3 {
        let jpeg = parts.next_part().await;
        let mut decoder = jpeg_decoder::Decoder::new(&jpeg[..]);
        decoder.decode().unwrap();
        let info = decoder.info().unwrap();
        assert_eq!((info.width, info.height), (64, 48));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnecting_one_viewer_leaves_the_other_streaming() {
    let server = start_server().await;

    let first = reqwest::get(server.url("/stream.mjpg")).await.unwrap();
    let second = reqwest::get(server.url("/stream.mjpg")).await.unwrap();
    let mut first = PartReader::new(first);
    let mut second = PartReader::new(second);
    first.next_part().await;
    second.next_part().await;
    assert_eq!(server.hub.viewers(), 2);

    drop(first);
    let hub = server.hub.clone();
    wait_for(|| hub.viewers() == 1).await;

    for _ in 0..3 {
        second.next_part().await;
    }
}

// ── Settings ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_update_applies_valid_keys_and_persists() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/update_settings"))
        .json(&json!({"quality": 999, "framerate": 10, "volume": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["applied"], json!(["framerate"]));
    assert_eq!(body["ignored"], json!(["volume"]));
    assert_eq!(body["rejected"][0]["key"], "quality");

    let settings: Value = client
        .get(server.url("/settings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["framerate"], 10);
    assert_eq!(settings["quality"], 70);
    assert_eq!(settings["resolution"], "64,48");

    let saved: SettingsRecord =
        serde_json::from_slice(&std::fs::read(&server.settings_path).unwrap()).unwrap();
    assert_eq!(saved.framerate, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sensor_fault_answers_500_until_resolved() {
    let server = start_server_with(Box::new(PickySensor {
        inner: TestPatternSensor::new(),
        reject: 5,
    }))
    .await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .post(server.url("/update_settings"))
            .json(&json!({"framerate": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["faults"][0]["kind"], "hardware");
    }

    let response = client
        .post(server.url("/update_settings"))
        .json(&json!({"framerate": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let info: Value = reqwest::get(server.url("/system_info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["pipeline"]["config"]["frame_rate"], 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn form_style_update_drives_the_strip() {
    let server = start_server().await;

    let response = reqwest::Client::new()
        .post(server.url("/update_settings"))
        .json(&json!({
            "led_on": "true",
            "led_color": "#336699",
            "led_brightness": "128"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");

    assert!(server
        .strip
        .visible()
        .iter()
        .all(|p| *p == Rgb::new(0x33, 0x66, 0x99)));
    assert_eq!(server.strip.visible_brightness(), 128);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn system_info_reports_pipeline_and_schedule() {
    let server = start_server().await;
    let response = reqwest::get(server.url("/stream.mjpg")).await.unwrap();
    let mut parts = PartReader::new(response);
    parts.next_part().await;

    let info: Value = reqwest::get(server.url("/system_info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["schedule_status"], "Inactive");
    assert_eq!(info["pipeline"]["state"], "running");
    assert_eq!(info["pipeline"]["config"]["frame_rate"], 15);
    assert_eq!(info["viewers"], 1);
    assert!(info["sequence"].as_u64().unwrap() >= 1);
    assert!(info["cpu_load"].is_null());
    assert!(info["ram_usage"].is_null());
}
