//! Startup and shutdown ordering of the whole process

use std::time::Duration;

use tokio::net::TcpListener;

use aquacam::capture::{Resolution, TestPatternSensor};
use aquacam::lighting::{Rgb, SimulatedStrip, StripHandle};
use aquacam::settings::{MemoryStore, SettingsRecord};
use aquacam::{app, AppConfig, Error};

const LIT: Rgb = Rgb::new(0x20, 0x40, 0x60);

fn lit_store() -> MemoryStore {
    MemoryStore::with_record(SettingsRecord {
        resolution: Resolution::new(32, 24),
        led_on: true,
        led_color: LIT,
        ..Default::default()
    })
}

fn dark(handle: &StripHandle) -> bool {
    handle.visible().iter().all(|p| *p == Rgb::OFF)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bind_failure_never_lights_the_strip() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = AppConfig::default();
    config.server.bind = taken.local_addr().unwrap();

    let strip = SimulatedStrip::new(4);
    let handle = strip.handle();
    let result = app::run(
        &config,
        Box::new(TestPatternSensor::new()),
        Box::new(strip),
        Box::new(lit_store()),
        std::future::pending(),
    )
    .await;

    assert!(matches!(result, Err(Error::Bind { .. })), "{result:?}");
    assert_eq!(handle.shows(), 0);
    assert!(dark(&handle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_drives_the_strip_off() {
    let mut config = AppConfig::default();
    config.server.bind = "127.0.0.1:0".parse().unwrap();

    let strip = SimulatedStrip::new(4);
    let handle = strip.handle();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        app::run(
            &config,
            Box::new(TestPatternSensor::new()),
            Box::new(strip),
            Box::new(lit_store()),
            async {
                let _ = stop_rx.await;
            },
        )
        .await
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.visible().first() != Some(&LIT) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("strip never lit");

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(dark(&handle));
}
