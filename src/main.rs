//! Aquacam: live MJPEG camera stream with light strip control

use color_eyre::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aquacam::capture::{SensorDriver, TestPatternSensor};
use aquacam::lighting::SimulatedStrip;
use aquacam::settings::JsonFileStore;
use aquacam::{app, AppConfig, CameraBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("Aquacam launching...");

    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref())?;

    let sensor = build_sensor(&config)?;
    let strip = Box::new(SimulatedStrip::new(config.lighting.led_count));
    let store = Box::new(JsonFileStore::new(&config.settings.path));

    app::run(&config, sensor, strip, store, shutdown_signal()).await?;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aquacam=info"));
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime());

    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        fmt.finish()
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }

    #[cfg(not(feature = "profiling"))]
    fmt.init();
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn build_sensor(config: &AppConfig) -> Result<Box<dyn SensorDriver>> {
    match config.camera.backend {
        CameraBackend::TestPattern => {
            info!("Using test pattern sensor");
            Ok(Box::new(TestPatternSensor::new()))
        }
        #[cfg(feature = "v4l2")]
        CameraBackend::V4l2 => {
            let device = if config.camera.device.is_empty() {
                aquacam::utils::auto_detect_device()?
            } else {
                config.camera.device.clone()
            };
            info!("Using capture device: {}", device);
            Ok(Box::new(aquacam::capture::V4l2Sensor::new(device)?))
        }
        #[cfg(not(feature = "v4l2"))]
        CameraBackend::V4l2 => Err(color_eyre::eyre::eyre!("built without the `v4l2` feature")),
    }
}
