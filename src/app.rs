//! Process lifecycle: wiring, serving and the ordered shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::capture::SensorDriver;
use crate::error::{Error, Result};
use crate::lighting::{schedule, LightingActuator, StripDriver};
use crate::pipeline::{CapturePipeline, FrameSlot};
use crate::server::{self, AppState};
use crate::settings::{SettingsController, SettingsStore};
use crate::stream::StreamHub;
use crate::AppConfig;

/// Upper bound on waiting for viewer and server tasks at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Serve until `shutdown` resolves.
///
/// Every fallible startup step runs before the strip is first lit. From
/// then on the strip is driven off on the way out, whatever else fails.
pub async fn run<S>(
    config: &AppConfig,
    sensor: Box<dyn SensorDriver>,
    strip: Box<dyn StripDriver>,
    store: Box<dyn SettingsStore>,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    let settings = store.load()?;

    // No usable stream without a sensor
    let pipeline = Arc::new(CapturePipeline::new(sensor, FrameSlot::new()));
    pipeline.start(settings.capture_config()).await?;

    let listener = match TcpListener::bind(config.server.bind).await {
        Ok(listener) => listener,
        Err(source) => {
            if let Err(e) = pipeline.shutdown().await {
                warn!("Capture shutdown failed: {}", e);
            }
            return Err(Error::Bind {
                addr: config.server.bind,
                source,
            });
        }
    };

    let lighting = Arc::new(LightingActuator::new(strip));
    let controller = Arc::new(SettingsController::new(
        settings,
        store,
        pipeline.clone(),
        lighting.clone(),
    ));
    if let Err(e) = controller.refresh_lighting() {
        warn!("Initial lighting update failed: {}", e);
    }

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    let hub = Arc::new(StreamHub::new(pipeline.slot().clone(), cancel.child_token()));

    tracker.spawn(schedule::run(
        controller.clone(),
        config.lighting.schedule_interval(),
        cancel.clone(),
    ));

    let state = Arc::new(AppState::new(controller, hub.clone()));
    let server_cancel = cancel.clone();
    tracker.spawn(async move {
        if let Err(e) = server::serve(listener, state, server_cancel).await {
            error!("{}", e);
        }
    });
    tracker.close();

    shutdown.await;
    info!("Shutting down");

    // Stop publishing first, then release viewers
    if let Err(e) = pipeline.shutdown().await {
        error!("Capture shutdown failed: {}", e);
    }
    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        hub.shutdown().await;
        tracker.wait().await;
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for tasks to stop");
    }

    lighting.off()?;
    info!("Aquacam shut down");
    Ok(())
}
