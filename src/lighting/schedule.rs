//! Time-of-day lighting schedule

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::settings::SettingsController;

/// Parse a 24h `HH:MM` time of day
pub fn parse_time(field: &str, s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| Error::invalid(field, format!("`{}` is not HH:MM ({})", s, e)))
}

/// Whether the lights belong on at `now`. A window whose off time is
/// earlier than its on time runs across midnight.
pub fn desired_state(now: NaiveTime, on: NaiveTime, off: NaiveTime) -> bool {
    if on <= off {
        on <= now && now < off
    } else {
        now >= on || now < off
    }
}

/// One schedule check. Returns the new `led_on` value when a toggle was
/// issued, `None` when the schedule is off or already satisfied.
pub async fn evaluate(controller: &SettingsController, now: NaiveTime) -> Result<Option<bool>> {
    let lighting = controller.lighting_config();
    if !lighting.schedule_enabled {
        return Ok(None);
    }

    let on = parse_time("led_on_time", &lighting.on_time)?;
    let off = parse_time("led_off_time", &lighting.off_time)?;
    let desired = desired_state(now, on, off);
    if desired == lighting.enabled {
        return Ok(None);
    }

    info!(
        "Schedule turning lights {} at {}",
        if desired { "on" } else { "off" },
        now.format("%H:%M")
    );
    let outcome = controller.apply_one("led_on", Value::Bool(desired)).await;
    if let Some(fault) = outcome.faults.first() {
        warn!("Scheduled lighting change incomplete: {}", fault.message);
    }
    Ok(Some(desired))
}

/// Evaluate the schedule every `period` until cancelled
pub async fn run(controller: Arc<SettingsController>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    info!("Lighting schedule checking every {:?}", period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let now = Local::now().time();
                match evaluate(&controller, now).await {
                    Ok(Some(_)) => {}
                    Ok(None) => debug!("Schedule check at {}: no change", now.format("%H:%M")),
                    Err(e) => warn!("Schedule check skipped: {}", e),
                }
            }
        }
    }
    debug!("Lighting schedule stopped");
}
