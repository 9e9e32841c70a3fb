//! Per-viewer delivery loops over the shared frame slot

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::{FrameCursor, FrameSlot};
use crate::stream::mjpeg;

/// State owned by one connected viewer: its id and delivery cursor
pub struct ViewerSession {
    pub id: u64,
    cursor: FrameCursor,
    frames_sent: u64,
}

impl ViewerSession {
    pub fn last_sequence(&self) -> u64 {
        self.cursor.last_seen()
    }
}

/// Pushes every newer frame to one viewer until it goes away
pub struct StreamBroadcaster {
    session: ViewerSession,
    cancel: CancellationToken,
    _presence: Presence,
}

impl StreamBroadcaster {
    /// Deliver frames until the output fails or the session is cancelled.
    ///
    /// Returns the number of frames sent on cancellation, or
    /// [`Error::ViewerDisconnected`] once the output stops accepting bytes.
    pub async fn run<W>(mut self, mut out: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let id = self.session.id;
        debug!("Viewer {} streaming from sequence {}", id, self.session.last_sequence());

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Viewer {} cancelled after {} frames", id, self.session.frames_sent);
                    return Ok(self.session.frames_sent);
                }
                frame = self.session.cursor.next() => frame?,
            };

            // A viewer that stops reading must not hold up shutdown
            let written = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(self.session.frames_sent),
                written = mjpeg::write_part(&mut out, &frame) => written,
            };
            if let Err(e) = written {
                info!(
                    "Removed streaming client {} after {} frames: {}",
                    id, self.session.frames_sent, e
                );
                return Err(Error::ViewerDisconnected(e));
            }
            self.session.frames_sent += 1;
            metrics::counter!("aquacam_frames_sent_total").increment(1);
        }
    }
}

/// Counts connected viewers for the lifetime of a broadcaster
struct Presence(Arc<AtomicUsize>);

impl Presence {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("aquacam_viewers").increment(1.0);
        Self(count.clone())
    }
}

impl Drop for Presence {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("aquacam_viewers").decrement(1.0);
    }
}

/// Creates broadcasters and tracks their tasks so shutdown can cancel them
pub struct StreamHub {
    slot: FrameSlot,
    cancel: CancellationToken,
    tracker: TaskTracker,
    viewers: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl StreamHub {
    pub fn new(slot: FrameSlot, cancel: CancellationToken) -> Self {
        Self {
            slot,
            cancel,
            tracker: TaskTracker::new(),
            viewers: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Currently connected viewers
    pub fn viewers(&self) -> usize {
        self.viewers.load(Ordering::Relaxed)
    }

    /// New broadcaster positioned on the current frame; its cancellation
    /// is a child of the hub's, so hub shutdown ends it too.
    pub fn attach(&self) -> StreamBroadcaster {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        StreamBroadcaster {
            session: ViewerSession {
                id,
                cursor: self.slot.cursor_from_start(),
                frames_sent: 0,
            },
            cancel: self.cancel.child_token(),
            _presence: Presence::enter(&self.viewers),
        }
    }

    /// Attach a viewer and run its loop as a tracked task
    pub fn spawn_viewer<W>(&self, out: W)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let broadcaster = self.attach();
        let id = broadcaster.session.id;
        info!("Streaming client {} connected", id);

        self.tracker.spawn(async move {
            match broadcaster.run(out).await {
                Ok(_) | Err(Error::ViewerDisconnected(_)) => {}
                Err(e) => warn!("Viewer {} stopped: {}", id, e),
            }
        });
    }

    /// Cancel every viewer loop and wait for them to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All viewer loops stopped");
    }
}
