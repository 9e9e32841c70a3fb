//! Single-slot, latest-wins frame broadcast
//!
//! One producer overwrites the slot; any number of viewers wait for a
//! sequence number newer than the last one they saw. Viewers that fall
//! behind skip straight to the newest frame, so memory stays at one frame
//! no matter how many viewers are attached or how fast capture runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::utils::CachePadded;
use tokio::sync::watch;

use crate::capture::Frame;
use crate::error::{Error, Result};

/// Process-wide holder of the most recent frame
#[derive(Clone)]
pub struct FrameSlot {
    inner: Arc<SlotInner>,
}

struct SlotInner {
    tx: watch::Sender<Option<Frame>>,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_published: AtomicU64,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(SlotInner {
                tx,
                stats: CachePadded::new(Stats::default()),
            }),
        }
    }

    /// Replace the latest frame and wake every waiting viewer. Never blocks
    /// on viewers; returns the sequence number assigned to the frame.
    pub fn publish(&self, data: Bytes, width: u32, height: u32) -> u64 {
        let mut sequence = 0;
        self.inner.tx.send_modify(|slot| {
            sequence = slot.as_ref().map_or(0, Frame::sequence) + 1;
            *slot = Some(Frame::new(sequence, data, width, height));
        });
        self.inner
            .stats
            .frames_published
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aquacam_frames_published_total").increment(1);
        sequence
    }

    /// Latest frame, if any has been published
    pub fn latest(&self) -> Option<Frame> {
        self.inner.tx.borrow().clone()
    }

    /// Sequence number of the latest frame (0 before the first publish)
    pub fn sequence(&self) -> u64 {
        self.inner.tx.borrow().as_ref().map_or(0, Frame::sequence)
    }

    pub fn frames_published(&self) -> u64 {
        self.inner.stats.frames_published.load(Ordering::Relaxed)
    }

    /// Wait until a frame newer than `last_seen` exists and return the latest one
    pub async fn await_next(&self, last_seen: u64) -> Result<Frame> {
        let mut rx = self.inner.tx.subscribe();
        wait_newer(&mut rx, last_seen).await
    }

    /// Independent delivery cursor starting after the current frame
    pub fn cursor(&self) -> FrameCursor {
        FrameCursor {
            rx: self.inner.tx.subscribe(),
            last_seen: self.sequence(),
            _slot: self.clone(),
        }
    }

    /// Cursor that will first deliver whatever is already in the slot
    pub fn cursor_from_start(&self) -> FrameCursor {
        FrameCursor {
            rx: self.inner.tx.subscribe(),
            last_seen: 0,
            _slot: self.clone(),
        }
    }
}

/// Per-viewer read position over a [`FrameSlot`]
pub struct FrameCursor {
    rx: watch::Receiver<Option<Frame>>,
    last_seen: u64,
    // Keeps the sender alive for as long as the cursor exists
    _slot: FrameSlot,
}

impl FrameCursor {
    /// Next frame strictly newer than the last one returned
    pub async fn next(&mut self) -> Result<Frame> {
        let frame = wait_newer(&mut self.rx, self.last_seen).await?;
        self.last_seen = frame.sequence();
        Ok(frame)
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

async fn wait_newer(rx: &mut watch::Receiver<Option<Frame>>, last_seen: u64) -> Result<Frame> {
    let slot = rx
        .wait_for(|slot| slot.as_ref().is_some_and(|f| f.sequence() > last_seen))
        .await
        .map_err(|_| Error::PipelineStopped)?;
    slot.as_ref().cloned().ok_or(Error::PipelineStopped)
}
