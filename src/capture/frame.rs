use bytes::Bytes;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// One encoded JPEG image with zero-copy sharing semantics
#[derive(Debug, Clone)]
pub struct Frame {
    /// Immutable encoded bytes - shared by every viewer without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Publish instant for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub produced_at: SystemTime,
}

impl Frame {
    pub fn new(sequence: u64, data: Bytes, width: u32, height: u32) -> Self {
        Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                produced_at: SystemTime::now(),
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
