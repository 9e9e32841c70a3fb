pub mod capture;
pub mod slot;

pub use capture::{CapturePipeline, PipelineState};
pub use slot::{FrameCursor, FrameSlot};
