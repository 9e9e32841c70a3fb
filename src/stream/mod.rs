pub mod broadcaster;
pub mod mjpeg;

pub use broadcaster::{StreamBroadcaster, StreamHub, ViewerSession};
