//! multipart/x-mixed-replace framing for the MJPEG stream

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::capture::Frame;

pub const BOUNDARY: &str = "FRAME";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=FRAME";

/// Boundary line plus per-part headers, ending with the blank line
pub fn part_header(len: usize) -> String {
    format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, len
    )
}

/// Write one complete part: header, JPEG bytes, trailing line break
pub async fn write_part<W>(out: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(part_header(frame.len()).as_bytes()).await?;
    out.write_all(&frame.data).await?;
    out.write_all(b"\r\n").await?;
    out.flush().await
}
