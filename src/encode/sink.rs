use image::RgbaImage;

use crate::error::Result;

/// Stream geometry announced to a [`VideoSink`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Receives RGBA frames in presentation order.
///
/// `begin` is called exactly once before any frame. After `finish` or `abort`
/// the sink is not used again.
pub trait VideoSink {
    fn begin(&mut self, cfg: SinkConfig) -> Result<()>;

    fn push_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    fn finish(&mut self) -> Result<()>;

    /// Tears the stream down without producing output.
    fn abort(&mut self);
}
