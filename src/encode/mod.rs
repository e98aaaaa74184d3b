//! Streaming encoders for the derived session artifacts.
//!
//! Both encoders walk an ordered list of photo paths, resample one frame at a
//! time and hand it to the output stream before decoding the next one.

pub mod boomerang;
pub mod ffmpeg;
pub mod sink;
pub mod stop_motion;

use std::path::PathBuf;

pub use boomerang::BoomerangEncoder;
pub use stop_motion::StopMotionEncoder;

/// Outcome of a finished encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeReport {
    pub path: PathBuf,
    pub frames_written: usize,
    pub frames_skipped: usize,
}
