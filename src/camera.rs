use std::ffi::OsStr;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Why a frame request produced no image.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameSourceError {
    /// The device is busy or not ready yet; worth one more try.
    #[error("frame source temporarily unavailable: {0}")]
    Unavailable(String),
    /// The device answered but delivered no image data.
    #[error("frame source returned no data")]
    Empty,
    /// The device is gone or misconfigured; retrying will not help.
    #[error("frame source failed: {0}")]
    Failed(String),
}

impl FrameSourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Empty)
    }
}

/// A camera, or anything that can stand in for one.
///
/// The capture session owns its frame source exclusively and calls
/// `request_frame` once per shutter release.
pub trait FrameSource: Send + 'static {
    fn request_frame(
        &mut self,
    ) -> impl Future<Output = Result<RgbaImage, FrameSourceError>> + Send;
}

/// Best-effort countdown sound.
pub trait CuePlayer: Send + Sync + 'static {
    fn tick(&self, remaining: u32) -> Result<()>;
}

/// Rings the terminal bell on every countdown tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl CuePlayer for TerminalBell {
    fn tick(&self, _remaining: u32) -> Result<()> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

impl CuePlayer for SilentCue {
    fn tick(&self, _remaining: u32) -> Result<()> {
        Ok(())
    }
}

/// Replays the images of a directory (sorted by path, cycling) as camera
/// frames. Stands in for a tethered camera that drops files into a folder.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    root: PathBuf,
    next: usize,
}

impl DirectoryFrameSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!(root = %root.display(), "directory frame source ready");
        Self { root, next: 0 }
    }

    fn list(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| is_image(p))
            .collect();
        found.sort();
        found
    }
}

impl FrameSource for DirectoryFrameSource {
    async fn request_frame(&mut self) -> Result<RgbaImage, FrameSourceError> {
        if !self.root.is_dir() {
            return Err(FrameSourceError::Failed(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        let files = self.list();
        if files.is_empty() {
            return Err(FrameSourceError::Unavailable(format!(
                "no images in {}",
                self.root.display()
            )));
        }
        let path = files[self.next % files.len()].clone();
        self.next = self.next.wrapping_add(1);
        debug!(path = %path.display(), "replaying frame");
        let decoded = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|err| FrameSourceError::Unavailable(err.to_string()))?;
        match decoded {
            Ok(img) => Ok(img.into_rgba8()),
            Err(err) => {
                debug!("replayed frame failed to decode: {err}");
                Err(FrameSourceError::Empty)
            }
        }
    }
}

pub fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "webp"].contains(&e.as_str())
    )
}
