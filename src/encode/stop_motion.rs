use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::encode::EncodeReport;
use crate::encode::ffmpeg::FfmpegSink;
use crate::encode::sink::{SinkConfig, VideoSink};
use crate::error::{Error, Result};
use crate::processing::resample::Resampler;
use crate::processing::resize::fill_crop;
use crate::storage::StagedOutput;

pub const DEFAULT_TARGET_WIDTH: u32 = 1080;
/// Deliberately choppy.
pub const DEFAULT_FPS: u32 = 3;
pub const DEFAULT_REPEAT: u32 = 3;

/// Source indices for `len` photos played `repeat` times back to back.
pub fn repeated_sequence(len: usize, repeat: u32) -> Vec<usize> {
    (0..repeat.max(1) as usize)
        .flat_map(|_| 0..len)
        .collect()
}

/// Turns a short photo sequence into a looped low-frame-rate video.
#[derive(Debug, Clone)]
pub struct StopMotionEncoder {
    resampler: Resampler,
    target_width: u32,
    fps: u32,
    repeat: u32,
    ffmpeg: PathBuf,
}

impl Default for StopMotionEncoder {
    fn default() -> Self {
        Self::new(Resampler::default())
    }
}

impl StopMotionEncoder {
    pub fn new(resampler: Resampler) -> Self {
        Self {
            resampler,
            target_width: DEFAULT_TARGET_WIDTH,
            fps: DEFAULT_FPS,
            repeat: DEFAULT_REPEAT,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_target_width(mut self, width: u32) -> Self {
        self.target_width = width.max(2);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    pub fn with_ffmpeg(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg = program.into();
        self
    }

    /// Encodes `photos` into an MP4 at `output`.
    ///
    /// Returns `Ok(None)` without touching the filesystem when there are no
    /// photos. The file only appears under `output` once ffmpeg finished.
    #[instrument(skip_all, fields(output = %output.display(), photos = photos.len()))]
    pub fn encode(
        &self,
        photos: &[PathBuf],
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<EncodeReport>> {
        if photos.is_empty() {
            info!("no photos; skipping stop-motion video");
            return Ok(None);
        }
        let staged = StagedOutput::new(output)?;
        let mut sink = FfmpegSink::new(&self.ffmpeg, staged.temp_path());
        let (written, skipped) = self.encode_into(photos, &mut sink, cancel)?;
        let path = staged.commit()?;
        info!(written, skipped, "stop-motion video encoded");
        Ok(Some(EncodeReport {
            path,
            frames_written: written,
            frames_skipped: skipped,
        }))
    }

    /// Streams the repeated sequence into `sink` and returns the number of
    /// frames written and skipped. The sink is aborted on any failure.
    pub fn encode_into<S: VideoSink>(
        &self,
        photos: &[PathBuf],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize)> {
        match self.stream(photos, sink, cancel) {
            Ok(counts) => Ok(counts),
            Err(err) => {
                sink.abort();
                Err(err)
            }
        }
    }

    fn stream<S: VideoSink>(
        &self,
        photos: &[PathBuf],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize)> {
        let mut failed: HashSet<usize> = HashSet::new();
        let mut frame_size: Option<(u32, u32)> = None;
        let mut written = 0usize;
        let mut skipped = 0usize;

        for index in repeated_sequence(photos.len(), self.repeat) {
            if cancel.is_cancelled() {
                info!(written, "stop-motion encode cancelled");
                return Err(Error::Cancelled);
            }
            if failed.contains(&index) {
                skipped += 1;
                continue;
            }
            let path = &photos[index];
            let frame = match self.resampler.resample(path, self.target_width) {
                Ok(img) => img,
                Err(err) => {
                    warn!(index, path = %path.display(), "skipping stop-motion frame: {err}");
                    failed.insert(index);
                    skipped += 1;
                    continue;
                }
            };

            let (w, h) = match frame_size {
                Some(size) => size,
                None => {
                    // yuv420p needs even dimensions
                    let (w, h) = frame.dimensions();
                    let size = ((w & !1).max(2), (h & !1).max(2));
                    sink.begin(SinkConfig {
                        width: size.0,
                        height: size.1,
                        fps: self.fps,
                    })?;
                    frame_size = Some(size);
                    size
                }
            };
            let frame = if frame.dimensions() == (w, h) {
                frame
            } else {
                match fill_crop(&frame, w, h) {
                    Ok(cropped) => cropped,
                    Err(err) => {
                        warn!(index, path = %path.display(), "skipping stop-motion frame: {err:#}");
                        failed.insert(index);
                        skipped += 1;
                        continue;
                    }
                }
            };
            sink.push_frame(&frame)?;
            drop(frame);
            written += 1;
            debug!(index, written, "stop-motion frame written");
        }

        if frame_size.is_none() {
            return Err(Error::NoUsableFrames {
                attempted: photos.len(),
            });
        }
        sink.finish()?;
        Ok((written, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_repeats_in_order() {
        assert_eq!(repeated_sequence(3, 3), vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
        assert_eq!(repeated_sequence(2, 0), vec![0, 1]);
        assert!(repeated_sequence(0, 3).is_empty());
    }

    #[test]
    fn empty_input_returns_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.mp4");
        let result = StopMotionEncoder::default()
            .with_ffmpeg("/no/such/ffmpeg")
            .encode(&[], &out, &CancellationToken::new())
            .unwrap();
        assert!(result.is_none());
        assert!(!out.exists());
    }
}
