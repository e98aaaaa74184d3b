use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::encode::EncodeReport;
use crate::error::{Error, Result};
use crate::processing::resample::Resampler;
use crate::processing::resize::fill_crop;
use crate::storage::{finish_writer, StagedOutput};

pub const DEFAULT_TARGET_WIDTH: u32 = 720;
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);
/// NeuQuant sampling speed handed to the GIF encoder (1 = best, 30 = fastest).
const QUANTIZER_SPEED: i32 = 10;

/// Playback order for `len` source frames: every frame forward, then the inner
/// frames backwards so neither turnaround shows the same frame twice.
pub fn playback_order(len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if len > 2 {
        order.extend((1..len - 1).rev());
    }
    order
}

/// Encodes a forward-then-reverse loop as an endlessly repeating GIF.
#[derive(Debug, Clone)]
pub struct BoomerangEncoder {
    resampler: Resampler,
    target_width: u32,
}

impl Default for BoomerangEncoder {
    fn default() -> Self {
        Self::new(Resampler::default(), DEFAULT_TARGET_WIDTH)
    }
}

impl BoomerangEncoder {
    pub fn new(resampler: Resampler, target_width: u32) -> Self {
        Self {
            resampler,
            target_width: target_width.max(1),
        }
    }

    /// Streams the boomerang sequence of `photos` into `output`.
    ///
    /// Frames that fail to decode are logged and skipped. The output only
    /// appears once the whole loop is written; on failure or cancellation no
    /// file is left at `output`.
    #[instrument(skip_all, fields(output = %output.display(), photos = photos.len()))]
    pub fn encode(
        &self,
        photos: &[PathBuf],
        frame_delay: Duration,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<EncodeReport> {
        if photos.is_empty() {
            return Err(Error::EmptyInput);
        }

        let staged = StagedOutput::new(output)?;
        let mut writer = staged.create()?;
        let delay_ms = u32::try_from(frame_delay.as_millis()).unwrap_or(u32::MAX);
        let delay = Delay::from_numer_denom_ms(delay_ms, 1);

        let mut failed: HashSet<usize> = HashSet::new();
        let mut frame_size: Option<(u32, u32)> = None;
        let mut written = 0usize;
        let mut skipped = 0usize;
        {
            let mut encoder = GifEncoder::new_with_speed(&mut writer, QUANTIZER_SPEED);
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|err| write_error(output, err))?;

            for index in playback_order(photos.len()) {
                if cancel.is_cancelled() {
                    info!(written, "boomerang encode cancelled");
                    return Err(Error::Cancelled);
                }
                if failed.contains(&index) {
                    skipped += 1;
                    continue;
                }
                let path = &photos[index];
                let resampled = match self.resampler.resample(path, self.target_width) {
                    Ok(img) => img,
                    Err(err) => {
                        warn!(index, path = %path.display(), "skipping boomerang frame: {err}");
                        failed.insert(index);
                        skipped += 1;
                        continue;
                    }
                };
                let (w, h) = *frame_size.get_or_insert(resampled.dimensions());
                let rgba = if resampled.dimensions() == (w, h) {
                    resampled
                } else {
                    match fill_crop(&resampled, w, h) {
                        Ok(img) => img,
                        Err(err) => {
                            warn!(index, path = %path.display(), "skipping boomerang frame: {err:#}");
                            failed.insert(index);
                            skipped += 1;
                            continue;
                        }
                    }
                };
                // the frame is consumed here and released before the next decode
                encoder
                    .encode_frame(Frame::from_parts(rgba, 0, 0, delay))
                    .map_err(|err| write_error(output, err))?;
                written += 1;
                debug!(index, written, "boomerang frame appended");
            }
        }

        if written == 0 {
            return Err(Error::NoUsableFrames {
                attempted: photos.len(),
            });
        }
        finish_writer(writer, staged.temp_path())?;
        let path = staged.commit()?;
        info!(written, skipped, "boomerang encoded");
        Ok(EncodeReport {
            path,
            frames_written: written,
            frames_skipped: skipped,
        })
    }
}

fn write_error(output: &Path, err: ImageError) -> Error {
    match err {
        ImageError::IoError(source) => Error::EncodeWriteFailure {
            path: output.to_path_buf(),
            source,
        },
        other => Error::Encoder(other.to_string()),
    }
}
