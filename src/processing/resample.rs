use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{imageops, ImageError, ImageFormat, ImageReader, Limits, RgbaImage};
use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::processing::layout::{downscale_factor, resize_to_cover, resize_to_width};
use crate::processing::resize::resize_rgba;

/// Default ceiling for a single decode allocation (256 MiB).
pub const DEFAULT_MAX_DECODE_BYTES: u64 = 256 * 1024 * 1024;

/// Decodes photos into width-bounded RGBA copies.
///
/// A call holds one decoded raster at a time. The source is probed for its
/// bounds first so JPEGs can be decoded straight at a reduced DCT scale; the
/// result is then resized to exactly the requested width. A decode that would
/// exceed `max_decode_bytes` is retried once at twice the downscale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    max_decode_bytes: u64,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECODE_BYTES)
    }
}

#[derive(Debug, Clone, Copy)]
struct Probe {
    width: u32,
    height: u32,
    format: Option<ImageFormat>,
    orientation: u16,
}

impl Probe {
    /// Width after EXIF orientation is applied.
    fn display_width(&self) -> u32 {
        if (5..=8).contains(&self.orientation) {
            self.height
        } else {
            self.width
        }
    }
}

enum DecodeAttempt {
    Decoded(RgbaImage),
    OverBudget { required: u64 },
}

impl Resampler {
    pub fn new(max_decode_bytes: u64) -> Self {
        Self {
            max_decode_bytes: max_decode_bytes.max(1),
        }
    }

    /// Decodes `path` and scales it to exactly `target_width` columns,
    /// keeping the aspect ratio.
    pub fn resample(&self, path: &Path, target_width: u32) -> Result<RgbaImage> {
        if target_width == 0 {
            return Err(decode_failure(path, "target width must be positive"));
        }
        let probe = probe(path)?;
        let factor = downscale_factor(probe.display_width(), target_width);

        let decoded = match self.decode_reduced(path, &probe, factor)? {
            DecodeAttempt::Decoded(img) => img,
            DecodeAttempt::OverBudget { required } => {
                warn!(
                    path = %path.display(),
                    factor,
                    required,
                    budget = self.max_decode_bytes,
                    "decode exceeds memory budget; retrying at a coarser scale"
                );
                match self.decode_reduced(path, &probe, factor * 2)? {
                    DecodeAttempt::Decoded(img) => img,
                    DecodeAttempt::OverBudget { required } => {
                        return Err(decode_failure(
                            path,
                            format!(
                                "decode needs {required} bytes, budget is {}",
                                self.max_decode_bytes
                            ),
                        ));
                    }
                }
            }
        };

        let oriented = apply_orientation(decoded, probe.orientation);
        let (w, h) = resize_to_width(target_width, oriented.width(), oriented.height());
        resize_rgba(&oriented, w, h).map_err(|err| decode_failure(path, format!("{err:#}")))
    }

    /// Decodes `path` just large enough to cover a `width`x`height` box.
    pub fn resample_to_cover(&self, path: &Path, width: u32, height: u32) -> Result<RgbaImage> {
        let probe = probe(path)?;
        let (display_w, display_h) = if (5..=8).contains(&probe.orientation) {
            (probe.height, probe.width)
        } else {
            (probe.width, probe.height)
        };
        let (cover_w, _) = resize_to_cover(width, height, display_w, display_h);
        self.resample(path, cover_w.max(1))
    }

    fn decode_reduced(&self, path: &Path, probe: &Probe, factor: u32) -> Result<DecodeAttempt> {
        if matches!(probe.format, Some(ImageFormat::Jpeg)) {
            match self.decode_jpeg_scaled(path, probe, factor) {
                Ok(attempt) => return Ok(attempt),
                Err(err) => {
                    debug!(
                        "failed to decode JPEG {} with scaled fast path: {err:#}; falling back",
                        path.display()
                    );
                }
            }
        }
        self.decode_full(path, probe)
    }

    fn decode_full(&self, path: &Path, probe: &Probe) -> Result<DecodeAttempt> {
        let required = u64::from(probe.width) * u64::from(probe.height) * 4;
        if required > self.max_decode_bytes {
            return Ok(DecodeAttempt::OverBudget { required });
        }
        let mut reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|err| decode_failure(path, err))?;
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_decode_bytes);
        reader.limits(limits);
        match reader.decode() {
            Ok(img) => Ok(DecodeAttempt::Decoded(img.into_rgba8())),
            Err(ImageError::Limits(_)) => Ok(DecodeAttempt::OverBudget { required }),
            Err(err) => Err(decode_failure(path, err)),
        }
    }

    fn decode_jpeg_scaled(
        &self,
        path: &Path,
        probe: &Probe,
        factor: u32,
    ) -> anyhow::Result<DecodeAttempt> {
        use anyhow::anyhow;
        use jpeg_decoder::Error as JpegError;

        let file = File::open(path)?;
        let mut decoder = JpegDecoder::new(BufReader::new(file));
        let request_w = probe.width.div_ceil(factor).clamp(1, u16::MAX as u32) as u16;
        let request_h = probe.height.div_ceil(factor).clamp(1, u16::MAX as u32) as u16;
        let (out_w, out_h) = decoder
            .scale(request_w, request_h)
            .map_err(|err| match err {
                JpegError::Unsupported(feature) => anyhow!("unsupported JPEG feature: {feature:?}"),
                other => anyhow!(other),
            })?;
        let required = u64::from(out_w) * u64::from(out_h) * 4;
        if required > self.max_decode_bytes {
            return Ok(DecodeAttempt::OverBudget { required });
        }

        let pixels = decoder.decode().map_err(|err| match err {
            JpegError::Unsupported(feature) => anyhow!("unsupported JPEG feature: {feature:?}"),
            other => anyhow!(other),
        })?;
        let info = decoder
            .info()
            .ok_or_else(|| anyhow!("missing image info while decoding JPEG {}", path.display()))?;
        let width = info.width as u32;
        let height = info.height as u32;

        let rgba = match info.pixel_format {
            PixelFormat::RGB24 => {
                let mut rgba = Vec::with_capacity(pixels.len() / 3 * 4);
                for chunk in pixels.chunks_exact(3) {
                    rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
                }
                rgba
            }
            PixelFormat::L8 => {
                let mut rgba = Vec::with_capacity(pixels.len() * 4);
                for &v in &pixels {
                    rgba.extend_from_slice(&[v, v, v, 255]);
                }
                rgba
            }
            PixelFormat::CMYK32 => {
                let mut rgba = Vec::with_capacity(pixels.len());
                for chunk in pixels.chunks_exact(4) {
                    let k = chunk[3] as f32 / 255.0;
                    let channel = |v: u8| {
                        let c = (v as f32 / 255.0) * (1.0 - k) + k;
                        ((1.0 - c) * 255.0).round().clamp(0.0, 255.0) as u8
                    };
                    rgba.extend_from_slice(&[channel(chunk[0]), channel(chunk[1]), channel(chunk[2]), 255]);
                }
                rgba
            }
            PixelFormat::L16 => {
                anyhow::bail!("16-bit grayscale JPEGs are not supported by the scaled decoder");
            }
        };
        drop(pixels);

        let image = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| anyhow!("failed to construct RGBA image for {}", path.display()))?;
        debug!(
            path = %path.display(),
            factor,
            width,
            height,
            "decoded JPEG at reduced scale"
        );
        Ok(DecodeAttempt::Decoded(image))
    }
}

/// Reads only the header of `path` for its bounds and format.
fn probe(path: &Path) -> Result<Probe> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|err| decode_failure(path, err))?;
    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|err| decode_failure(path, err))?;
    if width == 0 || height == 0 {
        return Err(decode_failure(path, "image has no pixels"));
    }
    let orientation = read_orientation(path).unwrap_or(1);
    Ok(Probe {
        width,
        height,
        format,
        orientation,
    })
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!("exif orientation {} for {}", o, path.display());
    Some(o)
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        // transpose
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        // transverse
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn decode_failure(path: &Path, reason: impl Display) -> Error {
    Error::DecodeFailure {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
