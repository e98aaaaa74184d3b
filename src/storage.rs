use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, RgbaImage};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const JPEG_QUALITY: u8 = 92;

/// Persists raw shots as they are captured.
pub trait ShotStore: Send + Sync + 'static {
    /// Writes shot `index` and returns where it landed.
    fn persist(&self, index: usize, frame: RgbaImage) -> Result<PathBuf>;
}

/// Stores shots as `shot-01.jpg`, `shot-02.jpg`, ... in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryShotStore {
    dir: PathBuf,
}

impl DirectoryShotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("shot-{:02}.jpg", index + 1))
    }
}

impl ShotStore for DirectoryShotStore {
    fn persist(&self, index: usize, frame: RgbaImage) -> Result<PathBuf> {
        let path = self.path_for(index);
        save_image(&frame, &path).map_err(|err| Error::Storage {
            index,
            reason: err.to_string(),
        })
    }
}

/// A temporary file next to `final_path` that only becomes visible under the
/// final name on [`StagedOutput::commit`]. Dropping it uncommitted removes the
/// temporary file.
#[derive(Debug)]
pub struct StagedOutput {
    final_path: PathBuf,
    temp_path: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub fn new(final_path: impl Into<PathBuf>) -> Result<Self> {
        let final_path = final_path.into();
        let file_name = final_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::EncodeWriteFailure {
                path: final_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "output path has no file name",
                ),
            })?;
        let parent = final_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|source| Error::EncodeWriteFailure {
            path: parent.to_path_buf(),
            source,
        })?;
        let temp_path = parent.join(format!(".{file_name}.part"));
        Ok(Self {
            final_path,
            temp_path,
            committed: false,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn create(&self) -> Result<BufWriter<File>> {
        let file = File::create(&self.temp_path).map_err(|source| Error::EncodeWriteFailure {
            path: self.temp_path.clone(),
            source,
        })?;
        Ok(BufWriter::new(file))
    }

    /// Atomically moves the finished temporary file to its final name.
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.temp_path, &self.final_path).map_err(|source| {
            Error::EncodeWriteFailure {
                path: self.final_path.clone(),
                source,
            }
        })?;
        self.committed = true;
        debug!(path = %self.final_path.display(), "output committed");
        Ok(self.final_path.clone())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.committed || !self.temp_path.exists() {
            return;
        }
        if let Err(err) = fs::remove_file(&self.temp_path) {
            warn!(path = %self.temp_path.display(), "failed to remove staged output: {err}");
        }
    }
}

/// Flushes a staged writer and syncs the file to disk.
pub fn finish_writer(mut writer: BufWriter<File>, path: &Path) -> Result<()> {
    let io_err = |source| Error::EncodeWriteFailure {
        path: path.to_path_buf(),
        source,
    };
    writer.flush().map_err(io_err)?;
    let file = writer.into_inner().map_err(|err| io_err(err.into_error()))?;
    file.sync_all().map_err(io_err)
}

/// Writes `image` to `path` as JPEG or PNG (picked from the extension,
/// PNG when unknown) through a staged file.
pub fn save_image(image: &RgbaImage, path: &Path) -> Result<PathBuf> {
    let staged = StagedOutput::new(path)?;
    let mut writer = staged.create()?;
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    let encoded = match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )
        }
        _ => PngEncoder::new(&mut writer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        ),
    };
    encoded.map_err(|err| Error::EncodeWriteFailure {
        path: path.to_path_buf(),
        source: std::io::Error::other(err),
    })?;
    finish_writer(writer, staged.temp_path())?;
    staged.commit()
}
