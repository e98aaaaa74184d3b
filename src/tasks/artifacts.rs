use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::Configuration;
use crate::encode::EncodeReport;
use crate::error::{Error, Result};
use crate::processing::compose::Compositor;
use crate::storage::save_image;

/// Result of one derived artifact.
#[derive(Debug)]
pub enum ArtifactOutcome {
    Written(EncodeReport),
    /// Turned off in the configuration or nothing to encode.
    Skipped,
    Failed(Error),
}

impl ArtifactOutcome {
    fn from_result(name: &str, result: Result<Option<EncodeReport>>) -> Self {
        match result {
            Ok(Some(report)) => {
                info!(
                    artifact = name,
                    path = %report.path.display(),
                    written = report.frames_written,
                    skipped = report.frames_skipped,
                    "artifact written"
                );
                Self::Written(report)
            }
            Ok(None) => Self::Skipped,
            Err(err) => {
                warn!(artifact = name, "artifact failed: {err}");
                Self::Failed(err)
            }
        }
    }
}

#[derive(Debug)]
pub struct ArtifactReport {
    pub composite: PathBuf,
    pub boomerang: ArtifactOutcome,
    pub stop_motion: ArtifactOutcome,
}

/// Builds the print composite from `shots`, decoding one shot at a time.
#[instrument(skip_all, fields(output = %output.display(), shots = shots.len()))]
pub fn render_composite(
    shots: &[PathBuf],
    config: &Configuration,
    output: &Path,
) -> Result<PathBuf> {
    let layout = &config.layout;
    let resampler = config.resampler();
    let mut compositor = Compositor::new(layout.kind, &layout.style());
    for (index, path) in shots.iter().enumerate().take(compositor.slot_count()) {
        let Some(slot) = compositor.targets(index).first().copied() else {
            continue;
        };
        let photo = resampler.resample_to_cover(path, slot.width, slot.height)?;
        compositor.place(index, &photo).map_err(|err| Error::DecodeFailure {
            path: path.clone(),
            reason: format!("{err:#}"),
        })?;
    }
    let overlay = match &layout.frame_overlay {
        Some(path) => Some(load_overlay(path)?),
        None => None,
    };
    let print = compositor
        .finish(overlay.as_ref())
        .map_err(|err| Error::DecodeFailure {
            path: output.to_path_buf(),
            reason: format!("{err:#}"),
        })?;
    save_image(&print, output)
}

fn load_overlay(path: &Path) -> Result<RgbaImage> {
    image::open(path)
        .with_context(|| format!("failed to open frame overlay {}", path.display()))
        .map(|img| img.into_rgba8())
        .map_err(|err| Error::DecodeFailure {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        })
}

/// Produces every artifact of a finished session inside `session_dir`.
///
/// The composite comes first and its failure is returned. The two animated
/// artifacts then run side by side on the blocking pool; their failures are
/// recorded in the report only.
pub async fn produce_artifacts(
    shots: Vec<PathBuf>,
    config: &Configuration,
    session_dir: &Path,
    cancel: &CancellationToken,
) -> Result<ArtifactReport> {
    if shots.is_empty() {
        return Err(Error::EmptyInput);
    }

    let composite_path = session_dir.join(&config.layout.output_name);
    let composite = {
        let shots = shots.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || render_composite(&shots, &config, &composite_path))
            .await
            .map_err(|err| Error::Encoder(format!("composite task failed: {err}")))??
    };
    info!(path = %composite.display(), "composite written");

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let boomerang_task = {
        let shots = shots.clone();
        let options = config.boomerang.clone();
        let encoder = config.boomerang_encoder();
        let output = session_dir.join(&options.output_name);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            if !options.enabled {
                return Ok(None);
            }
            encoder
                .encode(&shots, options.frame_delay, &output, &cancel)
                .map(Some)
        })
    };
    let stop_motion_task = {
        let enabled = config.stop_motion.enabled;
        let encoder = config.stop_motion_encoder();
        let output = session_dir.join(&config.stop_motion.output_name);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            if !enabled {
                return Ok(None);
            }
            encoder.encode(&shots, &output, &cancel)
        })
    };

    let (boomerang, stop_motion) = tokio::join!(boomerang_task, stop_motion_task);
    let flatten = |joined: std::result::Result<Result<Option<EncodeReport>>, tokio::task::JoinError>| {
        joined.unwrap_or_else(|err| Err(Error::Encoder(format!("encoder task failed: {err}"))))
    };

    Ok(ArtifactReport {
        composite,
        boomerang: ArtifactOutcome::from_result("boomerang", flatten(boomerang)),
        stop_motion: ArtifactOutcome::from_result("stop-motion", flatten(stop_motion)),
    })
}
