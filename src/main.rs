use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use photo_booth::camera::{CuePlayer, DirectoryFrameSource, SilentCue, TerminalBell};
use photo_booth::config::{CaptureMode, Configuration, CueKind};
use photo_booth::encode::{BoomerangEncoder, StopMotionEncoder};
use photo_booth::events::{SessionEvent, shot_paths};
use photo_booth::processing::resample::Resampler;
use photo_booth::processing::slots::LayoutKind;
use photo_booth::storage::DirectoryShotStore;
use photo_booth::tasks::artifacts::{ArtifactOutcome, produce_artifacts, render_composite};
use photo_booth::tasks::session::CaptureSession;

#[derive(Debug, Parser)]
#[command(name = "photo-booth", version, about = "Capture-to-artifact photo booth")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one capture session and produce its artifacts
    Session {
        /// Path to YAML config
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
    /// Compose existing photos into a print
    Compose {
        #[arg(long, default_value = "grid")]
        layout: LayoutKind,
        /// Transparent PNG drawn over the print
        #[arg(long, value_name = "PNG")]
        overlay: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        #[arg(value_name = "PHOTO", required = true)]
        photos: Vec<PathBuf>,
    },
    /// Encode photos into a looping forward-then-back GIF
    Boomerang {
        /// Per-frame delay, e.g. "100ms"
        #[arg(long, value_parser = humantime::parse_duration, default_value = "100ms")]
        delay: Duration,
        #[arg(long, default_value_t = photo_booth::encode::boomerang::DEFAULT_TARGET_WIDTH)]
        width: u32,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        #[arg(value_name = "PHOTO", required = true)]
        photos: Vec<PathBuf>,
    },
    /// Encode photos into a choppy looped MP4 through ffmpeg
    StopMotion {
        #[arg(long, default_value_t = photo_booth::encode::stop_motion::DEFAULT_FPS)]
        fps: u32,
        #[arg(long, default_value_t = photo_booth::encode::stop_motion::DEFAULT_REPEAT)]
        repeat: u32,
        #[arg(long, default_value_t = photo_booth::encode::stop_motion::DEFAULT_TARGET_WIDTH)]
        width: u32,
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: PathBuf,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        #[arg(value_name = "PHOTO", required = true)]
        photos: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    match Args::parse().command {
        Command::Session { config } => {
            let cfg = Configuration::from_yaml_file(&config)
                .with_context(|| {
                    format!("failed to load configuration from {}", config.display())
                })?
                .validated()
                .context("invalid configuration values")?;
            tracing::debug!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);
            match cfg.cue {
                CueKind::Bell => run_session(cfg, TerminalBell, cancel).await,
                CueKind::Silent => run_session(cfg, SilentCue, cancel).await,
            }
        }
        Command::Compose {
            layout,
            overlay,
            out,
            photos,
        } => {
            tokio::task::spawn_blocking(move || compose_files(&photos, layout, overlay.as_deref(), &out))
                .await
                .context("compose task panicked")?
        }
        Command::Boomerang {
            delay,
            width,
            out,
            photos,
        } => {
            let report = tokio::task::spawn_blocking(move || {
                BoomerangEncoder::new(Resampler::default(), width).encode(&photos, delay, &out, &cancel)
            })
            .await
            .context("boomerang task panicked")??;
            println!("{}", report.path.display());
            Ok(())
        }
        Command::StopMotion {
            fps,
            repeat,
            width,
            ffmpeg,
            out,
            photos,
        } => {
            let encoder = StopMotionEncoder::new(Resampler::default())
                .with_fps(fps)
                .with_repeat(repeat)
                .with_target_width(width)
                .with_ffmpeg(ffmpeg);
            let report = tokio::task::spawn_blocking(move || encoder.encode(&photos, &out, &cancel))
                .await
                .context("stop-motion task panicked")??;
            match report {
                Some(report) => println!("{}", report.path.display()),
                None => tracing::info!("no photos given; nothing written"),
            }
            Ok(())
        }
    }
}

fn compose_files(
    photos: &[PathBuf],
    layout: LayoutKind,
    overlay: Option<&Path>,
    out: &Path,
) -> Result<()> {
    let mut cfg = Configuration::default();
    cfg.layout.kind = layout;
    cfg.layout.frame_overlay = overlay.map(Path::to_path_buf);
    let path = render_composite(photos, &cfg, out)?;
    println!("{}", path.display());
    Ok(())
}

async fn run_session<C: CuePlayer>(cfg: Configuration, cue: C, cancel: CancellationToken) -> Result<()> {
    let session_dir = cfg
        .output_directory
        .join(Local::now().format("%Y%m%d-%H%M%S").to_string());
    std::fs::create_dir_all(&session_dir)
        .with_context(|| format!("failed to create {}", session_dir.display()))?;
    tracing::info!(dir = %session_dir.display(), "session directory ready");

    let source = DirectoryFrameSource::new(&cfg.frame_source.directory);
    let store = DirectoryShotStore::new(&session_dir);
    let (session, mut events) = CaptureSession::new(source, cue, store);
    let shutdown = cancel.child_token();
    let (handle, task) = session
        .with_retry_backoff(cfg.shutter_retry_backoff)
        .spawn(shutdown.clone());

    // each line on stdin is one button press; a plain thread so a pending
    // read never holds up runtime shutdown
    let (press_tx, mut press_rx) = mpsc::channel::<()>(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if let Err(err) = line {
                tracing::warn!("stdin watcher failed: {err}");
                break;
            }
            if press_tx.blocking_send(()).is_err() {
                break;
            }
        }
    });

    let total = cfg.session.target_shot_count;
    if cfg.session.mode == CaptureMode::Manual {
        println!("Press Enter for each of the {total} shots");
    }
    handle.start(cfg.session.clone()).await?;
    let started = Instant::now();

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = handle.stop().await;
                break Ok(None);
            }
            Some(()) = press_rx.recv() => handle.trigger().await?,
            event = events.recv() => match event {
                Some(SessionEvent::StateChanged(state)) => {
                    tracing::debug!(status = state.status_text(), ?state, "session state");
                }
                Some(SessionEvent::CountdownTick { shot, remaining }) => {
                    println!("Get Ready: {remaining}  (shot {}/{total})", shot + 1);
                }
                Some(SessionEvent::ShotCaptured(shot)) => {
                    println!("Captured {}", shot.path.display());
                }
                Some(SessionEvent::Completed(shots)) => break Ok(Some(shots)),
                Some(SessionEvent::Aborted(err)) => break Err(err),
                None => break Ok(None),
            },
        }
    };
    shutdown.cancel();
    if let Err(err) = task.await {
        tracing::warn!("capture session task failed: {err}");
    }

    let shots = match outcome {
        Ok(Some(shots)) => shots,
        Ok(None) => {
            tracing::info!("session cancelled; no artifacts produced");
            return Ok(());
        }
        Err(err) => bail!("session aborted, please retake: {err}"),
    };
    tracing::info!(
        shots = shots.len(),
        elapsed = %humantime::format_duration(Duration::from_secs(started.elapsed().as_secs())),
        "capture finished"
    );

    let report = produce_artifacts(shot_paths(&shots), &cfg, &session_dir, &cancel)
        .await
        .context("failed to produce the print")?;
    println!("Print: {}", report.composite.display());
    for (name, outcome) in [("Boomerang", &report.boomerang), ("Stop-motion", &report.stop_motion)] {
        match outcome {
            ArtifactOutcome::Written(r) => println!("{name}: {}", r.path.display()),
            ArtifactOutcome::Skipped => println!("{name}: skipped"),
            ArtifactOutcome::Failed(err) => println!("{name}: failed ({err})"),
        }
    }
    Ok(())
}
