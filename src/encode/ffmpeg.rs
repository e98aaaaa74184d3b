use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbaImage;
use tracing::{debug, warn};

use crate::encode::sink::{SinkConfig, VideoSink};
use crate::error::{Error, Result};

/// Sink that spawns the system `ffmpeg` and streams raw RGBA frames to its
/// stdin, producing an H.264 MP4.
pub struct FfmpegSink {
    program: PathBuf,
    out_path: PathBuf,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: Option<SinkConfig>,
}

impl FfmpegSink {
    pub fn new(program: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            out_path: out_path.into(),
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
        }
    }

    fn reap(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                debug!("ffmpeg kill failed (already exited?): {err}");
            }
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        self.cfg = None;
    }
}

impl VideoSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> Result<()> {
        if cfg.fps == 0 {
            return Err(Error::Encoder("fps must be non-zero".into()));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(Error::Encoder("frame width/height must be non-zero".into()));
        }
        if cfg.width % 2 != 0 || cfg.height % 2 != 0 {
            return Err(Error::Encoder(
                "frame width/height must be even (required for yuv420p mp4 output)".into(),
            ));
        }

        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            // the output name is a staging path, so the container is explicit
            "-f",
            "mp4",
        ]);
        cmd.arg(&self.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Encoder(format!(
                "failed to spawn {} (is it installed and on PATH?): {e}",
                self.program.display()
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Encoder("failed to open ffmpeg stdin".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Encoder("failed to open ffmpeg stderr".into()))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        debug!(
            width = cfg.width,
            height = cfg.height,
            fps = cfg.fps,
            out = %self.out_path.display(),
            "ffmpeg started"
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        Ok(())
    }

    fn push_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| Error::Encoder("ffmpeg sink not started".into()))?;
        if frame.dimensions() != (cfg.width, cfg.height) {
            return Err(Error::Encoder(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                cfg.width,
                cfg.height
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Error::Encoder("ffmpeg sink is already finalized".into()));
        };
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| Error::Encoder(format!("failed to write frame to ffmpeg stdin: {e}")))
    }

    fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| Error::Encoder("ffmpeg sink not started".into()))?;
        let status = child
            .wait()
            .map_err(|e| Error::Encoder(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Encoder("ffmpeg stderr drain thread panicked".into()))?
                .map_err(|e| Error::Encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        self.cfg = None;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(Error::Encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn abort(&mut self) {
        if self.child.is_some() {
            warn!(out = %self.out_path.display(), "aborting ffmpeg stream");
        }
        self.reap();
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.reap();
        }
    }
}

/// Return `true` when `program` can be invoked (e.g. `ffmpeg` on `PATH`).
pub fn is_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
