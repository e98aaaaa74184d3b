use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::{CuePlayer, FrameSource};
use crate::config::{CaptureMode, SessionConfig};
use crate::error::{Error, Result};
use crate::events::{RawShot, SessionEvent, SessionState};
use crate::storage::ShotStore;

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug)]
enum Command {
    Start {
        config: SessionConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Trigger,
    Stop,
}

/// Why the current session ended early.
enum Halt {
    Stopped,
    Failed(Error),
}

/// Cloneable control surface for a running capture session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Begins a session. Fails with [`Error::SessionBusy`] while another one
    /// is running and with [`Error::InvalidSessionConfig`] for bad parameters.
    pub async fn start(&self, config: SessionConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start { config, reply })
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// External shutter button. Only acted on while awaiting a trigger.
    pub async fn trigger(&self) -> Result<()> {
        self.commands
            .send(Command::Trigger)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Cancels the running session, discarding its shots. No-op when idle.
    pub async fn stop(&self) -> Result<()> {
        self.commands
            .send(Command::Stop)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

/// Drives countdowns, the shutter, retries and shot persistence for one
/// booth. Runs as a single task; every shot is captured sequentially.
pub struct CaptureSession<F, C, S> {
    source: F,
    cue: Arc<C>,
    store: Arc<S>,
    retry_backoff: Duration,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<F, C, S> CaptureSession<F, C, S>
where
    F: FrameSource,
    C: CuePlayer,
    S: ShotStore,
{
    pub fn new(source: F, cue: C, store: S) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Idle);
        let session = Self {
            source,
            cue: Arc::new(cue),
            store: Arc::new(store),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            state,
            events,
        };
        (session, events_rx)
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Spawns the session loop. The join handle yields the frame source back
    /// once `shutdown` fires or every handle is dropped.
    pub fn spawn(self, shutdown: CancellationToken) -> (SessionHandle, JoinHandle<F>) {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let handle = SessionHandle {
            commands: commands_tx,
            state: self.state.subscribe(),
        };
        let task = tokio::spawn(self.run(commands_rx, shutdown));
        (handle, task)
    }

    async fn run(self, commands: mpsc::Receiver<Command>, shutdown: CancellationToken) -> F {
        let mut actor = Actor {
            session: self,
            commands,
            shutdown,
        };
        loop {
            let command = select! {
                _ = actor.shutdown.cancelled() => break,
                command = actor.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            match command {
                Command::Start { config, reply } => {
                    if let Err(err) = config.validate() {
                        let _ = reply.send(Err(err));
                        continue;
                    }
                    let _ = reply.send(Ok(()));
                    actor.run_session(config).await;
                }
                Command::Trigger => debug!("trigger ignored; no session running"),
                Command::Stop => debug!("stop ignored; no session running"),
            }
        }
        debug!("capture session task exiting");
        actor.session.source
    }
}

struct Actor<F, C, S> {
    session: CaptureSession<F, C, S>,
    commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
}

impl<F, C, S> Actor<F, C, S>
where
    F: FrameSource,
    C: CuePlayer,
    S: ShotStore,
{
    async fn run_session(&mut self, config: SessionConfig) {
        info!(
            shots = config.target_shot_count,
            countdown = config.countdown_seconds,
            mode = ?config.mode,
            "session started"
        );
        let mut shots = Vec::with_capacity(config.target_shot_count);
        let outcome = match config.mode {
            CaptureMode::Auto => self.run_auto(&config, &mut shots).await,
            CaptureMode::Manual => self.run_manual(&config, &mut shots).await,
        };
        let outcome = match outcome {
            Ok(()) if self.stop_pending() => Err(Halt::Stopped),
            other => other,
        };
        match outcome {
            Ok(()) => {
                info!(shots = shots.len(), "session complete");
                self.set_state(SessionState::Complete);
                self.emit(SessionEvent::Completed(shots));
            }
            Err(Halt::Stopped) => {
                info!(discarded = shots.len(), "session stopped");
                self.set_state(SessionState::Idle);
            }
            Err(Halt::Failed(err)) => {
                warn!(captured = shots.len(), "session aborted: {err}");
                self.set_state(SessionState::Idle);
                self.emit(SessionEvent::Aborted(err));
            }
        }
    }

    async fn run_auto(
        &mut self,
        config: &SessionConfig,
        shots: &mut Vec<RawShot>,
    ) -> Result<(), Halt> {
        for shot in 0..config.target_shot_count {
            if shot > 0 {
                self.set_state(SessionState::PostShotPause { next_shot: shot });
                self.pause_until(Instant::now() + config.inter_shot_delay())
                    .await?;
            }
            self.countdown(shot, config.countdown_seconds).await?;
            let raw = self.capture(shot).await?;
            self.emit(SessionEvent::ShotCaptured(raw.clone()));
            shots.push(raw);
        }
        Ok(())
    }

    async fn run_manual(
        &mut self,
        config: &SessionConfig,
        shots: &mut Vec<RawShot>,
    ) -> Result<(), Halt> {
        for shot in 0..config.target_shot_count {
            self.set_state(SessionState::AwaitingTrigger { next_shot: shot });
            self.wait_for_trigger().await?;
            self.countdown(shot, config.countdown_seconds).await?;
            let raw = self.capture(shot).await?;
            self.emit(SessionEvent::ShotCaptured(raw.clone()));
            shots.push(raw);
        }
        Ok(())
    }

    /// Ticks once per second against a fixed deadline so slow consumers
    /// cannot stretch the countdown.
    async fn countdown(&mut self, shot: usize, seconds: u32) -> Result<(), Halt> {
        let started = Instant::now();
        for elapsed in 0..seconds {
            let remaining = seconds - elapsed;
            self.set_state(SessionState::Countdown { shot, remaining });
            self.emit(SessionEvent::CountdownTick { shot, remaining });
            self.play_cue(remaining);
            let deadline = started + Duration::from_secs(u64::from(elapsed + 1));
            self.pause_until(deadline).await?;
        }
        Ok(())
    }

    /// Fires the shutter, retrying once after the backoff when the failure
    /// looks transient, then hands the frame to the shot store.
    async fn capture(&mut self, shot: usize) -> Result<RawShot, Halt> {
        let mut attempt = 1u32;
        loop {
            self.set_state(SessionState::Capturing { shot });
            let result = {
                let request = self.session.source.request_frame();
                tokio::pin!(request);
                loop {
                    select! {
                        _ = self.shutdown.cancelled() => return Err(Halt::Stopped),
                        result = &mut request => break result,
                        Some(command) = self.commands.recv() => refuse_while_busy(command)?,
                    }
                }
            };
            match result {
                Ok(frame) => {
                    let path = self.persist(shot, frame).await?;
                    debug!(shot, attempt, path = %path.display(), "shot captured");
                    return Ok(RawShot { index: shot, path });
                }
                Err(err) if err.is_transient() && attempt == 1 => {
                    warn!(shot, "shutter failed, retrying: {err}");
                    self.set_state(SessionState::RetryOrAbort { shot });
                    let backoff = self.session.retry_backoff;
                    self.pause_until(Instant::now() + backoff).await?;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(Halt::Failed(Error::FrameSourceUnavailable(format!(
                        "shot {} after {attempt} attempt(s): {err}",
                        shot + 1
                    ))));
                }
            }
        }
    }

    /// Hands the frame to the shot store on the blocking pool. A stop that
    /// arrives meanwhile wins once the write has finished.
    async fn persist(&mut self, shot: usize, frame: RgbaImage) -> Result<PathBuf, Halt> {
        let write = persist_blocking(Arc::clone(&self.session.store), shot, frame);
        tokio::pin!(write);
        let mut halted = None;
        let written = loop {
            select! {
                written = &mut write => break written,
                _ = self.shutdown.cancelled(), if halted.is_none() => halted = Some(Halt::Stopped),
                Some(command) = self.commands.recv(), if halted.is_none() => {
                    if let Err(halt) = refuse_while_busy(command) {
                        halted = Some(halt);
                    }
                }
            }
        };
        match halted {
            Some(halt) => Err(halt),
            None => written,
        }
    }

    /// Takes a stop that is already queued, so it is never overtaken by
    /// completion.
    fn stop_pending(&mut self) -> bool {
        if self.shutdown.is_cancelled() {
            return true;
        }
        while let Ok(command) = self.commands.try_recv() {
            if refuse_while_busy(command).is_err() {
                return true;
            }
        }
        false
    }

    /// Sleeps until `deadline` while still answering commands.
    async fn pause_until(&mut self, deadline: Instant) -> Result<(), Halt> {
        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);
        loop {
            select! {
                _ = &mut sleep => return Ok(()),
                _ = self.shutdown.cancelled() => return Err(Halt::Stopped),
                Some(command) = self.commands.recv() => refuse_while_busy(command)?,
            }
        }
    }

    async fn wait_for_trigger(&mut self) -> Result<(), Halt> {
        loop {
            select! {
                _ = self.shutdown.cancelled() => return Err(Halt::Stopped),
                command = self.commands.recv() => match command {
                    Some(Command::Trigger) => return Ok(()),
                    Some(other) => refuse_while_busy(other)?,
                    // nobody left to press the button
                    None => return Err(Halt::Stopped),
                },
            }
        }
    }

    fn play_cue(&self, remaining: u32) {
        let cue = Arc::clone(&self.session.cue);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = cue.tick(remaining) {
                debug!(remaining, "countdown cue failed: {err:#}");
            }
        });
    }

    fn set_state(&self, state: SessionState) {
        self.session.state.send_replace(state);
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        if self.session.events.send(event).is_err() {
            debug!("session event dropped; no listener");
        }
    }
}

async fn persist_blocking<S: ShotStore>(
    store: Arc<S>,
    shot: usize,
    frame: RgbaImage,
) -> Result<PathBuf, Halt> {
    tokio::task::spawn_blocking(move || store.persist(shot, frame))
        .await
        .map_err(|err| {
            Halt::Failed(Error::Storage {
                index: shot,
                reason: err.to_string(),
            })
        })?
        .map_err(Halt::Failed)
}

fn refuse_while_busy(command: Command) -> Result<(), Halt> {
    match command {
        Command::Stop => Err(Halt::Stopped),
        Command::Start { reply, .. } => {
            let _ = reply.send(Err(Error::SessionBusy));
            Ok(())
        }
        Command::Trigger => {
            debug!("trigger ignored while busy");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{FrameSourceError, SilentCue};
    use image::Rgba;

    struct SolidSource;

    impl FrameSource for SolidSource {
        async fn request_frame(&mut self) -> std::result::Result<RgbaImage, FrameSourceError> {
            Ok(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255])))
        }
    }

    struct NullStore;

    impl ShotStore for NullStore {
        fn persist(&self, index: usize, _frame: RgbaImage) -> Result<PathBuf> {
            Ok(PathBuf::from(format!("shot-{index}")))
        }
    }

    fn config(mode: CaptureMode) -> SessionConfig {
        SessionConfig {
            target_shot_count: 2,
            countdown_seconds: 1,
            mode,
            inter_shot_delay_seconds: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_is_rejected_without_state_change() {
        let (session, _events) = CaptureSession::new(SolidSource, SilentCue, NullStore);
        let (handle, _task) = session.spawn(CancellationToken::new());
        let mut bad = config(CaptureMode::Auto);
        bad.target_shot_count = 0;
        let err = handle.start(bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSessionConfig(_)));
        assert_eq!(handle.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_the_frame_source() {
        let (session, _events) = CaptureSession::new(SolidSource, SilentCue, NullStore);
        let shutdown = CancellationToken::new();
        let (handle, task) = session.spawn(shutdown.clone());
        handle.start(config(CaptureMode::Manual)).await.unwrap();
        shutdown.cancel();
        let _source: SolidSource = task.await.unwrap();
        assert!(matches!(handle.trigger().await, Err(Error::SessionClosed)));
    }
}
