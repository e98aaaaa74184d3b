use std::path::PathBuf;

use crate::error::Error;

/// One captured still, identified by its position in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawShot {
    pub index: usize,
    pub path: PathBuf,
}

/// Observable state of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Counting down before shot `shot`; `remaining` seconds left.
    Countdown { shot: usize, remaining: u32 },
    Capturing { shot: usize },
    /// The first shutter attempt for `shot` failed; waiting to retry.
    RetryOrAbort { shot: usize },
    /// AUTO mode pause between shots.
    PostShotPause { next_shot: usize },
    /// MANUAL mode waiting for the next trigger.
    AwaitingTrigger { next_shot: usize },
    Complete,
}

impl SessionState {
    /// Text shown to the guest for this phase.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Countdown { .. } => "Get Ready",
            Self::Capturing { .. } | Self::RetryOrAbort { .. } => "Capturing",
            Self::PostShotPause { .. } => "Next Pose",
            Self::AwaitingTrigger { .. } => "Press to Capture",
            Self::Complete => "Done",
        }
    }

    /// Whether a session is between start and completion.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Complete)
    }
}

/// Emitted by the capture session for the UI layer.
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),
    CountdownTick { shot: usize, remaining: u32 },
    ShotCaptured(RawShot),
    /// The ordered shot list; sent once per session.
    Completed(Vec<RawShot>),
    /// The session gave up; the guest should retake.
    Aborted(Error),
}

/// Paths of `shots` in capture order.
pub fn shot_paths(shots: &[RawShot]) -> Vec<PathBuf> {
    shots.iter().map(|shot| shot.path.clone()).collect()
}
