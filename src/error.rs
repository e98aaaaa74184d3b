use std::path::PathBuf;

use thiserror::Error;

/// Library error type for capture, layout and encode operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The frame source could not deliver a frame, even after the single retry.
    #[error("frame source unavailable: {0}")]
    FrameSourceUnavailable(String),

    /// A single image could not be decoded or resampled.
    #[error("failed to decode {}: {reason}", path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    /// The layout name is not one of the known layout kinds.
    #[error("unknown layout kind '{0}', expected one of: grid, strip")]
    UnknownLayoutKind(String),

    /// The encoder was given no frames at all.
    #[error("no input frames")]
    EmptyInput,

    /// Frames were supplied but none of them could be decoded.
    #[error("none of the {attempted} input frames could be decoded")]
    NoUsableFrames { attempted: usize },

    /// Writing or finalizing an output artifact failed.
    #[error("failed to write {}: {source}", path.display())]
    EncodeWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external video encoder rejected the stream.
    #[error("video encoder failed: {0}")]
    Encoder(String),

    /// Persisting a captured shot failed.
    #[error("failed to store shot {index}: {reason}")]
    Storage { index: usize, reason: String },

    /// A session was started while another one is still running.
    #[error("a capture session is already in progress")]
    SessionBusy,

    /// The session controller task is gone.
    #[error("capture session controller has shut down")]
    SessionClosed,

    /// The session configuration violates an invariant.
    #[error("invalid session configuration: {0}")]
    InvalidSessionConfig(String),

    /// The operation was cancelled before it finished.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
