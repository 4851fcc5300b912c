//! Error type shared by the probe, signaling and session layers.
//!
//! The `Display` text of each variant is exactly the message handed to the
//! session's error callback, so callers can match on it or show it as-is.

use thiserror::Error;

/// Errors produced while negotiating or running a WHEP session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WhepError {
    /// A codec probe could not run at all (startup is aborted).
    #[error("{0}")]
    CodecProbe(String),

    /// The server has no publisher for this stream yet (HTTP 404).
    #[error("stream not found")]
    StreamNotFound,

    /// The server rejected the offer (HTTP 400) with its own message.
    #[error("{0}")]
    ServerRejected(String),

    /// Unexpected HTTP status.
    #[error("bad status code {0}")]
    BadStatus(u16),

    /// The peer connection reached `failed` or `closed`.
    #[error("peer connection closed")]
    PeerConnectionClosed,

    /// HTTP I/O failure or a failed peer-connection operation.
    #[error("{0}")]
    Transport(String),

    /// The server answered with something we cannot use.
    #[error("{0}")]
    Signaling(String),

    /// Invalid or incomplete configuration.
    #[error("{0}")]
    Config(String),

    /// The session was closed while the operation was in flight.
    #[error("closed")]
    Closed,
}

/// Coarse classification of [`WhepError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CodecProbeFailure,
    StreamNotFound,
    ServerRejected,
    TransportFailure,
    SignalingError,
    Configuration,
    Closed,
}

impl WhepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WhepError::CodecProbe(_) => ErrorKind::CodecProbeFailure,
            WhepError::StreamNotFound => ErrorKind::StreamNotFound,
            WhepError::ServerRejected(_) => ErrorKind::ServerRejected,
            WhepError::BadStatus(_) | WhepError::PeerConnectionClosed | WhepError::Transport(_) => {
                ErrorKind::TransportFailure
            }
            WhepError::Signaling(_) => ErrorKind::SignalingError,
            WhepError::Config(_) => ErrorKind::Configuration,
            WhepError::Closed => ErrorKind::Closed,
        }
    }

    /// True when the failure only means "nobody is publishing yet".
    pub fn is_stream_not_found(&self) -> bool {
        matches!(self, WhepError::StreamNotFound)
    }
}

pub type Result<T> = std::result::Result<T, WhepError>;
