//! Peer connection abstraction.
//!
//! The session only talks to peers through [`PeerConnection`] and
//! [`PeerConnectionFactory`]. Asynchronous peer callbacks (local candidates,
//! connection state, remote tracks) are pushed into a [`PeerEventSender`] so
//! that the session consumes them one at a time.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;
use crate::ice::IceServerConfig;

pub mod connection;

pub use connection::*;

/// Media kind of a transceiver or track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Name used on SDP `m=` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Transceiver direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverDirection {
    Sendrecv,
    Sendonly,
    Recvonly,
    Inactive,
}

/// Aggregate peer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// `failed` and `closed` end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// Locally gathered ICE candidate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceCandidate {
    /// Candidate attribute value, without the `a=` prefix
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: &str, sdp_mline_index: u16) -> Self {
        Self {
            candidate: candidate.to_string(),
            sdp_mid: Some(sdp_mline_index.to_string()),
            sdp_mline_index: Some(sdp_mline_index),
        }
    }
}

/// A remote track delivered by the peer connection.
#[derive(Clone)]
pub struct TrackEvent {
    pub kind: MediaKind,
    pub track_id: String,
    /// Media stream ids the track belongs to
    pub stream_ids: Vec<String>,
    /// RTP reader, when the peer implementation exposes one
    pub remote: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for TrackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackEvent")
            .field("kind", &self.kind)
            .field("track_id", &self.track_id)
            .field("stream_ids", &self.stream_ids)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

/// Events raised by a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    ConnectionStateChanged(ConnectionState),
    Track(TrackEvent),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Operations the session needs from a peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_transceiver(&self, kind: MediaKind, direction: TransceiverDirection) -> Result<()>;

    /// Create an SDP offer and return its text.
    async fn create_offer(&self) -> Result<String>;

    async fn set_local_description(&self, offer_sdp: &str) -> Result<()>;

    async fn set_remote_description(&self, answer_sdp: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a peer connection that reports its callbacks on `events`.
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>>;
}
