//! webrtc-rs backed peer connection.
//!
//! Wraps RTCPeerConnection and forwards its callbacks into the session's
//! event channel.

use std::sync::Arc;

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::{
    ConnectionState, IceCandidate, MediaKind, PeerConnection, PeerConnectionFactory, PeerEvent,
    PeerEventSender, TrackEvent, TransceiverDirection,
};
use crate::error::{Result, WhepError};
use crate::ice::IceServerConfig;

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(s: RTCPeerConnectionState) -> Self {
        match s {
            RTCPeerConnectionState::New => ConnectionState::New,
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::New,
        }
    }
}

impl From<TransceiverDirection> for RTCRtpTransceiverDirection {
    fn from(d: TransceiverDirection) -> Self {
        match d {
            TransceiverDirection::Sendrecv => RTCRtpTransceiverDirection::Sendrecv,
            TransceiverDirection::Sendonly => RTCRtpTransceiverDirection::Sendonly,
            TransceiverDirection::Recvonly => RTCRtpTransceiverDirection::Recvonly,
            TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
        }
    }
}

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

/// Creates webrtc-rs peer connections with the default codecs and interceptors.
pub struct RtcPeerFactory {
    api: API,
}

impl RtcPeerFactory {
    pub fn new() -> Result<Self> {
        // Create media engine and register default codecs (audio + video)
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| WhepError::Transport(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| WhepError::Transport(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl PeerConnectionFactory for RtcPeerFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>> {
        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(|s| s.to_rtc_ice_server()).collect(),
            ..Default::default()
        };

        let peer_connection = self
            .api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| WhepError::Transport(format!("Failed to create peer connection: {}", e)))?;

        let peer = RtcPeer {
            peer_connection: Arc::new(peer_connection),
        };
        peer.install_handlers(events);

        Ok(Arc::new(peer))
    }
}

/// A single webrtc-rs peer connection
pub struct RtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcPeer {
    fn install_handlers(&self, events: PeerEventSender) {
        let ice_tx = events.clone();
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                // None marks the end of gathering
                if let Some(c) = candidate {
                    match c.to_json() {
                        Ok(init) => {
                            let _ = ice_tx.send(PeerEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            }));
                        }
                        Err(e) => log::warn!("Dropping unserializable ICE candidate: {}", e),
                    }
                }
                Box::pin(async {})
            }));

        let state_tx = events.clone();
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let _ = state_tx.send(PeerEvent::ConnectionStateChanged(s.into()));
                Box::pin(async {})
            }));

        let track_tx = events;
        self.peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Video => MediaKind::Video,
                    _ => MediaKind::Audio,
                };
                let _ = track_tx.send(PeerEvent::Track(TrackEvent {
                    kind,
                    track_id: track.id(),
                    stream_ids: vec![track.stream_id()],
                    remote: Some(track),
                }));
                Box::pin(async {})
            },
        ));
    }

    /// Get the peer connection for advanced usage
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl PeerConnection for RtcPeer {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<()> {
        self.peer_connection
            .add_transceiver_from_kind(
                codec_type(kind),
                Some(RTCRtpTransceiverInit {
                    direction: direction.into(),
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                WhepError::Transport(format!("Failed to add {} transceiver: {}", kind.as_str(), e))
            })?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| WhepError::Transport(format!("Failed to create offer: {}", e)))?;
        Ok(offer.sdp)
    }

    async fn set_local_description(&self, offer_sdp: &str) -> Result<()> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| WhepError::Transport(format!("Invalid offer SDP: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| WhepError::Transport(format!("Failed to set local description: {}", e)))?;
        Ok(())
    }

    async fn set_remote_description(&self, answer_sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer_sdp.to_string())
            .map_err(|e| WhepError::Signaling(format!("Invalid answer SDP: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| WhepError::Transport(format!("Failed to set remote description: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| WhepError::Transport(format!("Failed to close peer connection: {}", e)))?;
        Ok(())
    }
}
