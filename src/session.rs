//! WHEP session - one negotiation attempt and its steady state.
//!
//! Lifecycle:
//! 1. Probe non-advertised codecs (`ProbingCodecs`)
//! 2. OPTIONS the endpoint for ICE servers (`Running` from here on)
//! 3. Create the peer with recv-only video + audio transceivers, in that order
//! 4. Create and apply the local offer, POST it
//! 5. Apply the answer, then flush queued local candidates in one PATCH
//! 6. Trickle every later candidate immediately
//!
//! Any failure while running tears everything down, moves to `Closed` and
//! reports the error once. The session never retries; see
//! [`StreamReader`](crate::supervisor::StreamReader) for reconnection.
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! Peer callbacks arrive through a channel drained by a single task, and
//! PATCH requests are sent by a single task in submission order. Every
//! completed async step re-checks the state before applying its result.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::codec::{probe_codecs, CodecSupport};
use crate::config::SessionConfig;
use crate::error::{Result, WhepError};
use crate::peer::{
    ConnectionState, IceCandidate, MediaKind, PeerConnection, PeerConnectionFactory, PeerEvent,
    PeerEventReceiver, RtcPeerFactory, TrackEvent, TransceiverDirection,
};
use crate::sdp::{generate_fragment, OfferData};
use crate::signaling::{HttpTransport, HyperTransport, OfferAnswer, WhepClient};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Codec probe in flight
    ProbingCodecs,
    /// Negotiating or receiving media
    Running,
    /// Codec probe failed (terminal)
    Failed,
    /// Closed by an error or by the caller (terminal)
    Closed,
}

impl ReaderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReaderState::Failed | ReaderState::Closed)
    }
}

/// Ensures the error callback fires at most once until re-armed.
#[derive(Debug, Default)]
struct ErrorLatch {
    reported: bool,
}

impl ErrorLatch {
    /// Returns true if the caller should report now.
    fn try_report(&mut self) -> bool {
        !std::mem::replace(&mut self.reported, true)
    }

    /// A fresh track means the link is healthy again.
    fn rearm(&mut self) {
        self.reported = false;
    }
}

struct SessionState {
    reader_state: ReaderState,
    peer: Option<Arc<dyn PeerConnection>>,
    offer: Option<OfferData>,
    session_url: Option<Url>,
    /// Local candidates gathered before the answer was applied
    queued_candidates: Vec<IceCandidate>,
    /// Set once the queue has been flushed; later candidates go out directly
    trickle_open: bool,
    /// Feeds the PATCH sender task
    trickle_tx: Option<mpsc::UnboundedSender<String>>,
    latch: ErrorLatch,
    supported_codecs: Vec<CodecSupport>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            reader_state: ReaderState::ProbingCodecs,
            peer: None,
            offer: None,
            session_url: None,
            queued_candidates: Vec::new(),
            trickle_open: false,
            trickle_tx: None,
            latch: ErrorLatch::default(),
            supported_codecs: Vec::new(),
        }
    }

    /// Drop everything tied to the negotiation; returns what still needs async teardown.
    fn teardown(&mut self) -> (Option<Arc<dyn PeerConnection>>, Option<Url>) {
        self.offer = None;
        self.queued_candidates.clear();
        self.trickle_open = false;
        self.trickle_tx = None;
        (self.peer.take(), self.session_url.take())
    }

    /// Queue a PATCH with a fragment for `candidates`.
    fn send_candidates(&self, candidates: &[IceCandidate]) {
        if let (Some(offer), Some(tx)) = (self.offer.as_ref(), self.trickle_tx.as_ref()) {
            let _ = tx.send(generate_fragment(offer, candidates));
        }
    }
}

struct SessionShared {
    config: SessionConfig,
    factory: Arc<dyn PeerConnectionFactory>,
    client: WhepClient,
    state: Mutex<SessionState>,
    state_tx: watch::Sender<ReaderState>,
}

impl SessionShared {
    fn set_state(&self, st: &mut SessionState, next: ReaderState) {
        log::debug!("WHEP session {:?} -> {:?}", st.reader_state, next);
        st.reader_state = next;
        self.state_tx.send_replace(next);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state.lock().reader_state == ReaderState::Running {
            Ok(())
        } else {
            Err(WhepError::Closed)
        }
    }

    async fn run(self: Arc<Self>) {
        let support = match probe_codecs(self.factory.as_ref(), &self.config.probe_codecs).await {
            Ok(support) => support,
            Err(e) => {
                log::error!("Codec check failed: {}", e);
                self.handle_error(e).await;
                return;
            }
        };

        {
            let mut st = self.state.lock();
            if st.reader_state != ReaderState::ProbingCodecs {
                return;
            }
            for s in &support {
                log::info!("Non-advertised codec {}: supported={}", s.codec.name, s.supported);
            }
            st.supported_codecs = support;
            self.set_state(&mut st, ReaderState::Running);
        }

        if let Err(e) = self.negotiate().await {
            if e != WhepError::Closed {
                log::error!("WHEP connection failed: {}", e);
            }
            self.handle_error(e).await;
        }
    }

    async fn negotiate(self: &Arc<Self>) -> Result<()> {
        let ice_servers = self.client.request_ice_servers().await?;
        self.ensure_running()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = self.factory.create(&ice_servers, events_tx).await?;
        {
            let mut st = self.state.lock();
            if st.reader_state == ReaderState::Running {
                st.peer = Some(peer.clone());
            }
        }
        if self.ensure_running().is_err() {
            let _ = peer.close().await;
            return Err(WhepError::Closed);
        }
        tokio::spawn(self.clone().pump_events(events_rx));

        // Transceiver order fixes the m-line indexes used for trickling
        peer.add_transceiver(MediaKind::Video, TransceiverDirection::Recvonly).await?;
        peer.add_transceiver(MediaKind::Audio, TransceiverDirection::Recvonly).await?;

        let offer = peer.create_offer().await?;
        {
            let mut st = self.state.lock();
            if st.reader_state != ReaderState::Running {
                return Err(WhepError::Closed);
            }
            st.offer = Some(OfferData::parse(&offer));
        }
        peer.set_local_description(&offer).await?;
        self.ensure_running()?;

        let OfferAnswer { session_url, answer } = self.client.send_offer(&offer).await?;
        let accepted = {
            let mut st = self.state.lock();
            if st.reader_state == ReaderState::Running {
                let (tx, rx) = mpsc::unbounded_channel();
                st.session_url = Some(session_url.clone());
                st.trickle_tx = Some(tx);
                tokio::spawn(self.clone().send_fragments(session_url.clone(), rx));
                true
            } else {
                false
            }
        };
        if !accepted {
            // Closed while the POST was in flight; the server already created the session
            self.spawn_delete(session_url);
            return Err(WhepError::Closed);
        }
        log::info!("WHEP session created: {}", session_url);

        peer.set_remote_description(&answer).await?;

        let mut st = self.state.lock();
        if st.reader_state != ReaderState::Running {
            return Err(WhepError::Closed);
        }
        st.trickle_open = true;
        if !st.queued_candidates.is_empty() {
            let queued = std::mem::take(&mut st.queued_candidates);
            log::debug!("Flushing {} queued ICE candidate(s)", queued.len());
            st.send_candidates(&queued);
        }

        Ok(())
    }

    /// Drain peer callbacks one at a time.
    async fn pump_events(self: Arc<Self>, mut events: PeerEventReceiver) {
        while let Some(event) = events.recv().await {
            match event {
                PeerEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate),
                PeerEvent::ConnectionStateChanged(state) => self.on_connection_state(state).await,
                PeerEvent::Track(track) => self.on_track(track),
            }
            if self.state.lock().reader_state.is_terminal() {
                break;
            }
        }
    }

    /// Send PATCH requests strictly in submission order.
    async fn send_fragments(
        self: Arc<Self>,
        session_url: Url,
        mut fragments: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(fragment) = fragments.recv().await {
            if self.ensure_running().is_err() {
                break;
            }
            if let Err(e) = self.client.send_candidates(&session_url, fragment).await {
                self.handle_error(e).await;
                break;
            }
        }
    }

    fn on_local_candidate(&self, candidate: IceCandidate) {
        let mut st = self.state.lock();
        if st.reader_state != ReaderState::Running {
            return;
        }
        if st.trickle_open {
            st.send_candidates(std::slice::from_ref(&candidate));
        } else {
            st.queued_candidates.push(candidate);
        }
    }

    async fn on_connection_state(&self, state: ConnectionState) {
        log::debug!("Peer connection state: {:?}", state);
        if state.is_terminal() {
            self.handle_error(WhepError::PeerConnectionClosed).await;
        }
    }

    fn on_track(&self, track: TrackEvent) {
        {
            let mut st = self.state.lock();
            if st.reader_state != ReaderState::Running {
                return;
            }
            st.latch.rearm();
        }
        log::info!("Received {} track {}", track.kind.as_str(), track.track_id);
        (self.config.on_track)(track);
    }

    /// Single funnel for every failure.
    async fn handle_error(&self, err: WhepError) {
        let (peer, session_url, report) = {
            let mut st = self.state.lock();
            match st.reader_state {
                ReaderState::Running => {
                    let (peer, session_url) = st.teardown();
                    self.set_state(&mut st, ReaderState::Closed);
                    (peer, session_url, st.latch.try_report())
                }
                ReaderState::ProbingCodecs => {
                    self.set_state(&mut st, ReaderState::Failed);
                    (None, None, st.latch.try_report())
                }
                ReaderState::Failed | ReaderState::Closed => return,
            }
        };

        self.release(peer, session_url).await;

        if report {
            log::warn!("WHEP session error: {}", err);
            (self.config.on_error)(&err);
        }
    }

    async fn close(&self) {
        let (peer, session_url) = {
            let mut st = self.state.lock();
            if st.reader_state.is_terminal() {
                return;
            }
            let torn_down = st.teardown();
            self.set_state(&mut st, ReaderState::Closed);
            torn_down
        };

        self.release(peer, session_url).await;
    }

    /// Close the peer, then DELETE the session resource in the background.
    ///
    /// Only the peer close is awaited; the DELETE is best effort and a
    /// server that never answers must not hold up error reporting or close.
    async fn release(&self, peer: Option<Arc<dyn PeerConnection>>, session_url: Option<Url>) {
        if let Some(peer) = peer {
            if let Err(e) = peer.close().await {
                log::debug!("Failed to close peer connection: {}", e);
            }
        }
        if let Some(url) = session_url {
            self.spawn_delete(url);
        }
    }

    fn spawn_delete(&self, session_url: Url) {
        let client = self.client.clone();
        tokio::spawn(async move { client.delete(&session_url).await });
    }
}

/// A WHEP reader session.
///
/// Created with [`spawn`](Self::spawn) (or [`connect`](Self::connect) for the
/// webrtc-rs + hyper defaults); negotiation starts immediately on the
/// current tokio runtime.
pub struct WhepSession {
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<ReaderState>,
}

impl WhepSession {
    /// Start a session with the default webrtc-rs peer and hyper transport.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let factory = Arc::new(RtcPeerFactory::new()?);
        Ok(Self::spawn(config, factory, Arc::new(HyperTransport::new())))
    }

    /// Start a session with explicit peer and HTTP implementations.
    pub fn spawn(
        config: SessionConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ReaderState::ProbingCodecs);
        let shared = Arc::new(SessionShared {
            client: WhepClient::new(config.url.clone(), transport),
            config,
            factory,
            state: Mutex::new(SessionState::new()),
            state_tx,
        });

        tokio::spawn(shared.clone().run());

        Self { shared, state_rx }
    }

    pub fn state(&self) -> ReaderState {
        self.shared.state.lock().reader_state
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReaderState> {
        self.state_rx.clone()
    }

    /// Session resource URL, once the offer has been accepted.
    pub fn session_url(&self) -> Option<Url> {
        self.shared.state.lock().session_url.clone()
    }

    /// Probe results (empty until probing completes).
    pub fn supported_codecs(&self) -> Vec<CodecSupport> {
        self.shared.state.lock().supported_codecs.clone()
    }

    /// Close the session. Safe to call at any time and more than once.
    ///
    /// Closes the peer and sends a best-effort DELETE if a session URL is
    /// known. No callback fires after this.
    pub async fn close(&self) {
        self.shared.close().await;
    }

    /// Wait until the session reaches `Failed` or `Closed`.
    pub async fn closed(&self) -> ReaderState {
        let mut rx = self.state_rx.clone();
        let result = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        result.unwrap_or(ReaderState::Closed)
    }
}
