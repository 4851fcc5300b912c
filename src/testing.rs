//! Scripted peer and HTTP doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, Request, Response};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::SessionConfig;
use crate::error::{Result, WhepError};
use crate::ice::IceServerConfig;
use crate::peer::{
    MediaKind, PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventSender, TrackEvent,
    TransceiverDirection,
};

/// Ordered log of peer and HTTP calls, shared between the doubles.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Poll `cond` until it holds. Panics after a few seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Collects what the session reports through its callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    errors: Arc<Mutex<Vec<String>>>,
    tracks: Arc<Mutex<Vec<TrackEvent>>>,
}

impl Recorder {
    pub fn attach(&self, config: SessionConfig) -> SessionConfig {
        let errors = self.errors.clone();
        let tracks = self.tracks.clone();
        config
            .on_error(move |e: &WhepError| errors.lock().push(e.to_string()))
            .on_track(move |t: TrackEvent| tracks.lock().push(t))
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn tracks(&self) -> Vec<TrackEvent> {
        self.tracks.lock().clone()
    }
}

#[derive(Default)]
struct MockPeerState {
    transceivers: Vec<(MediaKind, TransceiverDirection)>,
    local: Option<String>,
    remote: Option<String>,
    closed: bool,
}

pub struct MockPeer {
    journal: Journal,
    events: PeerEventSender,
    rejected: Vec<String>,
    state: Mutex<MockPeerState>,
}

impl MockPeer {
    /// Raise a peer event as if the engine had fired a callback.
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn transceivers(&self) -> Vec<(MediaKind, TransceiverDirection)> {
        self.state.lock().transceivers.clone()
    }

    pub fn local_description(&self) -> Option<String> {
        self.state.lock().local.clone()
    }

    pub fn remote_description(&self) -> Option<String> {
        self.state.lock().remote.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn has_video(&self) -> bool {
        self.state.lock().transceivers.iter().any(|(k, _)| *k == MediaKind::Video)
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<()> {
        self.journal.record(format!("peer:add_transceiver:{}", kind.as_str()));
        self.state.lock().transceivers.push((kind, direction));
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.journal.record("peer:create_offer");
        let mut sdp = String::from("v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
        let transceivers = self.state.lock().transceivers.clone();
        for (mid, (kind, _)) in transceivers.iter().enumerate() {
            match kind {
                MediaKind::Video => sdp.push_str(
                    "m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
                     a=rtpmap:96 VP8/90000\r\n\
                     a=rtpmap:97 H264/90000\r\n",
                ),
                MediaKind::Audio => sdp.push_str(
                    "m=audio 9 UDP/TLS/RTP/SAVPF 111 9 0 8\r\n\
                     a=rtpmap:111 opus/48000/2\r\n",
                ),
            }
            sdp.push_str(&format!(
                "a=ice-ufrag:mockufrag\r\na=ice-pwd:mockpwd\r\na=mid:{}\r\na=recvonly\r\n",
                mid
            ));
        }
        Ok(sdp)
    }

    async fn set_local_description(&self, offer_sdp: &str) -> Result<()> {
        self.journal.record("peer:set_local_description");
        if let Some(codec) = self.rejected.iter().find(|c| offer_sdp.contains(c.as_str())) {
            return Err(WhepError::Transport(format!("codec {} not supported", codec)));
        }
        self.state.lock().local = Some(offer_sdp.to_string());
        Ok(())
    }

    async fn set_remote_description(&self, answer_sdp: &str) -> Result<()> {
        self.journal.record("peer:set_remote_description");
        self.state.lock().remote = Some(answer_sdp.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.journal.record("peer:close");
        self.state.lock().closed = true;
        Ok(())
    }
}

pub struct MockPeerFactory {
    journal: Journal,
    rejected: Vec<String>,
    fail_creates: Mutex<bool>,
    peers: Mutex<Vec<Arc<MockPeer>>>,
    ice_servers: Mutex<Vec<Vec<IceServerConfig>>>,
}

impl MockPeerFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            rejected: Vec::new(),
            fail_creates: Mutex::new(false),
            peers: Mutex::new(Vec::new()),
            ice_servers: Mutex::new(Vec::new()),
        }
    }

    /// Make `set_local_description` fail for offers containing `codec`.
    pub fn reject_codec(mut self, codec: &str) -> Self {
        self.rejected.push(codec.to_string());
        self
    }

    pub fn fail_creates(&self, fail: bool) {
        *self.fail_creates.lock() = fail;
    }

    pub fn peers(&self) -> Vec<Arc<MockPeer>> {
        self.peers.lock().clone()
    }

    /// The most recent peer with a video transceiver, i.e. not a codec probe.
    pub fn session_peer(&self) -> Option<Arc<MockPeer>> {
        self.peers.lock().iter().rev().find(|p| p.has_video()).cloned()
    }

    pub fn ice_servers_seen(&self) -> Vec<Vec<IceServerConfig>> {
        self.ice_servers.lock().clone()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>> {
        if *self.fail_creates.lock() {
            return Err(WhepError::Transport("peer creation disabled".to_string()));
        }
        self.journal.record("peer:create");
        self.ice_servers.lock().push(ice_servers.to_vec());

        let peer = Arc::new(MockPeer {
            journal: self.journal.clone(),
            events,
            rejected: self.rejected.clone(),
            state: Mutex::new(MockPeerState::default()),
        });
        self.peers.lock().push(peer.clone());

        Ok(peer)
    }
}

/// Scripted HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    fn to_response(&self) -> Response<Bytes> {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Bytes::from(self.body.clone())).unwrap()
    }
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

#[derive(Default)]
struct MockTransportState {
    requests: Vec<RecordedRequest>,
    scripted: HashMap<Method, VecDeque<MockResponse>>,
    defaults: HashMap<Method, MockResponse>,
    post_gate: Option<oneshot::Receiver<()>>,
    /// Methods whose requests are recorded but never answered
    hung: Vec<Method>,
}

/// HTTP double with one-shot scripted responses and per-method defaults.
///
/// Defaults: OPTIONS 204 without `Link`, POST 201 with a relative
/// `Location` and an SDP answer, PATCH 204, DELETE 200.
pub struct MockTransport {
    journal: Journal,
    state: Mutex<MockTransportState>,
}

impl MockTransport {
    pub fn new(journal: Journal) -> Self {
        let mut defaults = HashMap::new();
        defaults.insert(Method::OPTIONS, MockResponse::new(204));
        defaults.insert(
            Method::POST,
            MockResponse::new(201)
                .header("Content-Type", "application/sdp")
                .header("Location", "session/1")
                .body("v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n"),
        );
        defaults.insert(Method::PATCH, MockResponse::new(204));
        defaults.insert(Method::DELETE, MockResponse::new(200));

        Self {
            journal,
            state: Mutex::new(MockTransportState {
                defaults,
                ..Default::default()
            }),
        }
    }

    /// Answer the next `method` request with `response`.
    pub fn respond(&self, method: Method, response: MockResponse) {
        self.state.lock().scripted.entry(method).or_default().push_back(response);
    }

    pub fn set_default(&self, method: Method, response: MockResponse) {
        self.state.lock().defaults.insert(method, response);
    }

    /// Hold the next POST response until the returned sender fires.
    pub fn hold_post(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().post_gate = Some(rx);
        tx
    }

    /// Record `method` requests but never complete them.
    pub fn hang(&self, method: Method) {
        self.state.lock().hung.push(method);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_for(&self, method: &Method) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| &r.method == method)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl crate::signaling::HttpTransport for MockTransport {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let method = request.method().clone();
        let recorded = RecordedRequest {
            method: method.clone(),
            uri: request.uri().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect(),
            body: String::from_utf8_lossy(request.body()).to_string(),
        };

        let (gate, hung, response) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.requests.push(recorded);
            let gate = if method == Method::POST { st.post_gate.take() } else { None };
            let response = st
                .scripted
                .get_mut(&method)
                .and_then(|q| q.pop_front())
                .or_else(|| st.defaults.get(&method).cloned())
                .unwrap_or_else(|| MockResponse::new(500));
            (gate, st.hung.contains(&method), response)
        };

        if hung {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.journal.record(format!("http:{}", method));

        Ok(response.to_response())
    }
}
