//! Reconnecting stream reader.
//!
//! Keeps one [`WhepSession`] alive against an endpoint: when a session
//! reports an error it is closed, the status is published and a fresh
//! session is started after the reconnect delay. A missing stream is shown
//! as "waiting" rather than as a failure.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{ReaderConfig, SessionConfig, TrackCallback};
use crate::error::{Result, WhepError};
use crate::peer::{PeerConnectionFactory, RtcPeerFactory, TrackEvent};
use crate::session::WhepSession;
use crate::signaling::{HttpTransport, HyperTransport};

/// Status published by [`StreamReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    /// A session is negotiating
    Connecting,
    /// At least one track has arrived
    Playing,
    /// The endpoint has no such stream yet; retrying
    WaitingForStream,
    /// The last session failed; retrying
    Restarting,
    Stopped,
}

impl ReaderStatus {
    /// Status to show after a session ended with `err`.
    pub fn after_error(err: &WhepError) -> Self {
        if err.is_stream_not_found() {
            ReaderStatus::WaitingForStream
        } else {
            ReaderStatus::Restarting
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReaderStatus::Connecting => "Connecting...",
            ReaderStatus::Playing => "Playing",
            ReaderStatus::WaitingForStream => "Waiting for stream...",
            ReaderStatus::Restarting => "Connection lost, restarting...",
            ReaderStatus::Stopped => "Stopped",
        }
    }
}

/// Reconnecting WHEP reader.
pub struct StreamReader {
    status_rx: watch::Receiver<ReaderStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamReader {
    /// Start reading with the default webrtc-rs peer and hyper transport.
    pub fn connect(
        config: ReaderConfig,
        on_track: impl Fn(TrackEvent) + Send + Sync + 'static,
    ) -> Result<Self> {
        let factory = Arc::new(RtcPeerFactory::new()?);
        Ok(Self::start(config, on_track, factory, Arc::new(HyperTransport::new())))
    }

    pub fn start(
        config: ReaderConfig,
        on_track: impl Fn(TrackEvent) + Send + Sync + 'static,
        factory: Arc<dyn PeerConnectionFactory>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(ReaderStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            config,
            on_track: Arc::new(on_track),
            factory,
            transport,
            status_tx: Arc::new(status_tx),
        };
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        Self {
            status_rx,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn status(&self) -> ReaderStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReaderStatus> {
        self.status_rx.clone()
    }

    /// Cancel any pending restart and close the current session.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("Stream reader task ended abnormally: {}", e);
            }
        }
    }
}

/// Move `Connecting` to `Playing`. A track racing a session error must not
/// overwrite the `Restarting`/`WaitingForStream` published for it.
fn mark_playing(status: &watch::Sender<ReaderStatus>) -> bool {
    status.send_if_modified(|s| {
        if *s == ReaderStatus::Connecting {
            *s = ReaderStatus::Playing;
            true
        } else {
            false
        }
    })
}

struct Supervisor {
    config: ReaderConfig,
    on_track: TrackCallback,
    factory: Arc<dyn PeerConnectionFactory>,
    transport: Arc<dyn HttpTransport>,
    status_tx: Arc<watch::Sender<ReaderStatus>>,
}

impl Supervisor {
    fn publish(&self, status: ReaderStatus) {
        log::info!("WHEP reader: {}", status.message());
        self.status_tx.send_replace(status);
    }

    fn session_config(&self, errors: mpsc::UnboundedSender<WhepError>) -> SessionConfig {
        let on_track = self.on_track.clone();
        let status_tx = self.status_tx.clone();

        SessionConfig::with_url(self.config.url.clone())
            .probe_codecs(self.config.probe_codecs.clone())
            .on_error(move |e| {
                let _ = errors.send(e.clone());
            })
            .on_track(move |track| {
                mark_playing(&status_tx);
                on_track(track);
            })
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.publish(ReaderStatus::Connecting);

            let (err_tx, mut err_rx) = mpsc::unbounded_channel();
            let session = WhepSession::spawn(
                self.session_config(err_tx),
                self.factory.clone(),
                self.transport.clone(),
            );

            let err = tokio::select! {
                Some(err) = err_rx.recv() => err,
                _ = shutdown.changed() => {
                    session.close().await;
                    break;
                }
            };
            session.close().await;
            drop(session);

            self.publish(ReaderStatus::after_error(&err));

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.publish(ReaderStatus::Stopped);
    }
}
