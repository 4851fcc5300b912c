//! whep-reader: WHEP (WebRTC-HTTP Egress Protocol) reader client.
//!
//! Negotiates a receive-only WebRTC session (video + audio) with a WHEP
//! endpoint and hands remote tracks to the caller.
//!
//! ## Features
//!
//! - **WHEP signaling**: OPTIONS (ICE servers via `Link`), POST offer, DELETE on teardown
//! - **Trickle ICE**: candidates PATCHed as `application/trickle-ice-sdpfrag`, in order
//! - **Codec probing**: checks the local engine for pcma/multiopus/L16 before negotiating
//! - **Reconnect**: [`StreamReader`] restarts failed sessions after a fixed delay
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> whep_reader::Result<()> {
//! use whep_reader::{SessionConfig, WhepSession};
//!
//! let config = SessionConfig::new("http://localhost:8889/mystream/whep")?
//!     .on_track(|track| println!("track {} ({})", track.track_id, track.kind.as_str()))
//!     .on_error(|e| eprintln!("session ended: {}", e));
//! let session = WhepSession::connect(config)?;
//! session.closed().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod ice;
pub mod peer;
pub mod sdp;
pub mod session;
pub mod signaling;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use codec::{CodecSpec, CodecSupport};
pub use config::{portal_whep_url, ReaderConfig, SessionConfig};
pub use error::{ErrorKind, Result, WhepError};
pub use ice::IceServerConfig;
pub use peer::{ConnectionState, IceCandidate, MediaKind, PeerEvent, TrackEvent};
pub use session::{ReaderState, WhepSession};
pub use supervisor::{ReaderStatus, StreamReader};
