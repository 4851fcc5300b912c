//! Codec capability probing.
//!
//! Some codecs (PCMA stereo, multichannel Opus, L16) are never advertised
//! in a default offer but may still be accepted by the local media engine.
//! The probe finds out by splicing them into a throwaway offer.

pub mod probe;

pub use probe::*;

/// A codec to probe, in rtpmap form (`name/clock-rate/channels`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSpec {
    pub name: String,
    /// Optional `a=fmtp` parameters
    pub fmtp: Option<String>,
}

impl CodecSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fmtp: None,
        }
    }

    pub fn with_fmtp(name: &str, fmtp: &str) -> Self {
        Self {
            name: name.to_string(),
            fmtp: Some(fmtp.to_string()),
        }
    }

    /// Codecs a WHEP reader probes for before negotiating.
    pub fn non_advertised_defaults() -> Vec<CodecSpec> {
        vec![
            CodecSpec::new("pcma/8000/2"),
            CodecSpec::with_fmtp(
                "multiopus/48000/6",
                "channel_mapping=0,4,1,2,3,5;num_streams=4;coupled_streams=2",
            ),
            CodecSpec::new("L16/48000/2"),
        ]
    }
}

/// Probe outcome for one codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSupport {
    pub codec: CodecSpec,
    pub supported: bool,
}
