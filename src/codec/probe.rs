//! Non-advertised codec probe.
//!
//! For each codec: create a throwaway peer, add a recv-only audio
//! transceiver, splice the codec into the generated offer and try to apply
//! it as the local description. Acceptance means the codec is supported.

use futures_util::future::try_join_all;
use tokio::sync::mpsc;

use super::{CodecSpec, CodecSupport};
use crate::error::{Result, WhepError};
use crate::peer::{MediaKind, PeerConnection, PeerConnectionFactory, TransceiverDirection};
use crate::sdp::inject_codec;

/// Check whether the local media engine accepts `codec` in an audio offer.
///
/// Returns `Err` only when the throwaway peer cannot be created; every
/// later failure (including the codec already being offered) is `Ok(false)`.
pub async fn supports_non_advertised_codec(
    factory: &dyn PeerConnectionFactory,
    codec: &CodecSpec,
) -> Result<bool> {
    // Nobody listens to a probe peer's events
    let (events, _) = mpsc::unbounded_channel();
    let peer = factory
        .create(&[], events)
        .await
        .map_err(|e| {
            WhepError::CodecProbe(format!("codec probe for {} failed: {}", codec.name, e))
        })?;

    let supported = match offer_with_codec(peer.as_ref(), codec).await {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Codec {} not supported: {}", codec.name, e);
            false
        }
    };

    if let Err(e) = peer.close().await {
        log::debug!("Failed to close probe peer: {}", e);
    }

    Ok(supported)
}

async fn offer_with_codec(peer: &dyn PeerConnection, codec: &CodecSpec) -> Result<()> {
    let media = MediaKind::Audio;
    peer.add_transceiver(media, TransceiverDirection::Recvonly).await?;

    let offer = peer.create_offer().await?;
    if offer.is_empty() {
        return Err(WhepError::CodecProbe("SDP not present".to_string()));
    }

    let sdp = inject_codec(&offer, media.as_str(), &codec.name, codec.fmtp.as_deref())?;
    peer.set_local_description(&sdp).await
}

/// Probe all `codecs` in parallel.
///
/// Completes once every probe has resolved; the first probe that cannot run
/// fails the whole step.
pub async fn probe_codecs(
    factory: &dyn PeerConnectionFactory,
    codecs: &[CodecSpec],
) -> Result<Vec<CodecSupport>> {
    try_join_all(codecs.iter().map(|codec| async move {
        let supported = supports_non_advertised_codec(factory, codec).await?;
        Ok::<_, WhepError>(CodecSupport {
            codec: codec.clone(),
            supported,
        })
    }))
    .await
}
