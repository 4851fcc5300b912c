//! SDP helpers: offer parsing, trickle ICE fragments and codec injection.
//!
//! Only the few attributes WHEP needs are read; the SDP is otherwise treated
//! as opaque text owned by the peer connection.

use crate::error::{Result, WhepError};
use crate::peer::IceCandidate;

/// Lowest dynamic payload type tried when injecting a codec.
const FIRST_PAYLOAD_TYPE: u8 = 30;
const LAST_PAYLOAD_TYPE: u8 = 127;
/// 64..=95 collides with RTCP packet types and is never handed out.
const RESERVED_PAYLOAD_TYPES: std::ops::RangeInclusive<u8> = 64..=95;

/// Data extracted from the local offer, needed to build trickle fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferData {
    pub ice_ufrag: String,
    pub ice_pwd: String,
    /// One entry per `m=` line, in document order, without the `m=` prefix
    pub medias: Vec<String>,
}

impl OfferData {
    /// Parse an offer. Only the first `a=ice-ufrag:` / `a=ice-pwd:` lines count.
    pub fn parse(sdp: &str) -> Self {
        let mut ret = OfferData::default();

        for line in sdp.lines() {
            if let Some(media) = line.strip_prefix("m=") {
                ret.medias.push(media.to_string());
            } else if let Some(ufrag) = line.strip_prefix("a=ice-ufrag:") {
                if ret.ice_ufrag.is_empty() {
                    ret.ice_ufrag = ufrag.to_string();
                }
            } else if let Some(pwd) = line.strip_prefix("a=ice-pwd:") {
                if ret.ice_pwd.is_empty() {
                    ret.ice_pwd = pwd.to_string();
                }
            }
        }

        ret
    }
}

/// Build an `application/trickle-ice-sdpfrag` body for `candidates`.
///
/// Media sections without candidates are left out. Candidates keep the
/// order they were supplied in within their section.
pub fn generate_fragment(offer: &OfferData, candidates: &[IceCandidate]) -> String {
    let mut by_media: Vec<Vec<&IceCandidate>> = vec![Vec::new(); offer.medias.len()];
    for candidate in candidates {
        let index = candidate.sdp_mline_index.unwrap_or(0) as usize;
        match by_media.get_mut(index) {
            Some(group) => group.push(candidate),
            None => log::debug!("Dropping candidate for unknown m-line {}", index),
        }
    }

    let mut frag = format!("a=ice-ufrag:{}\r\na=ice-pwd:{}\r\n", offer.ice_ufrag, offer.ice_pwd);

    for (mid, (media, group)) in offer.medias.iter().zip(by_media.iter()).enumerate() {
        if group.is_empty() {
            continue;
        }
        frag.push_str(&format!("m={}\r\na=mid:{}\r\n", media, mid));
        for candidate in group {
            frag.push_str(&format!("a={}\r\n", candidate.candidate));
        }
    }

    frag
}

/// All payload types listed on the `m=` lines of `sdp`.
pub fn payload_types(sdp: &str) -> Vec<u8> {
    sdp.lines()
        .filter(|line| line.starts_with("m="))
        .flat_map(|line| line.split(' ').skip(3))
        .filter_map(|pt| pt.trim().parse::<u8>().ok())
        .collect()
}

/// Pick a free dynamic payload type and record it in `used`.
///
/// Candidates are 30..=63 and 96..=127, lowest first.
pub fn reserve_payload_type(used: &mut Vec<u8>) -> Result<u8> {
    for pt in FIRST_PAYLOAD_TYPE..=LAST_PAYLOAD_TYPE {
        if RESERVED_PAYLOAD_TYPES.contains(&pt) || used.contains(&pt) {
            continue;
        }
        used.push(pt);
        return Ok(pt);
    }
    Err(WhepError::CodecProbe("unable to find a free payload type".to_string()))
}

/// Add `codec` (an rtpmap encoding such as `L16/48000/2`) to the first
/// `m=<media>` section of `sdp` under a freshly reserved payload type.
pub fn inject_codec(sdp: &str, media: &str, codec: &str, fmtp: Option<&str>) -> Result<String> {
    if sdp.contains(&format!(" {}", codec)) {
        return Err(WhepError::CodecProbe("already present".to_string()));
    }

    let mut lines: Vec<String> = sdp.lines().map(str::to_string).collect();
    let m_prefix = format!("m={} ", media);

    let start = lines
        .iter()
        .position(|l| l.starts_with(&m_prefix))
        .ok_or_else(|| WhepError::CodecProbe(format!("no {} section in offer", media)))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.starts_with("m="))
        .map(|i| start + 1 + i)
        .unwrap_or(lines.len());

    let mut used = payload_types(sdp);
    let pt = reserve_payload_type(&mut used)?;

    lines[start].push_str(&format!(" {}", pt));
    let mut extra = vec![format!("a=rtpmap:{} {}", pt, codec)];
    if let Some(fmtp) = fmtp {
        extra.push(format!("a=fmtp:{} {}", pt, fmtp));
    }
    lines.splice(end..end, extra);

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    Ok(out)
}
