//! ICE server configuration.
//!
//! WHEP servers advertise STUN/TURN servers in the `Link` header of the
//! `OPTIONS` response (RFC 8288 form):
//!
//! ```text
//! <stun:stun.example.com:3478>; rel="ice-server",
//! <turn:turn.example.com:3478>; rel="ice-server"; username="u"; credential="p"; credential-type="password"
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use webrtc::ice_transport::ice_server::RTCIceServer;

lazy_static! {
    static ref ICE_SERVER_LINK: Regex = Regex::new(
        r#"(?i)^<(.+?)>; rel="ice-server"(; username="(.*?)"; credential="(.*?)"; credential-type="password")?"#
    )
    .expect("ice-server link pattern is valid");
}

/// ICE server configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Create a STUN-only server config
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server config with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }

    /// Convert to webrtc-rs RTCIceServer
    pub fn to_rtc_ice_server(&self) -> RTCIceServer {
        RTCIceServer {
            urls: self.urls.clone(),
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Parse the `Link` header of a WHEP `OPTIONS` response.
///
/// A missing header yields an empty list. Entries that are not
/// `rel="ice-server"` links are skipped.
pub fn parse_link_header(links: Option<&str>) -> Vec<IceServerConfig> {
    let links = match links {
        Some(l) if !l.trim().is_empty() => l,
        _ => return Vec::new(),
    };

    links
        .split(", ")
        .filter_map(|link| {
            let caps = ICE_SERVER_LINK.captures(link.trim())?;
            let url = caps.get(1)?.as_str();

            match (caps.get(3), caps.get(4)) {
                (Some(username), Some(credential)) => Some(IceServerConfig {
                    urls: vec![url.to_string()],
                    username: Some(unquote(username.as_str())),
                    credential: Some(unquote(credential.as_str())),
                }),
                _ => Some(IceServerConfig::stun(url)),
            }
        })
        .collect()
}

/// Undo quoted-string escaping; keeps the raw text if it isn't a valid escape sequence.
fn unquote(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}
