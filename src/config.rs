//! Session and reader configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::codec::CodecSpec;
use crate::error::{Result, WhepError};
use crate::peer::TrackEvent;

/// Default WHEP service used when only portal credentials are configured.
pub const DEFAULT_BASE_URL: &str = "https://api-video-webrtc.openmind.org";

/// Delay between a failed session and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Called at most once per session with the error that ended it.
pub type ErrorCallback = Arc<dyn Fn(&WhepError) + Send + Sync>;

/// Called for every remote track.
pub type TrackCallback = Arc<dyn Fn(TrackEvent) + Send + Sync>;

/// Build the portal WHEP URL for an API key pair.
pub fn portal_whep_url(base: &str, api_key_id: &str, api_key: &str) -> Result<Url> {
    let url = format!(
        "{}/portal/{}/whep?api_key={}",
        base.trim_end_matches('/'),
        api_key_id,
        api_key
    );
    parse_url(&url)
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url)
        .map_err(|e| WhepError::Config(format!("Invalid signaling URL '{}': {}", url, e)))
}

/// Configuration for a single WHEP session.
#[derive(Clone)]
pub struct SessionConfig {
    /// WHEP endpoint
    pub url: Url,
    pub on_error: ErrorCallback,
    pub on_track: TrackCallback,
    /// Codecs probed before negotiating
    pub probe_codecs: Vec<CodecSpec>,
}

impl SessionConfig {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::with_url(parse_url(url)?))
    }

    pub fn with_url(url: Url) -> Self {
        Self {
            url,
            on_error: Arc::new(|_| {}),
            on_track: Arc::new(|_| {}),
            probe_codecs: CodecSpec::non_advertised_defaults(),
        }
    }

    pub fn on_error(mut self, callback: impl Fn(&WhepError) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(callback);
        self
    }

    pub fn on_track(mut self, callback: impl Fn(TrackEvent) + Send + Sync + 'static) -> Self {
        self.on_track = Arc::new(callback);
        self
    }

    pub fn probe_codecs(mut self, codecs: Vec<CodecSpec>) -> Self {
        self.probe_codecs = codecs;
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url.as_str())
            .field("probe_codecs", &self.probe_codecs)
            .finish()
    }
}

/// Configuration for the reconnecting [`StreamReader`](crate::supervisor::StreamReader).
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub probe_codecs: Vec<CodecSpec>,
}

impl ReaderConfig {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::with_url(parse_url(url)?))
    }

    pub fn with_url(url: Url) -> Self {
        Self {
            url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            probe_codecs: CodecSpec::non_advertised_defaults(),
        }
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Load from the process environment.
    ///
    /// - `WHEP_URL`: full endpoint URL, or
    /// - `WHEP_API_KEY_ID` + `WHEP_API_KEY` (+ optional `WHEP_BASE_URL`)
    /// - `WHEP_RECONNECT_MS`: optional reconnect delay
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = match lookup("WHEP_URL") {
            Some(url) => parse_url(&url)?,
            None => {
                let base = lookup("WHEP_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
                let key_id = lookup("WHEP_API_KEY_ID").ok_or_else(|| {
                    WhepError::Config("WHEP_URL or WHEP_API_KEY_ID must be set".to_string())
                })?;
                let key = lookup("WHEP_API_KEY")
                    .ok_or_else(|| WhepError::Config("WHEP_API_KEY must be set".to_string()))?;
                portal_whep_url(&base, &key_id, &key)?
            }
        };

        let mut config = Self::with_url(url);
        if let Some(ms) = lookup("WHEP_RECONNECT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| WhepError::Config(format!("Invalid WHEP_RECONNECT_MS: {}", ms)))?;
            config.reconnect_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}
