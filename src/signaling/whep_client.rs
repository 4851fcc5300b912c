//! WHEP Client - WebRTC-HTTP Egress Protocol signaling requests.
//!
//! Flow:
//! 1. OPTIONS the endpoint to learn ICE servers (`Link` header)
//! 2. POST the SDP offer, receive the answer and the session URL (`Location`)
//! 3. PATCH trickled ICE candidates to the session URL
//! 4. DELETE the session URL on teardown

use std::sync::Arc;

use bytes::Bytes;
use hyper::header::{CONTENT_TYPE, IF_MATCH, LINK, LOCATION};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::http::HttpTransport;
use crate::error::{Result, WhepError};
use crate::ice::{parse_link_header, IceServerConfig};

pub const SDP_CONTENT_TYPE: &str = "application/sdp";
pub const TRICKLE_ICE_CONTENT_TYPE: &str = "application/trickle-ice-sdpfrag";

/// Body of a 400 response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Result of a successful offer POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferAnswer {
    /// Session resource URL (absolute)
    pub session_url: Url,
    /// SDP answer
    pub answer: String,
}

/// Issues WHEP requests against one endpoint.
#[derive(Clone)]
pub struct WhepClient {
    endpoint: Url,
    transport: Arc<dyn HttpTransport>,
}

impl WhepClient {
    pub fn new(endpoint: Url, transport: Arc<dyn HttpTransport>) -> Self {
        Self { endpoint, transport }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Response<Bytes>> {
        let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if method == Method::PATCH {
            builder = builder.header(IF_MATCH, "*");
        }

        let request = builder
            .body(body)
            .map_err(|e| {
                WhepError::Transport(format!("Failed to build {} request: {}", method, e))
            })?;

        log::debug!("WHEP {} {}", method, url);
        self.transport.execute(request).await
    }

    /// OPTIONS the endpoint and parse the advertised ICE servers.
    ///
    /// The status code is not checked; a missing `Link` header means no servers.
    pub async fn request_ice_servers(&self) -> Result<Vec<IceServerConfig>> {
        let response = self.send(Method::OPTIONS, &self.endpoint, None, Bytes::new()).await?;

        let link = response.headers().get(LINK).and_then(|v| v.to_str().ok());
        let servers = parse_link_header(link);
        log::debug!("WHEP endpoint advertised {} ICE server(s)", servers.len());

        Ok(servers)
    }

    /// POST the SDP offer.
    pub async fn send_offer(&self, offer_sdp: &str) -> Result<OfferAnswer> {
        let response = self
            .send(
                Method::POST,
                &self.endpoint,
                Some(SDP_CONTENT_TYPE),
                Bytes::from(offer_sdp.to_string()),
            )
            .await?;

        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::NOT_FOUND => return Err(WhepError::StreamNotFound),
            StatusCode::BAD_REQUEST => {
                return Err(match serde_json::from_slice::<ErrorBody>(response.body()) {
                    Ok(body) => WhepError::ServerRejected(body.error),
                    Err(e) => WhepError::Signaling(format!("invalid error response: {}", e)),
                });
            }
            status => return Err(WhepError::BadStatus(status.as_u16())),
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| WhepError::Signaling("missing Location header".to_string()))?;

        // Relative URL - resolve against endpoint
        let session_url = self.endpoint.join(location).map_err(|e| {
            WhepError::Signaling(format!("invalid Location header '{}': {}", location, e))
        })?;

        let answer = String::from_utf8_lossy(response.body()).to_string();
        if answer.trim().is_empty() {
            return Err(WhepError::Signaling("missing SDP answer".to_string()));
        }

        Ok(OfferAnswer { session_url, answer })
    }

    /// PATCH a trickle ICE fragment to the session.
    pub async fn send_candidates(&self, session_url: &Url, fragment: String) -> Result<()> {
        let response = self
            .send(
                Method::PATCH,
                session_url,
                Some(TRICKLE_ICE_CONTENT_TYPE),
                Bytes::from(fragment),
            )
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(WhepError::StreamNotFound),
            status => Err(WhepError::BadStatus(status.as_u16())),
        }
    }

    /// DELETE the session. Best effort: failures are logged and dropped.
    pub async fn delete(&self, session_url: &Url) {
        match self.send(Method::DELETE, session_url, None, Bytes::new()).await {
            Ok(response) => {
                log::debug!("WHEP session {} deleted ({})", session_url, response.status())
            }
            Err(e) => log::debug!("WHEP DELETE {} failed: {}", session_url, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, MockResponse, MockTransport};

    fn client(transport: &Arc<MockTransport>) -> WhepClient {
        WhepClient::new(
            Url::parse("https://media.example.com/portal/cam/whep?api_key=k").unwrap(),
            transport.clone(),
        )
    }

    #[tokio::test]
    async fn test_options_without_link_header() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        let servers = client(&transport).request_ice_servers().await.unwrap();
        assert!(servers.is_empty());
        assert_eq!(transport.requests_for(&Method::OPTIONS).len(), 1);
    }

    #[tokio::test]
    async fn test_options_with_link_header() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(
            Method::OPTIONS,
            MockResponse::new(204)
                .header("Link", "<stun:stun.example.com:3478>; rel=\"ice-server\""),
        );
        let servers = client(&transport).request_ice_servers().await.unwrap();
        assert_eq!(servers, vec![IceServerConfig::stun("stun:stun.example.com:3478")]);
    }

    #[tokio::test]
    async fn test_offer_created() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(
            Method::POST,
            MockResponse::new(201).header("Location", "session/42").body("v=0\r\n"),
        );

        let result = client(&transport).send_offer("offer-sdp").await.unwrap();
        assert_eq!(
            result.session_url.as_str(),
            "https://media.example.com/portal/cam/session/42"
        );
        assert_eq!(result.answer, "v=0\r\n");

        let post = &transport.requests_for(&Method::POST)[0];
        assert_eq!(post.header("content-type").as_deref(), Some("application/sdp"));
        assert_eq!(post.body, "offer-sdp");
    }

    #[tokio::test]
    async fn test_offer_absolute_location() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(
            Method::POST,
            MockResponse::new(201)
                .header("Location", "https://other.example.com/s/1")
                .body("v=0\r\n"),
        );
        let result = client(&transport).send_offer("o").await.unwrap();
        assert_eq!(result.session_url.as_str(), "https://other.example.com/s/1");
    }

    #[tokio::test]
    async fn test_offer_not_found() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::POST, MockResponse::new(404));
        let err = client(&transport).send_offer("o").await.unwrap_err();
        assert_eq!(err, WhepError::StreamNotFound);
        assert_eq!(err.to_string(), "stream not found");
    }

    #[tokio::test]
    async fn test_offer_bad_request_message() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::POST, MockResponse::new(400).body(r#"{"error":"bad offer"}"#));
        let err = client(&transport).send_offer("o").await.unwrap_err();
        assert_eq!(err.to_string(), "bad offer");
    }

    #[tokio::test]
    async fn test_offer_bad_request_unparseable() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::POST, MockResponse::new(400).body("nope"));
        let err = client(&transport).send_offer("o").await.unwrap_err();
        assert!(matches!(err, WhepError::Signaling(_)));
    }

    #[tokio::test]
    async fn test_offer_other_status() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::POST, MockResponse::new(200).body("v=0\r\n"));
        let err = client(&transport).send_offer("o").await.unwrap_err();
        assert_eq!(err.to_string(), "bad status code 200");
    }

    #[tokio::test]
    async fn test_offer_missing_location() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::POST, MockResponse::new(201).body("v=0\r\n"));
        let err = client(&transport).send_offer("o").await.unwrap_err();
        assert!(matches!(err, WhepError::Signaling(_)));
    }

    #[tokio::test]
    async fn test_offer_empty_answer() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::POST, MockResponse::new(201).header("Location", "/s/1"));
        let err = client(&transport).send_offer("o").await.unwrap_err();
        assert_eq!(err, WhepError::Signaling("missing SDP answer".to_string()));
    }

    #[tokio::test]
    async fn test_patch_headers_and_statuses() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        let c = client(&transport);
        let session = Url::parse("https://media.example.com/s/1").unwrap();

        c.send_candidates(&session, "a=ice-ufrag:x\r\n".to_string()).await.unwrap();
        let patch = &transport.requests_for(&Method::PATCH)[0];
        assert_eq!(patch.uri, "https://media.example.com/s/1");
        assert_eq!(
            patch.header("content-type").as_deref(),
            Some("application/trickle-ice-sdpfrag")
        );
        assert_eq!(patch.header("if-match").as_deref(), Some("*"));

        transport.respond(Method::PATCH, MockResponse::new(404));
        let err = c.send_candidates(&session, String::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "stream not found");

        transport.respond(Method::PATCH, MockResponse::new(200));
        let err = c.send_candidates(&session, String::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad status code 200");
    }

    #[tokio::test]
    async fn test_delete_swallows_failures() {
        let transport = Arc::new(MockTransport::new(Journal::default()));
        transport.respond(Method::DELETE, MockResponse::new(500));
        let session = Url::parse("https://media.example.com/s/1").unwrap();
        client(&transport).delete(&session).await;
        assert_eq!(transport.requests_for(&Method::DELETE).len(), 1);
    }
}
