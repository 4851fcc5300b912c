//! HTTP transport used for WHEP signaling.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::{Result, WhepError};

/// Sends a fully buffered request and returns the fully buffered response.
///
/// Any status code is a successful exchange; only I/O failures are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>>;
}

/// hyper client over rustls (webpki roots), plain http allowed.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let method = request.method().clone();
        let request = request.map(Full::new);

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| WhepError::Transport(format!("{} request failed: {}", method, e)))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| WhepError::Transport(format!("Failed to read response body: {}", e)))?
            .to_bytes();

        Ok(Response::from_parts(parts, body))
    }
}
