//! Pinning-aware fetch primitive
//!
//! The certificate check happens on the raw TLS stream, before any request
//! bytes are written, so a mismatched server never sees the request.

use crate::pinning::certificate_fingerprint;
use async_trait::async_trait;
use http::{Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use native_tls::TlsConnector as NativeTlsConnector;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;
use tracing::debug;

/// Request handed to a [`PinnedFetch`]
#[derive(Debug, Clone)]
pub struct PinnedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute `https://` URL
    pub url: String,
    /// Header pairs
    pub headers: Vec<(String, String)>,
    /// Optional body
    pub body: Option<Vec<u8>>,
    /// Whole-exchange timeout
    pub timeout: Duration,
}

impl PinnedRequest {
    /// Bodiless request with no extra headers
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }
}

/// Response from a [`PinnedFetch`]
#[derive(Debug, Clone)]
pub struct PinnedResponse {
    /// Status code
    pub status: u16,
    /// Header pairs (non-UTF-8 values dropped)
    pub headers: Vec<(String, String)>,
    /// Body bytes
    pub body: Vec<u8>,
}

/// Failures a pinned fetch distinguishes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Presented certificate not in the allowed set
    #[error("Certificate mismatch for {domain}: presented {presented}")]
    CertificateMismatch {
        /// Host contacted
        domain: String,
        /// Fingerprint the server presented
        presented: String,
    },
    /// TLS handshake refused the server's certificate (chain, hostname,
    /// expiry). Not transient.
    #[error("Certificate rejected for {domain}: {reason}")]
    CertificateRejected {
        /// Host contacted
        domain: String,
        /// Handshake error
        reason: String,
    },
    /// Exchange exceeded its timeout
    #[error("Request timed out")]
    Timeout,
    /// Anything else (DNS, TCP, HTTP framing)
    #[error("Network error: {0}")]
    Network(String),
}

/// Fetch that only talks to servers presenting an allowed fingerprint
///
/// An empty `allowed` set disables the fingerprint check for that call.
#[async_trait]
pub trait PinnedFetch: Send + Sync {
    /// Perform the exchange
    async fn fetch(
        &self,
        request: PinnedRequest,
        allowed: &BTreeSet<String>,
    ) -> Result<PinnedResponse, FetchError>;
}

/// [`PinnedFetch`] over tokio-native-tls and hyper HTTP/1.1
///
/// Normal chain and hostname validation stay on; the pin is an extra check
/// on top of the platform trust store.
pub struct NativeTlsPinnedFetch {
    connector: TlsConnector,
}

impl NativeTlsPinnedFetch {
    /// Create fetcher with the platform TLS defaults
    pub fn new() -> Result<Self, FetchError> {
        let connector = NativeTlsConnector::builder()
            .build()
            .map_err(|e| FetchError::Network(format!("TLS connector build failed: {}", e)))?;
        Ok(Self {
            connector: TlsConnector::from(connector),
        })
    }

    async fn exchange(
        &self,
        request: PinnedRequest,
        allowed: &BTreeSet<String>,
    ) -> Result<PinnedResponse, FetchError> {
        let uri: Uri = request
            .url
            .parse()
            .map_err(|e| FetchError::Network(format!("Invalid URL {}: {}", request.url, e)))?;
        if uri.scheme_str() != Some("https") {
            return Err(FetchError::Network(format!(
                "Pinned fetch requires https: {}",
                request.url
            )));
        }
        let host = uri
            .host()
            .ok_or_else(|| FetchError::Network("URL missing host".to_string()))?
            .to_string();
        let port = uri.port_u16().unwrap_or(443);
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| host.clone());

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| FetchError::Network(format!("Connect to {}:{} failed: {}", host, port, e)))?;
        let tls = self
            .connector
            .connect(&host, tcp)
            .await
            .map_err(|e| FetchError::CertificateRejected {
                domain: host.clone(),
                reason: e.to_string(),
            })?;

        let cert = tls
            .get_ref()
            .peer_certificate()
            .map_err(|e| FetchError::Network(format!("TLS peer certificate error: {}", e)))?
            .ok_or_else(|| FetchError::Network("No peer certificate presented".to_string()))?;
        let der = cert
            .to_der()
            .map_err(|e| FetchError::Network(format!("Failed to read DER certificate: {}", e)))?;
        let presented = certificate_fingerprint(&der);

        if !allowed.is_empty() && !allowed.contains(&presented) {
            return Err(FetchError::CertificateMismatch {
                domain: host,
                presented,
            });
        }
        debug!("Pinned certificate accepted for {}", host);

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(tls))
                .await
                .map_err(|e| FetchError::Network(format!("HTTP handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Pinned connection closed: {}", e);
            }
        });

        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(path)
            .header(http::header::HOST, authority);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(Full::new(Bytes::from(request.body.unwrap_or_default())))
            .map_err(|e| FetchError::Network(format!("Invalid request: {}", e)))?;

        let response = sender
            .send_request(http_request)
            .await
            .map_err(|e| FetchError::Network(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to read body: {}", e)))?
            .to_bytes()
            .to_vec();

        Ok(PinnedResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl PinnedFetch for NativeTlsPinnedFetch {
    async fn fetch(
        &self,
        request: PinnedRequest,
        allowed: &BTreeSet<String>,
    ) -> Result<PinnedResponse, FetchError> {
        let timeout = request.timeout;
        tokio::time::timeout(timeout, self.exchange(request, allowed))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}
