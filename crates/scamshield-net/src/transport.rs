//! Transport strategies
//!
//! Both variants receive a fully prepared request (headers and encryption
//! already applied) and hand back the raw response, so the request pipeline
//! above them is shared.

use crate::certificate::{host_of, CertificateValidator};
use crate::pinned_fetch::{FetchError, PinnedRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Which strategy a client runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// General-purpose HTTP client
    Standard,
    /// Certificate-pinning fetch
    Pinned,
}

/// Request after headers and body encryption
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Header pairs
    pub headers: Vec<(String, String)>,
    /// Body, already serialized or encrypted
    pub body: Option<String>,
}

impl PreparedRequest {
    /// First value of a header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response before status mapping and decryption
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code
    pub status: u16,
    /// Header pairs
    pub headers: Vec<(String, String)>,
    /// Body text
    pub body: String,
}

impl RawResponse {
    /// First value of a header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Sends prepared requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Strategy variant
    fn kind(&self) -> TransportKind;

    /// Send one request
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse>;
}

/// Strategy over `reqwest`
pub struct StandardTransport {
    client: reqwest::Client,
}

impl StandardTransport {
    /// Create transport with a request timeout
    ///
    /// Redirects are returned to the caller, never followed, so a request
    /// carrying the bearer token is not replayed to another host.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::NetworkFailure(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for StandardTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Standard
    }

    async fn send(&self, request: PreparedRequest) -> Result<RawResponse> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
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
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::NetworkFailure(e.to_string())
    }
}

/// Strategy over the validator's pinned fetch
pub struct PinnedTransport {
    validator: Arc<CertificateValidator>,
    timeout: Duration,
}

impl PinnedTransport {
    /// Create transport sharing the validator's pins and fetch primitive
    pub fn new(validator: Arc<CertificateValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }
}

#[async_trait]
impl Transport for PinnedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pinned
    }

    async fn send(&self, request: PreparedRequest) -> Result<RawResponse> {
        let host = host_of(&request.url);
        let allowed = self.validator.allowed_fingerprints(&host).unwrap_or_default();
        debug!(
            "Pinned {} {} ({} allowed fingerprints)",
            request.method,
            request.url,
            allowed.len()
        );

        let pinned = PinnedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body.map(String::into_bytes),
            timeout: self.timeout,
        };

        let response = self
            .validator
            .fetcher()
            .fetch(pinned, &allowed)
            .await
            .map_err(|e| match e {
                FetchError::CertificateMismatch { .. } | FetchError::CertificateRejected { .. } => {
                    Error::CertificateVerificationFailed { domain: host.clone() }
                }
                FetchError::Timeout => Error::Timeout(format!("{:?}", self.timeout)),
                FetchError::Network(msg) => Error::NetworkFailure(msg),
            })?;

        Ok(RawResponse {
            status: response.status,
            headers: response.headers,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = RawResponse {
            status: 200,
            headers: vec![("x-encrypted".to_string(), "true".to_string())],
            body: String::new(),
        };
        assert_eq!(response.header("X-Encrypted"), Some("true"));
        assert_eq!(response.header("X-Encryption-IV"), None);
    }

    #[test]
    fn test_standard_transport_kind() {
        let transport = StandardTransport::new(Duration::from_secs(5)).unwrap();
        assert_eq!(transport.kind(), TransportKind::Standard);
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let served = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                served.fetch_add(1, Ordering::SeqCst);
                let reply = if head.starts_with(b"GET /elsewhere") {
                    "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                } else {
                    format!(
                        "HTTP/1.1 302 Found\r\nLocation: http://{}/elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        addr
                    )
                };
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        let transport = StandardTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(PreparedRequest {
                method: Method::GET,
                url: format!("http://{}/start", addr),
                headers: vec![("Authorization".to_string(), "Bearer secret".to_string())],
                body: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 302);
        assert!(response.header("Location").is_some_and(|l| l.ends_with("/elsewhere")));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
