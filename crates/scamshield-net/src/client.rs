//! Secure API client
//!
//! Every call goes through the same pipeline regardless of strategy:
//! rate limit -> security headers -> optional body encryption -> transport
//! -> status mapping -> optional response decryption.

use crate::certificate::CertificateValidator;
use crate::rate_limit::{endpoint_key, RateLimiter};
use crate::transport::{
    PinnedTransport, PreparedRequest, RawResponse, StandardTransport, Transport, TransportKind,
};
use crate::{Error, Result};
use http::Method;
use parking_lot::RwLock;
use scamshield_storage::{Platform, TransportCipher};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Unique id per request
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
/// Client clock, milliseconds since epoch
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
/// Client platform name
pub const HEADER_PLATFORM: &str = "X-Platform";
/// Client app version
pub const HEADER_APP_VERSION: &str = "X-App-Version";
/// `"true"` when the body is transport-encrypted
pub const HEADER_ENCRYPTED: &str = "X-Encrypted";
/// Base64 IV of an encrypted body
pub const HEADER_ENCRYPTION_IV: &str = "X-Encryption-IV";
/// `"true"` when the client wants an encrypted response
pub const HEADER_ACCEPT_ENCRYPTED: &str = "X-Accept-Encrypted";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative URLs
    pub base_url: String,
    /// Sent as `X-App-Version`
    pub app_version: String,
    /// Sent as `X-Platform`
    pub platform: Platform,
    /// Apply the per-endpoint limiter
    pub rate_limiting_enabled: bool,
    /// Calls per endpoint per 60s window
    pub requests_per_minute: u32,
    /// Encrypt bodies when a shared secret is set
    pub transport_encryption_enabled: bool,
    /// Pre-shared transport secret
    pub shared_secret: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: Platform::current(),
            rate_limiting_enabled: true,
            requests_per_minute: 60,
            transport_encryption_enabled: false,
            shared_secret: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Decoded API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Body, decrypted when the server encrypted it
    pub body: String,
    /// Server flagged the body as encrypted
    pub was_encrypted: bool,
}

impl ApiResponse {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Request pipeline with headers, rate limiting and transport encryption
pub struct SecureTransportClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    rate_limiter: RateLimiter,
    cipher: Option<TransportCipher>,
    auth_token: RwLock<Option<String>>,
}

impl SecureTransportClient {
    /// Create client; uses the pinned strategy when a validator with pinning
    /// enabled is supplied, the standard one otherwise
    pub fn new(config: ClientConfig, validator: Option<Arc<CertificateValidator>>) -> Result<Self> {
        let transport: Arc<dyn Transport> = match validator {
            Some(validator) if validator.is_enabled() => {
                Arc::new(PinnedTransport::new(validator, config.timeout))
            }
            _ => Arc::new(StandardTransport::new(config.timeout)?),
        };
        Self::with_transport(config, transport)
    }

    /// Create client on an explicit transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let cipher = match (config.transport_encryption_enabled, &config.shared_secret) {
            (true, Some(secret)) => Some(TransportCipher::from_shared_secret(secret)?),
            (true, None) => {
                warn!("Transport encryption enabled without a shared secret; sending plaintext");
                None
            }
            _ => None,
        };

        info!(
            "Secure transport client ready (transport={:?}, encryption={}, rate_limit={})",
            transport.kind(),
            cipher.is_some(),
            config.rate_limiting_enabled
        );

        Ok(Self {
            rate_limiter: RateLimiter::new(config.requests_per_minute),
            config,
            transport,
            cipher,
            auth_token: RwLock::new(None),
        })
    }

    /// Active strategy
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Whether bodies are transport-encrypted
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    /// Limiter state
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Attach a bearer token to subsequent requests
    pub fn set_auth_token(&self, token: impl Into<String>) {
        *self.auth_token.write() = Some(token.into());
        debug!("Auth token set");
    }

    /// Stop sending a bearer token
    pub fn clear_auth_token(&self) {
        *self.auth_token.write() = None;
        debug!("Auth token cleared");
    }

    /// Whether a bearer token is set
    pub fn has_auth_token(&self) -> bool {
        self.auth_token.read().is_some()
    }

    /// Send a request through the pipeline
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let url = self.resolve_url(url);

        if self.config.rate_limiting_enabled {
            self.rate_limiter.check(&endpoint_key(&url))?;
        }

        let prepared = self.prepare(method, url, body)?;
        debug!(
            "{} {} via {:?} (encrypted={})",
            prepared.method,
            prepared.url,
            self.transport.kind(),
            prepared.header(HEADER_ENCRYPTED).is_some()
        );

        let raw = self.transport.send(prepared).await.map_err(|e| {
            warn!("Request failed: {}", e);
            e
        })?;
        self.finish(raw)
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") || self.config.base_url.is_empty() {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    fn prepare(
        &self,
        method: Method,
        url: String,
        body: Option<&serde_json::Value>,
    ) -> Result<PreparedRequest> {
        let mut headers = vec![
            (
                HEADER_REQUEST_ID.to_string(),
                uuid::Uuid::new_v4().to_string(),
            ),
            (
                HEADER_TIMESTAMP.to_string(),
                chrono::Utc::now().timestamp_millis().to_string(),
            ),
            (
                HEADER_PLATFORM.to_string(),
                self.config.platform.name().to_string(),
            ),
            (
                HEADER_APP_VERSION.to_string(),
                self.config.app_version.clone(),
            ),
            ("Accept".to_string(), "application/json".to_string()),
        ];

        if let Some(token) = self.auth_token.read().as_ref() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let body = match body {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        let body = match &self.cipher {
            Some(cipher) => {
                headers.push((HEADER_ENCRYPTED.to_string(), "true".to_string()));
                headers.push((HEADER_ACCEPT_ENCRYPTED.to_string(), "true".to_string()));
                match body {
                    Some(plaintext) => {
                        let payload = cipher.encrypt(&plaintext);
                        headers.push((HEADER_ENCRYPTION_IV.to_string(), payload.iv));
                        headers.push(("Content-Type".to_string(), "text/plain".to_string()));
                        Some(payload.ciphertext)
                    }
                    None => None,
                }
            }
            None => {
                if body.is_some() {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                body
            }
        };

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
        })
    }

    fn finish(&self, raw: RawResponse) -> Result<ApiResponse> {
        if !(200..300).contains(&raw.status) {
            let error = Error::from_status(raw.status);
            warn!("Server responded {}: {}", raw.status, error);
            return Err(error);
        }

        let encrypted = raw
            .header(HEADER_ENCRYPTED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if !encrypted {
            return Ok(ApiResponse {
                status: raw.status,
                headers: raw.headers,
                body: raw.body,
                was_encrypted: false,
            });
        }

        let cipher = self.cipher.as_ref().ok_or_else(|| {
            Error::Crypto(scamshield_storage::Error::Decryption(
                "Encrypted response but transport encryption is not configured".to_string(),
            ))
        })?;
        let iv = raw.header(HEADER_ENCRYPTION_IV).ok_or_else(|| {
            Error::Crypto(scamshield_storage::Error::Decryption(
                "Encrypted response missing IV header".to_string(),
            ))
        })?;
        let body = cipher.decrypt(&raw.body, iv)?;

        Ok(ApiResponse {
            status: raw.status,
            headers: raw.headers,
            body,
            was_encrypted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Transport double that records requests and replays a canned response
    struct Recording {
        requests: Mutex<Vec<PreparedRequest>>,
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Recording {
        fn ok(body: &str) -> Self {
            Self::with_status(200, body)
        }

        fn with_status(status: u16, body: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }
        }

        fn last(&self) -> PreparedRequest {
            self.requests.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for Recording {
        fn kind(&self) -> TransportKind {
            TransportKind::Standard
        }

        async fn send(&self, request: PreparedRequest) -> Result<RawResponse> {
            self.requests.lock().push(request);
            Ok(RawResponse {
                status: self.status,
                headers: self.headers.clone(),
                body: self.body.clone(),
            })
        }
    }

    fn config() -> ClientConfig {
        ClientConfig {
            base_url: "https://api.example.com/v1".to_string(),
            app_version: "2.3.0".to_string(),
            platform: Platform::Android,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_security_headers() {
        let transport = Arc::new(Recording::ok("{}"));
        let client = SecureTransportClient::with_transport(config(), transport.clone()).unwrap();

        client.request(Method::GET, "/lessons", None).await.unwrap();
        let first = transport.last();
        client.request(Method::GET, "/lessons", None).await.unwrap();
        let second = transport.last();

        assert_eq!(first.url, "https://api.example.com/v1/lessons");
        assert_eq!(first.header(HEADER_PLATFORM), Some("android"));
        assert_eq!(first.header(HEADER_APP_VERSION), Some("2.3.0"));
        assert!(first.header(HEADER_TIMESTAMP).is_some());
        assert!(first.header("Authorization").is_none());
        assert_ne!(first.header(HEADER_REQUEST_ID), second.header(HEADER_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_auth_token_lifecycle() {
        let transport = Arc::new(Recording::ok("{}"));
        let client = SecureTransportClient::with_transport(config(), transport.clone()).unwrap();

        client.set_auth_token("tok-123");
        client.request(Method::GET, "/profile", None).await.unwrap();
        assert_eq!(transport.last().header("Authorization"), Some("Bearer tok-123"));

        client.clear_auth_token();
        client.request(Method::GET, "/profile", None).await.unwrap();
        assert!(transport.last().header("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_plain_json_body() {
        let transport = Arc::new(Recording::ok(r#"{"ok":true}"#));
        let client = SecureTransportClient::with_transport(config(), transport.clone()).unwrap();

        let response = client
            .request(
                Method::POST,
                "/reports",
                Some(&serde_json::json!({"kind": "phishing"})),
            )
            .await
            .unwrap();

        let sent = transport.last();
        assert_eq!(sent.header("Content-Type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"kind":"phishing"}"#));
        assert!(sent.header(HEADER_ENCRYPTED).is_none());
        assert!(!response.was_encrypted);
        assert_eq!(response.json::<serde_json::Value>().unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_encrypted_body_and_response() {
        let server = TransportCipher::from_shared_secret("pre-shared").unwrap();
        let reply = server.encrypt(r#"{"saved":true}"#);
        let transport = Arc::new(Recording {
            requests: Mutex::new(Vec::new()),
            status: 200,
            headers: vec![
                ("x-encrypted".to_string(), "true".to_string()),
                ("x-encryption-iv".to_string(), reply.iv.clone()),
            ],
            body: reply.ciphertext.clone(),
        });

        let client = SecureTransportClient::with_transport(
            ClientConfig {
                transport_encryption_enabled: true,
                shared_secret: Some("pre-shared".to_string()),
                ..config()
            },
            transport.clone(),
        )
        .unwrap();
        assert!(client.is_encrypting());

        let response = client
            .request(Method::POST, "/goals", Some(&serde_json::json!({"goal": 3})))
            .await
            .unwrap();

        let sent = transport.last();
        assert_eq!(sent.header(HEADER_ENCRYPTED), Some("true"));
        assert_eq!(sent.header(HEADER_ACCEPT_ENCRYPTED), Some("true"));
        assert_eq!(sent.header("Content-Type"), Some("text/plain"));
        let iv = sent.header(HEADER_ENCRYPTION_IV).unwrap();
        let body = sent.body.as_deref().unwrap();
        assert_eq!(server.decrypt(body, iv).unwrap(), r#"{"goal":3}"#);

        assert!(response.was_encrypted);
        assert_eq!(response.body, r#"{"saved":true}"#);
    }

    #[tokio::test]
    async fn test_encryption_without_secret_sends_plaintext() {
        let transport = Arc::new(Recording::ok("{}"));
        let client = SecureTransportClient::with_transport(
            ClientConfig {
                transport_encryption_enabled: true,
                shared_secret: None,
                ..config()
            },
            transport.clone(),
        )
        .unwrap();

        client
            .request(Method::POST, "/goals", Some(&serde_json::json!({})))
            .await
            .unwrap();
        assert!(!client.is_encrypting());
        assert!(transport.last().header(HEADER_ENCRYPTED).is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        for (status, expected) in [
            (401u16, "AuthenticationRequired"),
            (403, "AccessForbidden"),
            (404, "NotFound"),
            (429, "RateLimited"),
            (500, "ServerError { status: 500 }"),
        ] {
            let transport = Arc::new(Recording::with_status(status, ""));
            let client = SecureTransportClient::with_transport(config(), transport).unwrap();
            let error = client.request(Method::GET, "/lessons", None).await.unwrap_err();
            assert_eq!(format!("{:?}", error), expected);
        }
    }

    #[tokio::test]
    async fn test_encrypted_response_without_iv_fails() {
        let transport = Arc::new(Recording {
            requests: Mutex::new(Vec::new()),
            status: 200,
            headers: vec![("X-Encrypted".to_string(), "true".to_string())],
            body: "AAAA".to_string(),
        });
        let client = SecureTransportClient::with_transport(
            ClientConfig {
                transport_encryption_enabled: true,
                shared_secret: Some("pre-shared".to_string()),
                ..config()
            },
            transport,
        )
        .unwrap();

        assert!(matches!(
            client.request(Method::GET, "/lessons", None).await,
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_absolute_url_is_kept() {
        let client =
            SecureTransportClient::with_transport(config(), Arc::new(Recording::ok(""))).unwrap();
        assert_eq!(
            client.resolve_url("https://cdn.example.com/x"),
            "https://cdn.example.com/x"
        );
        assert_eq!(client.resolve_url("reports"), "https://api.example.com/v1/reports");
    }
}
