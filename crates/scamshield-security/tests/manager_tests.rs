//! End-to-end tests for the security manager

use async_trait::async_trait;
use futures::future::join_all;
use scamshield_net::{
    FetchError, Method, PinnedFetch, PinnedRequest, PinnedResponse, PreparedRequest, RawResponse,
    Transport, TransportKind, ValidationOutcome,
};
use scamshield_security::{
    BuildMode, Error, PermissionManifest, SecurityConfig, SecurityManager, StaticEnvironment,
};
use scamshield_storage::{MemoryKeyStore, Platform, ENCRYPTION_KEY_ENTRY};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

const PINNED: &str = "sha256/47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=";

struct Presenting(&'static str);

#[async_trait]
impl PinnedFetch for Presenting {
    async fn fetch(
        &self,
        _request: PinnedRequest,
        allowed: &BTreeSet<String>,
    ) -> Result<PinnedResponse, FetchError> {
        if !allowed.is_empty() && !allowed.contains(self.0) {
            return Err(FetchError::CertificateMismatch {
                domain: "api.example.com".to_string(),
                presented: self.0.to_string(),
            });
        }
        Ok(PinnedResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        })
    }
}

struct Echo;

#[async_trait]
impl Transport for Echo {
    fn kind(&self) -> TransportKind {
        TransportKind::Standard
    }

    async fn send(&self, request: PreparedRequest) -> scamshield_net::Result<RawResponse> {
        let auth = request.header("Authorization").unwrap_or("none").to_string();
        Ok(RawResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::json!({ "url": request.url, "auth": auth }).to_string(),
        })
    }
}

fn pinned_config(mode: BuildMode) -> SecurityConfig {
    let mut config = SecurityConfig::from_json_str(&format!(
        r#"{{"ssl_pinning": {{"pins": [{{"domain": "api.example.com", "primary_fingerprint": "{}"}}]}}}}"#,
        PINNED
    ))
    .unwrap();
    config.build_mode = mode;
    config
}

fn build(
    config: SecurityConfig,
    store: Arc<MemoryKeyStore>,
    env: StaticEnvironment,
) -> SecurityManager {
    SecurityManager::builder(config, store)
        .environment(Arc::new(env))
        .pinned_fetch(Arc::new(Presenting("47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=")))
        .transport(Arc::new(Echo))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_simulated_root_marker_reported() {
    let env = StaticEnvironment::new(Platform::Android).with_path("/system/xbin/su");
    let manager = build(
        pinned_config(BuildMode::Development),
        Arc::new(MemoryKeyStore::new()),
        env,
    );

    let status = manager.perform_security_check().await.unwrap();
    assert!(!status.device_security.is_secure);
    assert!(!status.is_secure);
    assert!(status.device_security.threats.iter().any(|t| t.contains("Root")));
    assert_eq!(status.violations, status.device_security.threats);
}

#[tokio::test]
async fn test_root_marker_survives_unreadable_properties() {
    let env = StaticEnvironment::new(Platform::Android)
        .with_path("/sbin/su")
        .with_unreadable_properties();
    let manager = build(
        pinned_config(BuildMode::Development),
        Arc::new(MemoryKeyStore::new()),
        env,
    );

    let status = manager.perform_security_check().await.unwrap();
    assert!(!status.is_secure);
    assert!(status
        .device_security
        .threats
        .iter()
        .any(|t| t == "Root access detected: /sbin/su"));
    assert!(status.device_security.details.get("skipped_checks").is_none());
}

#[tokio::test]
async fn test_concurrent_initialize_runs_once() {
    let store = Arc::new(MemoryKeyStore::new());
    let manager = build(
        pinned_config(BuildMode::Production),
        Arc::clone(&store),
        StaticEnvironment::new(Platform::Android),
    );

    let results = join_all((0..8).map(|_| manager.initialize())).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert!(manager.is_initialized());

    // two key entries plus five baseline flags, written once
    assert_eq!(store.write_count(), 7);

    manager.initialize().await.unwrap();
    assert_eq!(store.write_count(), 7);
}

#[tokio::test]
async fn test_violation_fatal_in_production() {
    let env = StaticEnvironment::new(Platform::Android).with_path("/sbin/magisk");
    let manager = build(
        pinned_config(BuildMode::Production),
        Arc::new(MemoryKeyStore::new()),
        env,
    );

    let result = manager.initialize().await;
    assert!(matches!(result, Err(Error::Initialization(ref msg)) if msg.contains("/sbin/magisk")));
    assert!(!manager.is_initialized());
    assert!(matches!(
        manager.encrypt_data("secret").await,
        Err(Error::NotInitialized)
    ));
}

#[tokio::test]
async fn test_violation_warning_in_development() {
    let env = StaticEnvironment::new(Platform::Android).with_path("/sbin/magisk");
    let manager = build(
        pinned_config(BuildMode::Development),
        Arc::new(MemoryKeyStore::new()),
        env,
    );

    manager.initialize().await.unwrap();
    let ciphertext = manager.encrypt_data("secret").await.unwrap();
    assert_eq!(manager.decrypt_data(&ciphertext).await.unwrap(), "secret");
}

#[tokio::test]
async fn test_baseline_settings_applied() {
    let manager = build(
        pinned_config(BuildMode::Production),
        Arc::new(MemoryKeyStore::new()),
        StaticEnvironment::new(Platform::Ios),
    );

    let before = manager.perform_security_check().await.unwrap();
    assert_eq!(before.warnings.len(), 5);

    manager.initialize().await.unwrap();
    let after = manager.perform_security_check().await.unwrap();
    assert!(after.app_security.screenshot_disabled);
    assert!(after.warnings.is_empty());
    assert!(after.ssl_pinning.initialized);
}

#[tokio::test]
async fn test_rotation_and_logout() {
    let store = Arc::new(MemoryKeyStore::new());
    let manager = build(
        pinned_config(BuildMode::Production),
        Arc::clone(&store),
        StaticEnvironment::new(Platform::Android),
    );
    manager.initialize().await.unwrap();

    let old = manager.encrypt_data("before rotation").await.unwrap();
    manager.rotate_keys().await.unwrap();
    assert!(manager.decrypt_data(&old).await.is_err());

    manager.set_auth_token("token-1");
    manager.logout().await.unwrap();
    assert!(!store.contains(ENCRYPTION_KEY_ENTRY));

    let response = manager
        .secure_api_request(Method::GET, "/profile", None)
        .await
        .unwrap();
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["auth"], "none");
}

#[tokio::test]
async fn test_api_request_carries_token() {
    let manager = build(
        pinned_config(BuildMode::Production),
        Arc::new(MemoryKeyStore::new()),
        StaticEnvironment::new(Platform::Android),
    );
    manager.set_auth_token("abc");

    let response = manager
        .secure_api_request(Method::POST, "/reports", Some(&serde_json::json!({"k": 1})))
        .await
        .unwrap();
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["auth"], "Bearer abc");
    assert_eq!(body["url"], "https://api.scamshield.app/v1/reports");

    manager.clear_auth_token();
    let body: serde_json::Value = manager
        .secure_api_request(Method::GET, "/reports", None)
        .await
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["auth"], "none");
}

#[tokio::test]
async fn test_certificate_validation_through_manager() {
    let manager = build(
        pinned_config(BuildMode::Production),
        Arc::new(MemoryKeyStore::new()),
        StaticEnvironment::new(Platform::Android),
    );
    assert_eq!(
        manager.validate_ssl_certificate("api.example.com").await,
        ValidationOutcome::Valid
    );
    assert_eq!(
        manager.validate_ssl_certificate("unpinned.example.org").await,
        ValidationOutcome::Valid
    );

    let mismatched = SecurityManager::builder(
        pinned_config(BuildMode::Production),
        Arc::new(MemoryKeyStore::new()),
    )
    .environment(Arc::new(StaticEnvironment::new(Platform::Android)))
    .pinned_fetch(Arc::new(Presenting("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")))
    .build()
    .unwrap();
    assert_eq!(
        mismatched.validate_ssl_certificate("api.example.com").await,
        ValidationOutcome::InvalidFingerprint
    );

    let status = mismatched.get_ssl_pinning_status();
    assert_eq!(status.pinned_domains, vec!["api.example.com"]);
}

#[tokio::test]
async fn test_config_file_and_audit() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "rate_limiting": {{"enabled": false}},
            "permissions": {{"allowed": ["INTERNET", "ACCESS_NETWORK_STATE"]}},
            "ssl_pinning": {{"pins": [{{"domain": "api.example.com", "primary_fingerprint": "{}"}}]}},
            "build_mode": "production"
        }}"#,
        PINNED
    )
    .unwrap();

    let config = SecurityConfig::from_file(file.path()).unwrap();
    assert!(config.build_mode.is_production());

    let manager = build(
        config,
        Arc::new(MemoryKeyStore::new()),
        StaticEnvironment::new(Platform::Android),
    );
    let manifest = PermissionManifest::new(["android.permission.INTERNET", "android.permission.CAMERA"]);
    let issues = manager.validate_security_requirements(Some(&manifest));

    assert_eq!(issues.len(), 2, "{:#?}", issues);
    assert!(issues.iter().any(|i| i.contains("Rate limiting")));
    assert!(issues.iter().any(|i| i.contains("CAMERA")));
}

#[test]
fn test_missing_config_file() {
    let result = SecurityConfig::from_file("/definitely/not/here/scamshield.json");
    assert!(matches!(result, Err(Error::Io(_))));
}
