//! Security manager
//!
//! The one entry point the app talks to. Owns the encryption service, the
//! settings store, the certificate validator, the integrity checker and the
//! API client, and wires them together from a [`SecurityConfig`].

use crate::config::SecurityConfig;
use crate::integrity::{DeviceEnvironment, DeviceIntegrityChecker, HostEnvironment, SecurityProbe};
use crate::requirements::{validate_security_requirements, PermissionManifest};
use crate::status::{DeviceInfo, SecurityStatus};
use crate::{Error, Result};
use scamshield_net::{
    ApiResponse, CertificateValidator, DebugLogEntry, Method, PinnedFetch, PinningStatus,
    SecureTransportClient, Transport, ValidationOutcome,
};
use scamshield_storage::{EncryptionService, KeyStore, SecuritySettings};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Optional collaborators for [`SecurityManager`]
pub struct SecurityManagerBuilder {
    config: SecurityConfig,
    store: Arc<dyn KeyStore>,
    environment: Option<Arc<dyn DeviceEnvironment>>,
    probes: Option<Vec<Box<dyn SecurityProbe>>>,
    pinned_fetch: Option<Arc<dyn PinnedFetch>>,
    transport: Option<Arc<dyn Transport>>,
}

impl SecurityManagerBuilder {
    /// Device signal source (defaults to the host)
    pub fn environment(mut self, environment: Arc<dyn DeviceEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Replace the standard probe set
    pub fn probes(mut self, probes: Vec<Box<dyn SecurityProbe>>) -> Self {
        self.probes = Some(probes);
        self
    }

    /// Pinned fetch primitive (defaults to native TLS)
    pub fn pinned_fetch(mut self, fetch: Arc<dyn PinnedFetch>) -> Self {
        self.pinned_fetch = Some(fetch);
        self
    }

    /// Transport for API requests (defaults to pinned or standard per config)
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate config and assemble the manager
    pub fn build(self) -> Result<SecurityManager> {
        let config = self.config;
        config.validate()?;

        let validator = Arc::new(match self.pinned_fetch {
            Some(fetch) => CertificateValidator::new(config.ssl_pinning.clone(), fetch)?,
            None => CertificateValidator::with_native_tls(config.ssl_pinning.clone())?,
        });

        let client_config = config.client_config();
        let client = match self.transport {
            Some(transport) => SecureTransportClient::with_transport(client_config, transport)?,
            None => SecureTransportClient::new(client_config, Some(Arc::clone(&validator)))?,
        };

        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(HostEnvironment::new()));
        let probes = self
            .probes
            .unwrap_or_else(|| DeviceIntegrityChecker::default_probes(config.root_detection.enabled));
        let checker = DeviceIntegrityChecker::with_probes(Arc::clone(&environment), probes);

        info!(
            "Security manager created: build_mode={:?} transport={:?} probes={:?}",
            config.build_mode,
            client.transport_kind(),
            checker.probe_names()
        );

        Ok(SecurityManager {
            encryption: EncryptionService::with_algorithm(
                Arc::clone(&self.store),
                config.encryption.algorithm,
            ),
            settings: SecuritySettings::new(self.store),
            validator,
            checker,
            client,
            environment,
            config,
            initialized: OnceCell::new(),
        })
    }
}

/// Façade over the security subsystem
pub struct SecurityManager {
    config: SecurityConfig,
    encryption: EncryptionService,
    settings: SecuritySettings,
    validator: Arc<CertificateValidator>,
    checker: DeviceIntegrityChecker,
    client: SecureTransportClient,
    environment: Arc<dyn DeviceEnvironment>,
    initialized: OnceCell<()>,
}

#[allow(dead_code)]
fn _assert_security_manager_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SecurityManager>();
}

impl SecurityManager {
    /// Manager with host environment and native TLS pinning
    pub fn new(config: SecurityConfig, store: Arc<dyn KeyStore>) -> Result<Self> {
        Self::builder(config, store).build()
    }

    /// Builder for injecting collaborators
    pub fn builder(config: SecurityConfig, store: Arc<dyn KeyStore>) -> SecurityManagerBuilder {
        SecurityManagerBuilder {
            config,
            store,
            environment: None,
            probes: None,
            pinned_fetch: None,
            transport: None,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Initialize keys, baseline settings and pinning, then run one check.
    ///
    /// Concurrent callers share a single in-flight initialization. In
    /// production builds any violation fails initialization; a failed
    /// attempt can be retried.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| self.run_initialization())
            .await?;
        Ok(())
    }

    /// `initialize` has completed
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    async fn run_initialization(&self) -> Result<()> {
        info!("Initializing security subsystem");

        if self.config.encryption.enabled {
            self.encryption.initialize().await?;
        } else {
            warn!("Local encryption disabled by configuration");
        }
        self.settings.apply_baseline().await?;
        self.validator.initialize();

        let status = self.perform_security_check().await?;
        for warning in &status.warnings {
            warn!("Security warning: {}", warning);
        }

        if !status.is_secure {
            let summary = status.violations.join("; ");
            if self.config.build_mode.is_production() {
                return Err(Error::Initialization(format!(
                    "Security violations detected: {}",
                    summary
                )));
            }
            warn!(
                "Security violations detected (development build, continuing): {}",
                summary
            );
        }

        info!("Security subsystem initialized");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn ensure_encryption(&self) -> Result<()> {
        self.ensure_initialized()?;
        if !self.config.encryption.enabled {
            return Err(Error::Config("Local encryption is disabled".to_string()));
        }
        Ok(())
    }

    /// Run the device check and combine it with app, encryption and
    /// pinning state. Never cached.
    pub async fn perform_security_check(&self) -> Result<SecurityStatus> {
        let device = self.checker.perform_security_check().await;
        let app = self.settings.snapshot().await?;
        let status = SecurityStatus::assemble(
            device,
            app,
            self.config.encryption.enabled,
            self.validator.status(),
        );
        debug!(
            "Security check: secure={} violations={} warnings={}",
            status.is_secure,
            status.violations.len(),
            status.warnings.len()
        );
        Ok(status)
    }

    /// Encrypt for local storage
    pub async fn encrypt_data(&self, plaintext: &str) -> Result<String> {
        self.ensure_encryption()?;
        Ok(self.encryption.encrypt(plaintext).await?)
    }

    /// Decrypt a payload from [`encrypt_data`](Self::encrypt_data)
    pub async fn decrypt_data(&self, payload: &str) -> Result<String> {
        self.ensure_encryption()?;
        Ok(self.encryption.decrypt(payload).await?)
    }

    /// SHA-256 hex digest
    pub fn generate_hash(&self, data: &str) -> String {
        self.encryption.generate_hash(data)
    }

    /// Replace the local keys; older ciphertext becomes unreadable
    pub async fn rotate_keys(&self) -> Result<()> {
        self.ensure_encryption()?;
        Ok(self.encryption.rotate_keys().await?)
    }

    /// API request through the secure client
    pub async fn secure_api_request(
        &self,
        method: Method,
        url: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        Ok(self.client.request(method, url, data).await?)
    }

    /// Attach a bearer token to subsequent requests
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.client.set_auth_token(token);
    }

    /// Drop the bearer token
    pub fn clear_auth_token(&self) {
        self.client.clear_auth_token();
    }

    /// Clear the auth token and the local keys
    pub async fn logout(&self) -> Result<()> {
        self.client.clear_auth_token();
        self.encryption.clear_keys().await?;
        info!("Logged out; credentials and keys cleared");
        Ok(())
    }

    /// Pinning status snapshot
    pub fn get_ssl_pinning_status(&self) -> PinningStatus {
        self.validator.status()
    }

    /// Validate a domain against its pins
    pub async fn validate_ssl_certificate(&self, domain: &str) -> ValidationOutcome {
        self.validator.validate_certificate(domain).await
    }

    /// Pinning debug log entries, oldest first
    pub fn ssl_debug_log(&self) -> Vec<DebugLogEntry> {
        self.validator.debug_log()
    }

    /// Platform and build facts
    pub fn get_device_info(&self) -> DeviceInfo {
        let platform = self.environment.platform();
        DeviceInfo {
            platform,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            is_mobile: platform.is_mobile(),
            debug_build: self.environment.is_debug_build(),
            build_mode: self.config.build_mode,
            app_version: self.config.api.app_version.clone(),
            ssl_pinning_supported: self.validator.supported_platforms().contains(&platform),
            encryption_algorithm: self.encryption.algorithm(),
        }
    }

    /// Static configuration audit
    pub fn validate_security_requirements(
        &self,
        manifest: Option<&PermissionManifest>,
    ) -> Vec<String> {
        validate_security_requirements(&self.config, manifest)
    }
}
