//! Static security requirements audit
//!
//! Checks a [`SecurityConfig`] against the minimum bar the app ships with.
//! Nothing here touches the device or the network; the only input besides
//! the config is an optional declared permission manifest.

use crate::config::SecurityConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Permissions the app needs to function
pub const MINIMAL_PERMISSIONS: [&str; 2] = ["INTERNET", "ACCESS_NETWORK_STATE"];

/// Smallest acceptable symmetric key
const MIN_KEY_SIZE_BITS: u32 = 256;

const ANDROID_PERMISSION_PREFIX: &str = "android.permission.";

/// Permissions the app declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionManifest {
    permissions: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestJson {
    List(Vec<String>),
    Object { permissions: Vec<String> },
}

impl PermissionManifest {
    /// Manifest from permission names, short or fully qualified
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            permissions: permissions
                .into_iter()
                .map(|p| normalize_permission(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Parse a JSON list, a `{"permissions": [...]}` object, or an
    /// `AndroidManifest.xml`
    pub fn parse(contents: &str) -> Result<Self> {
        let trimmed = contents.trim_start();
        if trimmed.starts_with('<') {
            return Ok(Self::from_android_manifest(trimmed));
        }
        let parsed: ManifestJson = serde_json::from_str(trimmed)
            .map_err(|e| Error::Config(format!("Invalid permission manifest: {}", e)))?;
        Ok(match parsed {
            ManifestJson::List(permissions) | ManifestJson::Object { permissions } => {
                Self::new(permissions)
            }
        })
    }

    /// Read and parse a manifest file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest = Self::parse(&std::fs::read_to_string(path)?)?;
        debug!(
            "Read {} permission(s) from {}",
            manifest.permissions.len(),
            path.display()
        );
        Ok(manifest)
    }

    fn from_android_manifest(xml: &str) -> Self {
        let mut permissions = Vec::new();
        for element in xml.split('<').filter(|e| e.starts_with("uses-permission")) {
            if let Some(name) = attribute(element, "android:name") {
                permissions.push(name);
            }
        }
        Self::new(permissions)
    }

    /// Declared permissions in short form
    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }
}

fn attribute<'a>(element: &'a str, name: &str) -> Option<&'a str> {
    let start = element.find(&format!("{}=", name))? + name.len() + 1;
    let rest = &element[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    rest.find(quote).map(|end| &rest[..end])
}

/// `android.permission.CAMERA` -> `CAMERA`
pub fn normalize_permission(permission: &str) -> String {
    let permission = permission.trim();
    permission
        .strip_prefix(ANDROID_PERMISSION_PREFIX)
        .unwrap_or(permission)
        .to_ascii_uppercase()
}

/// Compliance issues in `config`; empty when it meets every requirement
pub fn validate_security_requirements(
    config: &SecurityConfig,
    manifest: Option<&PermissionManifest>,
) -> Vec<String> {
    let mut issues = Vec::new();

    let encryption = &config.encryption;
    if !encryption.enabled {
        issues.push("Data encryption is disabled".to_string());
    }
    if encryption.key_size_bits < MIN_KEY_SIZE_BITS {
        issues.push(format!(
            "Encryption key size {} bits is below the required {} bits",
            encryption.key_size_bits, MIN_KEY_SIZE_BITS
        ));
    } else if encryption.key_size_bits != encryption.algorithm.key_size_bits() {
        issues.push(format!(
            "Encryption key size {} bits does not match {}",
            encryption.key_size_bits,
            encryption.algorithm.name()
        ));
    }

    if !config.rate_limiting.enabled {
        issues.push("Rate limiting is disabled".to_string());
    }
    if !config.root_detection.enabled {
        issues.push("Root/jailbreak detection is disabled".to_string());
    }

    if !config.ssl_pinning.enabled {
        issues.push("SSL certificate pinning is disabled".to_string());
    } else if config.ssl_pinning.pins.is_empty() {
        issues.push("SSL certificate pinning has no pinned domains".to_string());
    }

    let transport = &config.transport_encryption;
    if transport.enabled && transport.shared_secret.as_deref().map_or(true, str::is_empty) {
        issues.push("Transport encryption is enabled without a shared secret".to_string());
    }

    if !config.api.base_url.starts_with("https://") {
        issues.push(format!("API base URL is not HTTPS: {}", config.api.base_url));
    }

    let allowed: BTreeSet<String> = config
        .permissions
        .allowed
        .iter()
        .map(|p| normalize_permission(p))
        .collect();
    for permission in &allowed {
        if !MINIMAL_PERMISSIONS.contains(&permission.as_str()) {
            issues.push(format!(
                "Permission {} exceeds the minimal permission set",
                permission
            ));
        }
    }

    if let Some(manifest) = manifest {
        for permission in manifest.permissions() {
            if !allowed.contains(permission) {
                issues.push(format!(
                    "Manifest declares permission {} that is not in the allowed list",
                    permission
                ));
            }
        }
    }

    issues
}
