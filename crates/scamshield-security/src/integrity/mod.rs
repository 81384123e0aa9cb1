//! Device integrity checking

mod environment;
mod probes;

pub use environment::{parse_properties, status_field, DeviceEnvironment, HostEnvironment, StaticEnvironment};
pub use probes::{DebugModeProbe, DevelopmentModeProbe, EmulatorProbe, RootProbe};

use crate::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one probe, or the aggregate of all probes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCheckResult {
    /// No threats found
    pub is_secure: bool,
    /// Human-readable threat descriptions
    pub threats: Vec<String>,
    /// Probe diagnostics
    pub details: BTreeMap<String, Value>,
}

impl SecurityCheckResult {
    /// Build a result; `is_secure` follows from `threats`
    pub fn new(threats: Vec<String>, details: Value) -> Self {
        let details = match details {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => BTreeMap::new(),
            other => BTreeMap::from([("value".to_string(), other)]),
        };
        Self {
            is_secure: threats.is_empty(),
            threats,
            details,
        }
    }
}

/// One integrity heuristic family
#[async_trait]
pub trait SecurityProbe: Send + Sync {
    /// Key under which the probe's details are reported
    fn name(&self) -> &'static str;

    /// Inspect the device
    async fn run(&self, env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult>;
}

/// Runs the probes and merges their findings
pub struct DeviceIntegrityChecker {
    env: Arc<dyn DeviceEnvironment>,
    probes: Vec<Box<dyn SecurityProbe>>,
}

impl DeviceIntegrityChecker {
    /// Checker with every probe
    pub fn new(env: Arc<dyn DeviceEnvironment>) -> Self {
        Self::with_probes(env, Self::default_probes(true))
    }

    /// Checker with an explicit probe set
    pub fn with_probes(env: Arc<dyn DeviceEnvironment>, probes: Vec<Box<dyn SecurityProbe>>) -> Self {
        Self { env, probes }
    }

    /// Standard probe set; the root probe is optional
    pub fn default_probes(root_detection: bool) -> Vec<Box<dyn SecurityProbe>> {
        let mut probes: Vec<Box<dyn SecurityProbe>> = Vec::with_capacity(4);
        if root_detection {
            probes.push(Box::new(RootProbe));
        }
        probes.push(Box::new(EmulatorProbe));
        probes.push(Box::new(DevelopmentModeProbe));
        probes.push(Box::new(DebugModeProbe));
        probes
    }

    /// Names of the configured probes
    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Run every probe
    ///
    /// A probe that errors or panics contributes no threats; its name is
    /// listed under `details["skipped_checks"]` and the remaining probes
    /// still run.
    pub async fn perform_security_check(&self) -> SecurityCheckResult {
        let mut threats = Vec::new();
        let mut details = BTreeMap::new();
        let mut skipped = Vec::new();

        for probe in &self.probes {
            let name = probe.name();
            let outcome = AssertUnwindSafe(probe.run(self.env.as_ref()))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(result)) => {
                    debug!("Probe {} found {} threat(s)", name, result.threats.len());
                    threats.extend(result.threats);
                    details.insert(name.to_string(), serde_json::to_value(result.details).unwrap_or(Value::Null));
                }
                Ok(Err(e)) => {
                    warn!("Probe {} failed: {}", name, e);
                    skipped.push(name);
                }
                Err(_) => {
                    warn!("Probe {} panicked", name);
                    skipped.push(name);
                }
            }
        }

        if !skipped.is_empty() {
            details.insert("skipped_checks".to_string(), Value::from(skipped));
        }

        SecurityCheckResult {
            is_secure: threats.is_empty(),
            threats,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use scamshield_storage::Platform;

    struct Fixed(&'static str, Vec<&'static str>);

    #[async_trait]
    impl SecurityProbe for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(&self, _env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
            Ok(SecurityCheckResult::new(
                self.1.iter().map(|t| t.to_string()).collect(),
                Value::Null,
            ))
        }
    }

    struct Failing;

    #[async_trait]
    impl SecurityProbe for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
            Err(Error::Initialization("probe backend gone".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl SecurityProbe for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn run(&self, _env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
            panic!("probe blew up")
        }
    }

    fn clean_env() -> Arc<dyn DeviceEnvironment> {
        Arc::new(StaticEnvironment::new(Platform::Android))
    }

    #[tokio::test]
    async fn test_threats_are_concatenated() {
        let checker = DeviceIntegrityChecker::with_probes(
            clean_env(),
            vec![
                Box::new(Fixed("a", vec!["one"])),
                Box::new(Fixed("b", vec![])),
                Box::new(Fixed("c", vec!["two", "three"])),
            ],
        );
        let result = checker.perform_security_check().await;
        assert!(!result.is_secure);
        assert_eq!(result.threats, vec!["one", "two", "three"]);
        assert!(!result.details.contains_key("skipped_checks"));
    }

    #[tokio::test]
    async fn test_failing_and_panicking_probes_are_skipped() {
        let checker = DeviceIntegrityChecker::with_probes(
            clean_env(),
            vec![
                Box::new(Failing),
                Box::new(Panicking),
                Box::new(Fixed("after", vec!["still reported"])),
            ],
        );
        let result = checker.perform_security_check().await;
        assert_eq!(result.threats, vec!["still reported"]);
        assert_eq!(
            result.details["skipped_checks"],
            serde_json::json!(["failing", "panicking"])
        );
    }

    #[tokio::test]
    async fn test_clean_device_is_secure() {
        let checker = DeviceIntegrityChecker::new(clean_env());
        let result = checker.perform_security_check().await;
        assert!(result.is_secure);
        assert!(result.threats.is_empty());
        assert_eq!(checker.probe_names(), vec!["root", "emulator", "development", "debug"]);
    }

    #[test]
    fn test_root_probe_optional() {
        let probes = DeviceIntegrityChecker::default_probes(false);
        assert!(probes.iter().all(|p| p.name() != "root"));
        assert_eq!(probes.len(), 3);
    }
}
