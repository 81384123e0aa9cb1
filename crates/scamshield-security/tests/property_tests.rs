//! Property tests for integrity aggregation

use async_trait::async_trait;
use proptest::prelude::*;
use scamshield_net::PinningStatus;
use scamshield_security::{
    DeviceEnvironment, DeviceIntegrityChecker, SecurityCheckResult, SecurityProbe, SecurityStatus,
    StaticEnvironment,
};
use scamshield_storage::{AppSecurityFlags, Platform};
use std::sync::Arc;

/// Probe that reports a fixed threat list, or fails
struct Scripted {
    threats: Vec<String>,
    fails: bool,
}

#[async_trait]
impl SecurityProbe for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, _env: &dyn DeviceEnvironment) -> scamshield_security::Result<SecurityCheckResult> {
        if self.fails {
            return Err(scamshield_security::Error::Config("scripted failure".to_string()));
        }
        Ok(SecurityCheckResult::new(self.threats.clone(), serde_json::Value::Null))
    }
}

fn pinning() -> PinningStatus {
    PinningStatus {
        enabled: true,
        initialized: true,
        pinned_domains: Vec::new(),
        allow_backup_certs: true,
        max_retries: 2,
        timeout_ms: 10_000,
        supported_platforms: Vec::new(),
    }
}

proptest! {
    #[test]
    fn violations_equal_sum_of_threats(
        probes in prop::collection::vec(
            (prop::collection::vec("[a-z ]{1,16}", 0..4), any::<bool>()),
            0..6,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build()?;
        rt.block_on(async {
            let expected: usize = probes
                .iter()
                .filter(|(_, fails)| !fails)
                .map(|(threats, _)| threats.len())
                .sum();

            let boxed: Vec<Box<dyn SecurityProbe>> = probes
                .into_iter()
                .map(|(threats, fails)| Box::new(Scripted { threats, fails }) as Box<dyn SecurityProbe>)
                .collect();
            let checker = DeviceIntegrityChecker::with_probes(
                Arc::new(StaticEnvironment::new(Platform::Linux)),
                boxed,
            );

            let device = checker.perform_security_check().await;
            let status = SecurityStatus::assemble(device, AppSecurityFlags::default(), true, pinning());

            prop_assert_eq!(status.violations.len(), expected);
            prop_assert_eq!(status.is_secure, expected == 0);
            prop_assert_eq!(status.device_security.is_secure, expected == 0);
            Ok(())
        })?;
    }
}
