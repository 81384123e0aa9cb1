//! Device integrity probes
//!
//! Each probe is a set of independent heuristics. A probe only reports
//! threats for the platforms its signals mean something on; elsewhere it
//! records what it saw in `details` and stays quiet.

use super::environment::{status_field, DeviceEnvironment};
use super::{SecurityCheckResult, SecurityProbe};
use crate::Result;
use async_trait::async_trait;
use scamshield_storage::Platform;
use serde_json::{json, Value};
use tracing::warn;

const PROC_STATUS: &str = "/proc/self/status";

/// su binaries and root managers on Android
const ANDROID_ROOT_MARKERS: [&str; 14] = [
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/su/bin/su",
    "/system/xbin/daemonsu",
    "/sbin/magisk",
    "/data/adb/magisk",
    "/system/etc/init.d/99SuperSUDaemon",
];

/// Jailbreak artifacts on iOS
const IOS_JAILBREAK_MARKERS: [&str; 9] = [
    "/Applications/Cydia.app",
    "/Applications/Sileo.app",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/etc/apt",
    "/private/var/lib/apt/",
    "/usr/bin/ssh",
    "/var/jb",
];

/// Emulator device nodes and libraries on Android
const ANDROID_EMULATOR_FILES: [&str; 5] = [
    "/dev/qemu_pipe",
    "/dev/socket/qemud",
    "/system/lib/libc_malloc_debug_qemu.so",
    "/sys/qemu_trace",
    "/system/bin/qemu-props",
];

/// `ro.hardware` values of common emulators
const EMULATOR_HARDWARE: [&str; 4] = ["goldfish", "ranchu", "vbox86", "nox"];

/// DMI product names of common hypervisors
const HYPERVISOR_PRODUCTS: [&str; 6] = [
    "VirtualBox",
    "VMware",
    "KVM",
    "QEMU",
    "Virtual Machine",
    "Parallels",
];

/// Instrumentation servers dropped on Android for runtime hooking
const HOOK_FRAMEWORK_FILES: [&str; 3] = [
    "/data/local/tmp/frida-server",
    "/data/local/tmp/re.frida.server",
    "/system/framework/XposedBridge.jar",
];

/// Variables that inject code into the process at load time
const INJECTION_VARS: [&str; 2] = ["LD_PRELOAD", "DYLD_INSERT_LIBRARIES"];

/// Signal reads for one probe run
///
/// A source that cannot be read is noted under `details.unreadable` and
/// treated as absent, so one unreadable file never discards threats the
/// probe already found.
struct Signals<'a> {
    env: &'a dyn DeviceEnvironment,
    unreadable: Vec<String>,
}

impl<'a> Signals<'a> {
    fn new(env: &'a dyn DeviceEnvironment) -> Self {
        Self {
            env,
            unreadable: Vec::new(),
        }
    }

    async fn property(&mut self, key: &str) -> Option<String> {
        match self.env.build_property(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Build property {} unreadable: {}", key, e);
                self.unreadable.push(key.to_string());
                None
            }
        }
    }

    async fn file(&mut self, path: &str) -> Option<String> {
        match self.env.read_file(path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("{} unreadable: {}", path, e);
                self.unreadable.push(path.to_string());
                None
            }
        }
    }

    fn finish(self, threats: Vec<String>, mut details: Value) -> SecurityCheckResult {
        if !self.unreadable.is_empty() {
            details["unreadable"] = json!(self.unreadable);
        }
        SecurityCheckResult::new(threats, details)
    }
}

/// Root (Android) and jailbreak (iOS) detection
pub struct RootProbe;

#[async_trait]
impl SecurityProbe for RootProbe {
    fn name(&self) -> &'static str {
        "root"
    }

    async fn run(&self, env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
        let mut signals = Signals::new(env);
        let mut threats = Vec::new();
        let mut found = Vec::new();

        match env.platform() {
            Platform::Android => {
                for marker in ANDROID_ROOT_MARKERS {
                    if env.path_exists(marker).await {
                        found.push(marker);
                        threats.push(format!("Root access detected: {}", marker));
                    }
                }
                if signals.property("ro.debuggable").await.as_deref() == Some("1") {
                    threats.push("Insecure build property: ro.debuggable=1".to_string());
                }
                if signals.property("ro.secure").await.as_deref() == Some("0") {
                    threats.push("Insecure build property: ro.secure=0".to_string());
                }
                if signals
                    .property("ro.build.tags")
                    .await
                    .is_some_and(|tags| tags.contains("test-keys"))
                {
                    threats.push("Root indicator: build signed with test-keys".to_string());
                }
            }
            Platform::Ios => {
                for marker in IOS_JAILBREAK_MARKERS {
                    if env.path_exists(marker).await {
                        found.push(marker);
                        threats.push(format!("Jailbreak detected: {}", marker));
                    }
                }
            }
            _ => {}
        }

        let elevated = match signals.file(PROC_STATUS).await {
            Some(status) => status_field(&status, "Uid")
                .and_then(|uids| uids.split_whitespace().nth(1))
                .is_some_and(|euid| euid == "0"),
            None => false,
        };

        Ok(signals.finish(
            threats,
            json!({ "markers": found, "elevatedProcess": elevated }),
        ))
    }
}

/// Emulator/simulator detection
pub struct EmulatorProbe;

#[async_trait]
impl SecurityProbe for EmulatorProbe {
    fn name(&self) -> &'static str {
        "emulator"
    }

    async fn run(&self, env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
        let mut signals = Signals::new(env);
        let mut threats = Vec::new();
        let mut hypervisor = None;

        match env.platform() {
            Platform::Android => {
                if signals.property("ro.kernel.qemu").await.as_deref() == Some("1") {
                    threats.push("Emulator detected: ro.kernel.qemu=1".to_string());
                }
                if let Some(hardware) = signals.property("ro.hardware").await {
                    if EMULATOR_HARDWARE.iter().any(|h| hardware.contains(h)) {
                        threats.push(format!("Emulator hardware: {}", hardware));
                    }
                }
                if let Some(model) = signals.property("ro.product.model").await {
                    if model.contains("sdk") || model.contains("Emulator") {
                        threats.push(format!("Emulator model: {}", model));
                    }
                }
                if let Some(fingerprint) = signals.property("ro.build.fingerprint").await {
                    if fingerprint.starts_with("generic") {
                        threats.push("Emulator build fingerprint: generic".to_string());
                    }
                }
                for file in ANDROID_EMULATOR_FILES {
                    if env.path_exists(file).await {
                        threats.push(format!("Emulator artifact: {}", file));
                    }
                }
            }
            Platform::Ios => {
                for var in ["SIMULATOR_DEVICE_NAME", "SIMULATOR_UDID"] {
                    if env.env_var(var).is_some() {
                        threats.push(format!("Simulator environment: {}", var));
                    }
                }
            }
            _ => {
                if let Some(product) = signals.file("/sys/class/dmi/id/product_name").await {
                    let product = product.trim().to_string();
                    if HYPERVISOR_PRODUCTS.iter().any(|p| product.contains(p)) {
                        hypervisor = Some(product);
                    }
                }
            }
        }

        Ok(signals.finish(threats, json!({ "hypervisor": hypervisor })))
    }
}

/// Development build and developer-settings detection
pub struct DevelopmentModeProbe;

#[async_trait]
impl SecurityProbe for DevelopmentModeProbe {
    fn name(&self) -> &'static str {
        "development"
    }

    async fn run(&self, env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
        let mut signals = Signals::new(env);
        let mut threats = Vec::new();

        if env.is_debug_build() {
            threats.push("Development build".to_string());
        }

        let app_env = env.env_var("SCAMSHIELD_ENV");
        if app_env
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("development") || v.eq_ignore_ascii_case("dev"))
        {
            threats.push("Development environment flag set (SCAMSHIELD_ENV)".to_string());
        }

        let mut adb = false;
        if env.platform() == Platform::Android {
            let adbd = signals.property("init.svc.adbd").await;
            let usb_config = signals.property("persist.sys.usb.config").await;
            adb = adbd.as_deref() == Some("running")
                || usb_config.is_some_and(|config| config.contains("adb"));
            if adb {
                threats.push("USB debugging (ADB) enabled".to_string());
            }
        }

        Ok(signals.finish(
            threats,
            json!({ "debugBuild": env.is_debug_build(), "appEnv": app_env, "adb": adb }),
        ))
    }
}

/// Attached debugger and runtime hook detection
pub struct DebugModeProbe;

#[async_trait]
impl SecurityProbe for DebugModeProbe {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn run(&self, env: &dyn DeviceEnvironment) -> Result<SecurityCheckResult> {
        let mut signals = Signals::new(env);
        let mut threats = Vec::new();

        let tracer = match signals.file(PROC_STATUS).await {
            Some(status) => status_field(&status, "TracerPid")
                .and_then(|pid| pid.parse::<u32>().ok())
                .unwrap_or(0),
            None => 0,
        };
        if tracer != 0 {
            threats.push(format!("Debugger attached (TracerPid={})", tracer));
        }

        for var in INJECTION_VARS {
            if env.env_var(var).is_some_and(|v| !v.is_empty()) {
                threats.push(format!("Runtime injection hook: {}", var));
            }
        }

        if env.platform() == Platform::Android {
            for file in HOOK_FRAMEWORK_FILES {
                if env.path_exists(file).await {
                    threats.push(format!("Instrumentation framework: {}", file));
                }
            }
        }

        Ok(signals.finish(threats, json!({ "tracerPid": tracer })))
    }
}
