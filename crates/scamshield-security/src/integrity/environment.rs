//! Device signal sources
//!
//! Probes never touch the OS directly; they read through a
//! [`DeviceEnvironment`] so the same heuristics run against the real host or
//! a scripted device.

use async_trait::async_trait;
use scamshield_storage::Platform;
use std::collections::{HashMap, HashSet};
use std::io;
use tokio::sync::OnceCell;
use tracing::warn;

/// Android property files parsed for `getprop`-style lookups
const PROPERTY_FILES: [&str; 4] = [
    "/default.prop",
    "/system/build.prop",
    "/vendor/build.prop",
    "/system/default.prop",
];

/// Platform signals the integrity probes consume
#[async_trait]
pub trait DeviceEnvironment: Send + Sync {
    /// Platform the app runs on
    fn platform(&self) -> Platform;

    /// Compiled with debug assertions
    fn is_debug_build(&self) -> bool;

    /// Environment variable
    fn env_var(&self, name: &str) -> Option<String>;

    /// Whether a filesystem path exists
    async fn path_exists(&self, path: &str) -> bool;

    /// File contents; `Ok(None)` when the file does not exist
    async fn read_file(&self, path: &str) -> io::Result<Option<String>>;

    /// System build property (`ro.debuggable`, `ro.hardware`, ...)
    async fn build_property(&self, key: &str) -> io::Result<Option<String>>;
}

/// The running host
#[derive(Default)]
pub struct HostEnvironment {
    properties: OnceCell<HashMap<String, String>>,
}

impl HostEnvironment {
    /// Create host environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every readable property file; unreadable ones are skipped
    async fn load_properties(&self) -> io::Result<HashMap<String, String>> {
        let mut properties = HashMap::new();
        for file in PROPERTY_FILES {
            match self.read_file(file).await {
                Ok(Some(contents)) => properties.extend(parse_properties(&contents)),
                Ok(None) => {}
                Err(e) => warn!("Skipping property file {}: {}", file, e),
            }
        }
        Ok(properties)
    }
}

#[async_trait]
impl DeviceEnvironment for HostEnvironment {
    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn is_debug_build(&self) -> bool {
        cfg!(debug_assertions)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    async fn path_exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_file(&self, path: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn build_property(&self, key: &str) -> io::Result<Option<String>> {
        if self.platform() != Platform::Android {
            return Ok(None);
        }
        let properties = self
            .properties
            .get_or_try_init(|| self.load_properties())
            .await?;
        Ok(properties.get(key).cloned())
    }
}

/// Scripted device for tests and simulations
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    platform: Platform,
    debug_build: bool,
    paths: HashSet<String>,
    files: HashMap<String, String>,
    unreadable: HashSet<String>,
    unreadable_properties: bool,
    env: HashMap<String, String>,
    properties: HashMap<String, String>,
}

impl StaticEnvironment {
    /// Clean release-build device
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            debug_build: false,
            paths: HashSet::new(),
            files: HashMap::new(),
            unreadable: HashSet::new(),
            unreadable_properties: false,
            env: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    /// Mark as a debug build
    pub fn debug_build(mut self, debug_build: bool) -> Self {
        self.debug_build = debug_build;
        self
    }

    /// Add an existing path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.insert(path.into());
        self
    }

    /// Add a readable file (the path also exists)
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        let path = path.into();
        self.paths.insert(path.clone());
        self.files.insert(path, contents.into());
        self
    }

    /// Add a file whose read fails with permission denied
    pub fn with_unreadable(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.paths.insert(path.clone());
        self.unreadable.insert(path);
        self
    }

    /// Make every build property read fail with permission denied
    pub fn with_unreadable_properties(mut self) -> Self {
        self.unreadable_properties = true;
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Set a build property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl DeviceEnvironment for StaticEnvironment {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn is_debug_build(&self) -> bool {
        self.debug_build
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    async fn path_exists(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    async fn read_file(&self, path: &str) -> io::Result<Option<String>> {
        if self.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not readable", path),
            ));
        }
        Ok(self.files.get(path).cloned())
    }

    async fn build_property(&self, key: &str) -> io::Result<Option<String>> {
        if self.unreadable_properties {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("property {} is not readable", key),
            ));
        }
        Ok(self.properties.get(key).cloned())
    }
}

/// Parse `key=value` property lines, skipping comments
pub fn parse_properties(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Value of a `Field:\tvalue` line in `/proc/<pid>/status`
pub fn status_field<'a>(status: &'a str, field: &str) -> Option<&'a str> {
    status.lines().find_map(|line| {
        line.strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}
