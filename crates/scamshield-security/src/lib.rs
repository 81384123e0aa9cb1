//! ScamShield security subsystem
//!
//! Device integrity checks, security configuration, the requirements audit
//! and the [`SecurityManager`] façade that ties the storage and network
//! crates together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod manager;
pub mod requirements;
pub mod status;

// Re-export main types
pub use config::{
    ApiSettings, BuildMode, EncryptionSettings, PermissionSettings, RateLimitSettings,
    RootDetectionSettings, SecurityConfig, TransportEncryptionSettings, SHARED_SECRET_ENV,
};
pub use error::{Error, Result};
pub use integrity::{
    DebugModeProbe, DevelopmentModeProbe, DeviceEnvironment, DeviceIntegrityChecker,
    EmulatorProbe, HostEnvironment, RootProbe, SecurityCheckResult, SecurityProbe,
    StaticEnvironment,
};
pub use manager::{SecurityManager, SecurityManagerBuilder};
pub use requirements::{
    normalize_permission, validate_security_requirements, PermissionManifest, MINIMAL_PERMISSIONS,
};
pub use status::{DeviceInfo, SecurityStatus};
