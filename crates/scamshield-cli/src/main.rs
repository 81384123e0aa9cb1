//! ScamShield security diagnostics
//!
//! - Device integrity check
//! - Configuration audit
//! - Certificate pin verification
//! - Device info

use anyhow::Context;
use clap::{Parser, Subcommand};
use scamshield_security::logging::init_tracing;
use scamshield_security::{PermissionManifest, SecurityConfig, SecurityManager};
use scamshield_storage::MemoryKeyStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "scamshield")]
#[command(about = "ScamShield security subsystem diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device integrity check and print the status as JSON
    Check {
        /// Security config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Audit the configuration; exits non-zero when issues are found
    Audit {
        /// Security config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Permission manifest (JSON list or AndroidManifest.xml)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Validate a domain's certificate against its pins
    VerifyPin {
        /// Domain or URL
        domain: String,

        /// Security config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the pinning debug log
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print platform and build facts as JSON
    DeviceInfo,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => run_check(config.as_deref()).await,
        Commands::Audit { config, manifest } => run_audit(config.as_deref(), manifest.as_deref()),
        Commands::VerifyPin {
            domain,
            config,
            verbose,
        } => run_verify_pin(&domain, config.as_deref(), verbose).await,
        Commands::DeviceInfo => {
            let manager = manager(None)?;
            println!("{}", serde_json::to_string_pretty(&manager.get_device_info())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SecurityConfig> {
    match path {
        Some(path) => SecurityConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => {
            let mut config = SecurityConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }
}

fn manager(config: Option<&Path>) -> anyhow::Result<SecurityManager> {
    let config = load_config(config)?;
    // Diagnostics never touch the app's real key store
    let manager = SecurityManager::new(config, Arc::new(MemoryKeyStore::new()))?;
    Ok(manager)
}

async fn run_check(config: Option<&Path>) -> anyhow::Result<ExitCode> {
    let manager = manager(config)?;
    let status = manager.perform_security_check().await?;

    for violation in &status.violations {
        warn!("Violation: {}", violation);
    }
    println!("{}", serde_json::to_string_pretty(&status)?);

    Ok(if status.is_secure {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_audit(config: Option<&Path>, manifest: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = load_config(config)?;
    let manifest = manifest
        .map(|path| {
            PermissionManifest::from_file(path)
                .with_context(|| format!("reading manifest {}", path.display()))
        })
        .transpose()?;

    let issues = scamshield_security::validate_security_requirements(&config, manifest.as_ref());
    if issues.is_empty() {
        println!("No compliance issues found");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} compliance issue(s):", issues.len());
    for issue in &issues {
        println!("  - {}", issue);
    }
    Ok(ExitCode::FAILURE)
}

async fn run_verify_pin(
    domain: &str,
    config: Option<&Path>,
    verbose: bool,
) -> anyhow::Result<ExitCode> {
    let manager = manager(config)?;
    let status = manager.get_ssl_pinning_status();
    info!(
        "Pinning enabled={} pinned domains={:?}",
        status.enabled, status.pinned_domains
    );

    let outcome = manager.validate_ssl_certificate(domain).await;
    println!("{}: {}", domain, outcome);

    if verbose {
        for entry in manager.ssl_debug_log() {
            println!("{}", entry.to_json_line());
        }
    }

    Ok(if outcome.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
