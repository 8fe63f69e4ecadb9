//! Credentials Command
//!
//! Runs the credential supplier once and reports whether a pair was obtained.
//!
//! Usage:
//!   chatrelay credentials check [--force]

use crate::config::Config;
use crate::credentials::CredentialSupplier;
use crate::types::{RelayError, Result};

pub async fn check(config: &Config, force: bool) -> Result<()> {
    let supplier = CredentialSupplier::from_config(&config.credentials);

    println!("Credential sources");
    println!("══════════════════════════════════════");
    println!(
        "  Override:  {}",
        if supplier.has_override() { "configured" } else { "-" }
    );
    println!("  Cache:     {}", config.credentials.cache_file.display());
    println!(
        "  Harvester: {}",
        config.credentials.harvest_command.as_deref().unwrap_or("-")
    );
    println!();

    match supplier.obtain(force).await {
        Some(pair) => {
            println!("✓ Credentials available (secondary: {})", pair.preview());
            Ok(())
        }
        None => {
            println!("✗ No credentials available");
            if force && !supplier.has_harvester() {
                println!("  --force skips override and cache; configure credentials.harvest_command");
            }
            Err(RelayError::InitializationFailed(
                "no credentials available".to_string(),
            ))
        }
    }
}
