//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_info, print_success, print_warning};
use rk_core::config::{self, ResourceConfig};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load and validate the configuration.
///
/// A missing file at the default location falls back to defaults; a missing
/// file given explicitly is an error.
pub fn load_resource_config(config_path: Option<&PathBuf>) -> Result<ResourceConfig> {
    let config = match config_path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                config::load_config(&default_path)
                    .with_context(|| format!("Failed to load config from {:?}", default_path))?
            } else {
                tracing::info!("Using default configuration");
                ResourceConfig::default()
            }
        }
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'rk config init' to create one; showing defaults");
        println!();
        println!("{}", toml::to_string_pretty(&ResourceConfig::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Print the configuration file path
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve(config_path).display());
    Ok(())
}

/// Write a commented default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_warning(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    let config_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_dir);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

    std::fs::write(&path, generate_default_config(&config_dir))
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));

    let defaults = ResourceConfig::default();
    let key_path = rk_core::config::SshConfig::default().private_key_path;
    print_info(&format!(
        "Host commands use the key {:?} (under ~/.ssh/ unless absolute)",
        key_path
    ));
    print_info(&format!(
        "Uploads larger than {} bytes are rejected",
        defaults.storage.max_upload_size
    ));

    Ok(())
}

/// Default configuration with every setting spelled out
fn generate_default_config(config_dir: &Path) -> String {
    let db_path = config_dir.join("resource.db");
    let storage = config_dir.join("storage");

    format!(
        r#"# resource-keeper configuration

[database]
# SQLite database; created on first use
url = {url}
max_connections = 5
# Per-call budgets in seconds
read_timeout = 5
write_timeout = 10
list_timeout = 15

[ssh]
# Private key used to log into managed hosts.
# Bare names resolve under ~/.ssh/
private_key_path = "id_ed25519"
# Public keys installed on every host; at least one must be readable
public_key_paths = ["id_ed25519.pub"]
# Timeout in seconds for each connection attempt and each remote command
timeout = 10
# Verify host keys against a known_hosts file
# known_hosts_path = "~/.ssh/known_hosts"

[storage]
# host_vars/ and packages/ are created below this directory
root = {root}
# Largest accepted upload in bytes
max_upload_size = 1073741824
"#,
        url = toml_string(&format!("sqlite://{}", db_path.display())),
        root = toml_string(&storage.display().to_string()),
    )
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
