//! System key material
//!
//! Loaded once at startup from [`SshConfig`] and shared read-only by every
//! trust check. The private key authenticates the fast path; the public keys
//! are what gets appended to a host's `authorized_keys`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use russh_keys::key::{KeyPair, PublicKey};
use russh_keys::PublicKeyBase64;

use rk_core::config::SshConfig;

use crate::error::KeyError;

/// One OpenSSH public key line ready to be installed on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployableKey {
    line: String,
    fingerprint: String,
}

impl DeployableKey {
    /// Parse an `authorized_keys`-style line (`type base64 [comment]`)
    pub fn parse(line: &str) -> Result<Self, KeyError> {
        let line = line.trim();
        let key = parse_openssh_line(line)
            .ok_or_else(|| KeyError::InvalidPublicKey(truncate(line, 40)))?;

        Ok(Self {
            line: line.to_string(),
            fingerprint: key.fingerprint(),
        })
    }

    /// Build the line for an in-memory public key
    pub fn from_public_key(key: &PublicKey, comment: Option<&str>) -> Self {
        let mut line = format!("{} {}", key.name(), key.public_key_base64());
        if let Some(comment) = comment {
            line.push(' ');
            line.push_str(comment);
        }

        Self {
            line,
            fingerprint: key.fingerprint(),
        }
    }

    /// The full key line, without trailing newline
    pub fn line(&self) -> &str {
        &self.line
    }

    /// SHA256 fingerprint, safe to log
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Base64 of the line plus newline, as shipped to the remote shell
    pub fn encoded(&self) -> String {
        STANDARD.encode(format!("{}\n", self.line))
    }
}

/// The system's signer and the public keys it deploys
#[derive(Clone)]
pub struct SystemKeys {
    signer: Arc<KeyPair>,
    public_keys: Vec<DeployableKey>,
}

impl SystemKeys {
    /// Assemble key material; refuses an empty public key set
    pub fn new(signer: KeyPair, public_keys: Vec<DeployableKey>) -> Result<Self, KeyError> {
        if public_keys.is_empty() {
            return Err(KeyError::NoPublicKeys);
        }

        Ok(Self {
            signer: Arc::new(signer),
            public_keys,
        })
    }

    /// Load the public keys and the private key named by `config`.
    ///
    /// Unreadable or malformed public key lines are skipped with a warning;
    /// the call fails only if no usable public key remains.
    pub fn load(config: &SshConfig) -> Result<Self, KeyError> {
        let mut public_keys = Vec::new();
        for path in &config.public_key_paths {
            let path = resolve_key_path(path);
            if !path.exists() {
                tracing::warn!("Public key file not found: {:?}", path);
                continue;
            }
            public_keys.extend(load_public_keys(&path)?);
        }

        if public_keys.is_empty() {
            return Err(KeyError::NoPublicKeys);
        }

        let private_path = resolve_key_path(&config.private_key_path);
        tracing::info!("Loading private key from {:?}", private_path);
        let signer = russh_keys::load_secret_key(&private_path, None).map_err(|e| {
            KeyError::PrivateKey {
                path: private_path.clone(),
                message: e.to_string(),
            }
        })?;

        tracing::info!("Loaded {} deployable public keys", public_keys.len());
        Self::new(signer, public_keys)
    }

    /// Signer used for passwordless authentication
    pub fn signer(&self) -> Arc<KeyPair> {
        Arc::clone(&self.signer)
    }

    /// Keys installed on hosts, in configuration order
    pub fn public_keys(&self) -> &[DeployableKey] {
        &self.public_keys
    }
}

impl fmt::Debug for SystemKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fingerprints: Vec<&str> = self.public_keys.iter().map(|k| k.fingerprint()).collect();
        f.debug_struct("SystemKeys")
            .field("public_keys", &fingerprints)
            .finish_non_exhaustive()
    }
}

/// Resolve a configured key path.
///
/// `~` expands to the home directory, absolute paths are kept, paths with a
/// separator are relative to the working directory, and bare file names
/// live under `~/.ssh/`.
pub fn resolve_key_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        return match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        };
    }

    if path.is_absolute() {
        return path.to_path_buf();
    }

    if path.components().count() > 1 {
        return std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf());
    }

    match dirs::home_dir() {
        Some(home) => home.join(".ssh").join(path),
        None => path.to_path_buf(),
    }
}

/// Read every usable key line from one file
fn load_public_keys(path: &Path) -> Result<Vec<DeployableKey>, KeyError> {
    let content = std::fs::read_to_string(path).map_err(|source| KeyError::PublicKeyRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut keys = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match DeployableKey::parse(line) {
            Ok(key) => {
                tracing::debug!("Loaded public key {} from {:?}", key.fingerprint(), path);
                keys.push(key);
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping line {} of {:?}: {}",
                    line_num + 1,
                    path,
                    e
                );
            }
        }
    }

    Ok(keys)
}

/// Parse an OpenSSH public key line (type base64 [comment])
fn parse_openssh_line(line: &str) -> Option<PublicKey> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() >= 2 {
        russh_keys::parse_public_key_base64(parts[1]).ok()
    } else {
        None
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = (0..=max_len).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}
