//! Trust and transport error types

use std::path::PathBuf;
use std::time::Duration;

use rk_core::{Cancelled, Endpoint};
use thiserror::Error;

/// Failures of a single SSH transport operation
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connect or SSH handshake failed
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Dial or command exceeded the SSH timeout
    #[error("SSH {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The server refused the offered credentials
    #[error("Authentication rejected")]
    AuthRejected,

    /// The server's host key did not match `known_hosts`
    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    /// Opening or driving a channel failed
    #[error("Channel error: {0}")]
    Channel(String),

    /// A remote command finished with a non-zero status
    #[error("Remote command exited with status {exit_status}: {stderr}")]
    CommandFailed { exit_status: u32, stderr: String },
}

/// Why trust with a host could not be established
#[derive(Debug, Error)]
pub enum TrustError {
    /// Neither the system key nor the password opened a session
    #[error("SSH connection to {endpoint} failed: {source}")]
    ConnectionFailed {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },

    /// Password login worked but a public key could not be installed
    #[error("Deploying key {fingerprint} to {endpoint} failed: {source}")]
    KeyDeploymentFailed {
        endpoint: Endpoint,
        fingerprint: String,
        #[source]
        source: TransportError,
    },

    /// The request was cancelled between or during steps
    #[error("Trust check aborted: {0}")]
    Cancelled(#[from] Cancelled),
}

/// Problems with the system key material, raised at startup
#[derive(Debug, Error)]
pub enum KeyError {
    /// Private key missing or unreadable
    #[error("Failed to load private key {path:?}: {message}")]
    PrivateKey { path: PathBuf, message: String },

    /// Public key file unreadable
    #[error("Failed to read public key {path:?}: {source}")]
    PublicKeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line is not an OpenSSH public key
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Nothing left to deploy
    #[error("No usable public key configured")]
    NoPublicKeys,
}
