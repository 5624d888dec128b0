//! russh-backed transport

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use rk_core::Endpoint;

use super::{SshAuth, TrustStore};
use crate::error::TransportError;

/// Production [`TrustStore`] speaking SSH through russh
#[derive(Debug, Clone, Default)]
pub struct RusshTrustStore {
    known_hosts: Option<PathBuf>,
}

impl RusshTrustStore {
    /// Create a store; with `known_hosts` set, unknown or changed host keys are refused
    pub fn new(known_hosts: Option<PathBuf>) -> Self {
        Self { known_hosts }
    }

    async fn authenticate(
        handle: &mut Handle<TrustClient>,
        endpoint: &Endpoint,
        auth: &SshAuth,
    ) -> Result<bool, TransportError> {
        let result = match auth {
            SshAuth::PublicKey(key) => {
                handle
                    .authenticate_publickey(&endpoint.username, Arc::clone(key))
                    .await
            }
            SshAuth::Password(password) => {
                handle
                    .authenticate_password(&endpoint.username, password)
                    .await
            }
        };
        result.map_err(|e| TransportError::Connect(format!("Authentication error: {}", e)))
    }
}

#[async_trait]
impl TrustStore for RusshTrustStore {
    type Session = Handle<TrustClient>;

    async fn dial(
        &self,
        endpoint: &Endpoint,
        auth: &SshAuth,
        timeout: Duration,
    ) -> Result<Self::Session, TransportError> {
        let ssh_config = Arc::new(Config::default());
        let handler = TrustClient::new(endpoint, self.known_hosts.clone());

        tracing::debug!("Connecting to {}", endpoint);
        let mut handle = tokio::time::timeout(
            timeout,
            client::connect(
                ssh_config,
                (endpoint.address.as_str(), endpoint.port),
                handler,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "dial",
            after: timeout,
        })?
        .map_err(|e| {
            let err_str = e.to_string();
            // russh reports a refused host key as "Unknown server key"
            if err_str.contains("Unknown server key") || err_str.contains("server key") {
                return TransportError::HostKeyRejected(endpoint.to_string());
            }
            TransportError::Connect(err_str)
        })?;

        tracing::debug!("Authenticating {} with {}", endpoint, auth.method());
        let authenticated =
            match tokio::time::timeout(timeout, Self::authenticate(&mut handle, endpoint, auth))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    operation: "authenticate",
                    after: timeout,
                }),
            };

        match authenticated {
            Ok(true) => Ok(handle),
            Ok(false) => {
                self.close(handle).await;
                Err(TransportError::AuthRejected)
            }
            Err(e) => {
                self.close(handle).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        session: &mut Self::Session,
        command: &str,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        tokio::time::timeout(timeout, exec(session, command))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "command",
                after: timeout,
            })?
    }

    async fn close(&self, session: Self::Session) {
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Ignoring disconnect error: {}", e);
        }
    }
}

/// Run one command on a fresh channel and wait for its exit status
async fn exec(handle: &Handle<TrustClient>, command: &str) -> Result<(), TransportError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| TransportError::Channel(format!("Failed to open session channel: {}", e)))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| TransportError::Channel(format!("Failed to exec: {}", e)))?;

    let mut exit_status = None;
    let mut stderr = Vec::new();
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                stderr.extend_from_slice(&data);
            }
            ChannelMsg::ExitStatus { exit_status: status } => {
                exit_status = Some(status);
            }
            _ => {}
        }
    }

    match exit_status {
        Some(0) => Ok(()),
        Some(status) => Err(TransportError::CommandFailed {
            exit_status: status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        }),
        None => Err(TransportError::Channel(
            "Channel closed without exit status".to_string(),
        )),
    }
}

/// Client-side handler; only host key verification is customized
pub struct TrustClient {
    host: String,
    port: u16,
    known_hosts: Option<PathBuf>,
}

impl TrustClient {
    fn new(endpoint: &Endpoint, known_hosts: Option<PathBuf>) -> Self {
        Self {
            host: endpoint.address.clone(),
            port: endpoint.port,
            known_hosts,
        }
    }
}

#[async_trait]
impl client::Handler for TrustClient {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();

        let Some(path) = &self.known_hosts else {
            tracing::debug!("Accepting host key {} for {}", fingerprint, self.host);
            return Ok(true);
        };

        match russh_keys::check_known_hosts_path(&self.host, self.port, server_public_key, path) {
            Ok(true) => {
                tracing::debug!("Host key {} verified against {:?}", fingerprint, path);
                Ok(true)
            }
            Ok(false) => {
                tracing::warn!(
                    "Host {}:{} is not in {:?} (key {})",
                    self.host,
                    self.port,
                    path,
                    fingerprint
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    "Host key check for {}:{} failed: {} (key {})",
                    self.host,
                    self.port,
                    e,
                    fingerprint
                );
                Ok(false)
            }
        }
    }
}
