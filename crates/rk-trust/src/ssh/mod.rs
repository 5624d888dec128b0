//! SSH transport seam
//!
//! [`TrustStore`] is the narrow surface the trust manager needs: open an
//! authenticated session, run one command, close. The production
//! implementation is [`RusshTrustStore`]; tests drive the manager with
//! scripted fakes.

mod client;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh_keys::key::KeyPair;

use rk_core::Endpoint;

use crate::error::TransportError;

pub use client::RusshTrustStore;

/// Credentials offered when dialing a host
#[derive(Clone)]
pub enum SshAuth {
    /// The system's private key
    PublicKey(Arc<KeyPair>),
    /// Operator-supplied password, only used for the bootstrap login
    Password(String),
}

impl SshAuth {
    /// Short name of the method, safe to log
    pub fn method(&self) -> &'static str {
        match self {
            SshAuth::PublicKey(_) => "publickey",
            SshAuth::Password(_) => "password",
        }
    }
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshAuth::PublicKey(_) => f.write_str("PublicKey(..)"),
            SshAuth::Password(_) => f.write_str("Password(***)"),
        }
    }
}

/// Opens authenticated SSH sessions and runs commands on them
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// An open, authenticated session
    type Session: Send;

    /// Connect and authenticate, bounded by `timeout`
    async fn dial(
        &self,
        endpoint: &Endpoint,
        auth: &SshAuth,
        timeout: Duration,
    ) -> Result<Self::Session, TransportError>;

    /// Run `command` to completion; a non-zero exit is an error
    async fn run(
        &self,
        session: &mut Self::Session,
        command: &str,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Close the session, ignoring errors
    async fn close(&self, session: Self::Session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_not_printed() {
        let auth = SshAuth::Password("hunter2".into());
        let printed = format!("{:?}", auth);
        assert!(!printed.contains("hunter2"));
        assert_eq!(auth.method(), "password");
    }
}
