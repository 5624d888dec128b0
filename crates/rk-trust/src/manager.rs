//! Host trust manager
//!
//! Guarantees that after [`HostTrustManager::establish_trust`] returns `Ok`,
//! the system key authenticates to the host without a password.
//!
//! The check is two-phase so it stays cheap when repeated on every create
//! and update:
//!
//! 1. Dial with the system key. Success means trust already exists.
//! 2. Otherwise dial with the operator's password and install every
//!    configured public key, stopping at the first failure.
//!
//! The session opened in either phase is closed on every exit path.

use std::sync::Arc;
use std::time::Duration;

use rk_core::{Endpoint, RequestContext};

use crate::error::{TransportError, TrustError};
use crate::keys::SystemKeys;
use crate::script::deploy_key_script;
use crate::ssh::{SshAuth, TrustStore};

/// How trust was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustOutcome {
    /// The system key already worked; nothing was deployed
    AlreadyTrusted,
    /// Password login succeeded and this many keys were installed
    KeysDeployed(usize),
}

/// Establishes passwordless SSH access to managed hosts
pub struct HostTrustManager<S: TrustStore> {
    store: S,
    keys: Arc<SystemKeys>,
    timeout: Duration,
}

impl<S: TrustStore> HostTrustManager<S> {
    /// Create a manager; `timeout` bounds each dial and each remote command
    pub fn new(store: S, keys: Arc<SystemKeys>, timeout: Duration) -> Self {
        Self {
            store,
            keys,
            timeout,
        }
    }

    /// Key material in use
    pub fn keys(&self) -> &SystemKeys {
        &self.keys
    }

    /// Per-operation SSH timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Make sure the system key can log into `endpoint`.
    ///
    /// No retries happen here. Cancellation is checked before every network
    /// step and aborts an in-flight dial or command.
    pub async fn establish_trust(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
        password: &str,
    ) -> Result<TrustOutcome, TrustError> {
        ctx.check()?;

        let key_auth = SshAuth::PublicKey(self.keys.signer());
        match ctx
            .run(self.store.dial(endpoint, &key_auth, self.timeout))
            .await?
        {
            Ok(session) => {
                tracing::info!(
                    trace_id = %ctx.trace_id(),
                    endpoint = %endpoint,
                    "System key already trusted"
                );
                self.store.close(session).await;
                return Ok(TrustOutcome::AlreadyTrusted);
            }
            Err(e) => {
                tracing::debug!(
                    trace_id = %ctx.trace_id(),
                    endpoint = %endpoint,
                    "Key login failed, falling back to password: {}",
                    e
                );
            }
        }

        ctx.check()?;

        let password_auth = SshAuth::Password(password.to_string());
        let mut session = ctx
            .run(self.store.dial(endpoint, &password_auth, self.timeout))
            .await?
            .map_err(|source| {
                tracing::warn!(
                    trace_id = %ctx.trace_id(),
                    endpoint = %endpoint,
                    "Password login failed: {}",
                    source
                );
                TrustError::ConnectionFailed {
                    endpoint: endpoint.clone(),
                    source,
                }
            })?;

        let result = self.deploy_keys(ctx, endpoint, &mut session).await;
        self.store.close(session).await;

        let deployed = result?;
        tracing::info!(
            trace_id = %ctx.trace_id(),
            endpoint = %endpoint,
            "Deployed {} public keys",
            deployed
        );
        Ok(TrustOutcome::KeysDeployed(deployed))
    }

    async fn deploy_keys(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
        session: &mut S::Session,
    ) -> Result<usize, TrustError> {
        let keys = self.keys.public_keys();
        for key in keys {
            ctx.check()?;

            tracing::debug!(
                trace_id = %ctx.trace_id(),
                endpoint = %endpoint,
                fingerprint = %key.fingerprint(),
                "Deploying public key"
            );

            let script = deploy_key_script(key);
            let outcome: Result<(), TransportError> = ctx
                .run(self.store.run(session, &script, self.timeout))
                .await?;

            outcome.map_err(|source| TrustError::KeyDeploymentFailed {
                endpoint: endpoint.clone(),
                fingerprint: key.fingerprint().to_string(),
                source,
            })?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rk_core::Cancelled;
    use russh_keys::key::KeyPair;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use crate::keys::DeployableKey;

    #[derive(Default)]
    struct Log {
        dials: Vec<&'static str>,
        commands: Vec<String>,
        closes: usize,
    }

    /// Scripted transport: hosts become key-trusted once any command ran
    #[derive(Default)]
    struct FakeStore {
        trusted: Mutex<HashSet<Endpoint>>,
        password: String,
        fail_command: Option<usize>,
        log: Mutex<Log>,
    }

    impl FakeStore {
        fn with_password(password: &str) -> Self {
            Self {
                password: password.to_string(),
                ..Self::default()
            }
        }
    }

    struct FakeSession {
        endpoint: Endpoint,
    }

    #[async_trait]
    impl TrustStore for FakeStore {
        type Session = FakeSession;

        async fn dial(
            &self,
            endpoint: &Endpoint,
            auth: &SshAuth,
            _timeout: Duration,
        ) -> Result<FakeSession, TransportError> {
            self.log.lock().unwrap().dials.push(auth.method());
            let ok = match auth {
                SshAuth::PublicKey(_) => self.trusted.lock().unwrap().contains(endpoint),
                SshAuth::Password(p) => *p == self.password,
            };
            if ok {
                Ok(FakeSession {
                    endpoint: endpoint.clone(),
                })
            } else {
                Err(TransportError::AuthRejected)
            }
        }

        async fn run(
            &self,
            session: &mut FakeSession,
            command: &str,
            _timeout: Duration,
        ) -> Result<(), TransportError> {
            let mut log = self.log.lock().unwrap();
            log.commands.push(command.to_string());
            if self.fail_command == Some(log.commands.len()) {
                return Err(TransportError::CommandFailed {
                    exit_status: 1,
                    stderr: "disk full".into(),
                });
            }
            self.trusted.lock().unwrap().insert(session.endpoint.clone());
            Ok(())
        }

        async fn close(&self, _session: FakeSession) {
            self.log.lock().unwrap().closes += 1;
        }
    }

    fn keys(count: usize) -> Arc<SystemKeys> {
        let public = (0..count)
            .map(|i| {
                let pair = KeyPair::generate_ed25519().unwrap();
                DeployableKey::from_public_key(
                    &pair.clone_public_key().unwrap(),
                    Some(&format!("rk-{i}")),
                )
            })
            .collect();
        let signer = KeyPair::generate_ed25519().unwrap();
        Arc::new(SystemKeys::new(signer, public).unwrap())
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("10.0.0.5", 22, "admin")
    }

    fn manager(store: FakeStore, key_count: usize) -> HostTrustManager<FakeStore> {
        HostTrustManager::new(store, keys(key_count), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_password_path_deploys_then_fast_path() {
        let manager = manager(FakeStore::with_password("secret"), 1);
        let ctx = RequestContext::new();

        let first = manager
            .establish_trust(&ctx, &endpoint(), "secret")
            .await
            .unwrap();
        assert_eq!(first, TrustOutcome::KeysDeployed(1));

        let second = manager
            .establish_trust(&ctx, &endpoint(), "wrong")
            .await
            .unwrap();
        assert_eq!(second, TrustOutcome::AlreadyTrusted);

        let log = manager.store.log.lock().unwrap();
        assert_eq!(log.dials, vec!["publickey", "password", "publickey"]);
        assert_eq!(log.commands.len(), 1);
        assert_eq!(log.closes, 2);
    }

    #[tokio::test]
    async fn test_wrong_password_is_connection_failure() {
        let manager = manager(FakeStore::with_password("secret"), 1);
        let err = manager
            .establish_trust(&RequestContext::new(), &endpoint(), "nope")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TrustError::ConnectionFailed {
                source: TransportError::AuthRejected,
                ..
            }
        ));
        let log = manager.store.log.lock().unwrap();
        assert!(log.commands.is_empty());
        assert_eq!(log.closes, 0);
    }

    #[tokio::test]
    async fn test_deployment_stops_at_first_failure() {
        let store = FakeStore {
            fail_command: Some(2),
            ..FakeStore::with_password("secret")
        };
        let manager = manager(store, 3);
        let second = manager.keys().public_keys()[1].fingerprint().to_string();

        let err = manager
            .establish_trust(&RequestContext::new(), &endpoint(), "secret")
            .await
            .unwrap_err();

        match err {
            TrustError::KeyDeploymentFailed { fingerprint, .. } => assert_eq!(fingerprint, second),
            other => panic!("unexpected error: {other:?}"),
        }
        let log = manager.store.log.lock().unwrap();
        assert_eq!(log.commands.len(), 2);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_cancelled_context_touches_nothing() {
        let manager = manager(FakeStore::with_password("secret"), 1);
        let ctx = RequestContext::new();
        ctx.cancel();

        let err = manager
            .establish_trust(&ctx, &endpoint(), "secret")
            .await
            .unwrap_err();

        assert!(matches!(err, TrustError::Cancelled(Cancelled::Cancelled)));
        assert!(manager.store.log.lock().unwrap().dials.is_empty());
    }
}
