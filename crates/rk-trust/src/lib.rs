//! rk-trust: SSH trust bootstrapping
//!
//! Makes sure the system's own key can log into a managed host without a
//! password. The [`HostTrustManager`] first tries the system key; only when
//! that fails does it log in with the operator-supplied password and append
//! the system's public keys to the remote `authorized_keys`.

pub mod error;
pub mod keys;
pub mod manager;
pub mod script;
pub mod ssh;

pub use error::{KeyError, TransportError, TrustError};
pub use keys::{DeployableKey, SystemKeys};
pub use manager::{HostTrustManager, TrustOutcome};
pub use ssh::{RusshTrustStore, SshAuth, TrustStore};
