//! resource-keeper CLI
//!
//! Provides the `rk` command for registering managed hosts and handling
//! uploaded packages against a local database and storage directory.

pub mod commands;
pub mod output;
