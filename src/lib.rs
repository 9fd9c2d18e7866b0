// file: src/lib.rs
// version: 3.0.0
// guid: 9f4c2a6e-1b83-4d07-a5e9-6d0c8b3f7e12

//! # BLX Provisioner
//!
//! Installs a BLX network-appliance package on a remote Linux host over SSH,
//! renders its configuration from a declarative desired state and drives it
//! through setup, update and stop.

pub mod appliance;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ProvisionError, Result};

/// Version information for the provisioner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
