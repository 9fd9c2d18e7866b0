// file: src/config/mod.rs
// version: 2.0.0
// guid: a1b2c3d4-e5f6-7a8b-9c0d-1e2f3a4b5c6d

//! Configuration module for the BLX provisioner
//!
//! Handles loading and validation of desired-state documents.

pub mod appliance;
pub mod de;
pub mod host;
pub mod loader;

pub use appliance::{ApplianceSettings, DesiredState, OffloadArtifacts, StaticRoute};
pub use host::{AuthMethod, HostCredential, HostKeyPolicy, DEFAULT_SSH_PORT};
