// file: src/network/mod.rs
// version: 2.0.0
// guid: 0d6f0f4e-2b8c-4c55-9d0a-8a3e5b1f7c21

//! Remote access: sessions, command execution, elevation, probing and file transfer

pub mod connector;
pub mod elevation;
pub mod executor;
pub mod probe;
pub mod ssh;
pub mod transfer;

pub use connector::{Connector, SshConnector};
pub use elevation::{CredentialDelivery, ElevatedCommand, ScratchFileDelivery};
pub use executor::{run_appliance_shell, CommandOutput, HostRunner, RemoteShell};
pub use probe::{Dialer, ProbeExhausted, ReachabilityProbe, TcpDialer};
pub use ssh::{SshClient, SshTarget};
