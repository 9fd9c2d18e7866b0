// file: src/network/connector.rs
// version: 1.1.0
// guid: 60e71cf2-5f4a-4abd-8910-253606fb65ef

//! Session factory: reachability probe first, then the SSH handshake

use super::executor::RemoteShell;
use super::probe::{Dialer, ReachabilityProbe, TcpDialer};
use super::ssh::{SshClient, SshTarget};
use crate::{ProvisionError, Result};
use std::time::Duration;

/// Opens remote sessions and answers single reachability dials
#[async_trait::async_trait]
pub trait Connector: Dialer {
    type Shell: RemoteShell;

    /// Open an authenticated session, failing with `Unreachable` when the
    /// endpoint never accepts TCP connections
    async fn connect(&mut self, target: &SshTarget) -> Result<Self::Shell>;
}

/// Production connector backed by `ssh2`
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    probe: ReachabilityProbe,
    dialer: TcpDialer,
}

impl SshConnector {
    pub fn new(probe: ReachabilityProbe) -> Self {
        Self {
            probe,
            dialer: TcpDialer,
        }
    }
}

#[async_trait::async_trait]
impl Dialer for SshConnector {
    async fn dial(&self, address: &str, port: u16, timeout: Duration) -> bool {
        self.dialer.dial(address, port, timeout).await
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    type Shell = SshClient;

    async fn connect(&mut self, target: &SshTarget) -> Result<SshClient> {
        self.probe
            .wait(&self.dialer, &target.address, target.port)
            .await
            .map_err(|e| ProvisionError::Unreachable {
                address: target.address.clone(),
                port: target.port,
                attempts: e.attempts,
            })?;

        let mut client = SshClient::new();
        client.connect(target).await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, HostKeyPolicy};

    fn quick_retries(max_attempts: u32) -> ReachabilityProbe {
        ReachabilityProbe {
            max_attempts,
            interval: Duration::from_millis(10),
            dial_timeout: Duration::from_millis(500),
            warn_every: 0,
        }
    }

    fn local_target(port: u16) -> SshTarget {
        SshTarget {
            address: "127.0.0.1".to_string(),
            port,
            username: "admin".to_string(),
            auth: AuthMethod::Password("pw".to_string()),
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable_after_dial_budget() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut connector = SshConnector::new(quick_retries(3));

        let err = connector.connect(&local_target(port)).await.err().unwrap();

        match err {
            ProvisionError::Unreachable {
                address,
                port: p,
                attempts,
            } => {
                assert_eq!(address, "127.0.0.1");
                assert_eq!(p, port);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reachable_port_proceeds_to_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });
        let mut connector = SshConnector::new(quick_retries(3));

        let err = connector.connect(&local_target(port)).await.err().unwrap();

        assert!(matches!(err, ProvisionError::Ssh(_)), "got {:?}", err);
    }
}
