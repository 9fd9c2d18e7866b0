// file: src/network/probe.rs
// version: 1.0.0
// guid: f4fd2110-7df8-41e8-8f9a-6f78814ff235

//! Bounded TCP reachability polling

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

/// A single TCP reachability attempt
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    /// `true` when a TCP connection to `address:port` opens within `timeout`
    async fn dial(&self, address: &str, port: u16, timeout: Duration) -> bool;
}

/// Dials with tokio's TCP stream
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait::async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((address, port))).await,
            Ok(Ok(_))
        )
    }
}

/// Attempt budget ran out without a successful dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeExhausted {
    pub attempts: u32,
}

/// Repeated dialing with a fixed spacing and a hard attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityProbe {
    pub max_attempts: u32,
    pub interval: Duration,
    pub dial_timeout: Duration,
    /// Emit a warning every this many failed attempts (0 disables)
    pub warn_every: u32,
}

impl Default for ReachabilityProbe {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            interval: Duration::from_secs(2),
            dial_timeout: Duration::from_secs(2),
            warn_every: 4,
        }
    }
}

impl ReachabilityProbe {
    /// Dial until success or the budget is spent; returns the attempt that succeeded
    pub async fn wait<D>(
        &self,
        dialer: &D,
        address: &str,
        port: u16,
    ) -> std::result::Result<u32, ProbeExhausted>
    where
        D: Dialer + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            if dialer.dial(address, port, self.dial_timeout).await {
                info!("{}:{} is reachable now (attempt {})", address, port, attempt);
                return Ok(attempt);
            }
            if self.warn_every > 0 && attempt % self.warn_every == 0 {
                warn!("{}:{} is not reachable, waiting", address, port);
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        error!(
            "{}:{} not reachable after {} attempts",
            address, port, self.max_attempts
        );
        Err(ProbeExhausted {
            attempts: self.max_attempts,
        })
    }
}
