// file: src/appliance/attempts.rs
// version: 1.0.0
// guid: b3d84c21-7a6e-4e0f-9c12-5f8a3e6d1b97

//! Ordered alternatives tried until one succeeds, with a record of every attempt

use crate::network::{HostRunner, RemoteShell};
use crate::{ProvisionError, Result};
use tracing::{info, warn};

/// One elevated command in a fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub label: &'static str,
    pub command: String,
}

impl Alternative {
    pub fn new(label: &'static str, command: impl Into<String>) -> Self {
        Self {
            label,
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub label: &'static str,
    pub outcome: AttemptOutcome,
}

/// Results of a fallback chain, in the order attempted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptLog {
    pub records: Vec<AttemptRecord>,
}

impl AttemptLog {
    /// Label of the alternative that succeeded
    pub fn succeeded_with(&self) -> Option<&'static str> {
        self.records
            .iter()
            .find(|r| r.outcome == AttemptOutcome::Succeeded)
            .map(|r| r.label)
    }

    /// One line per failed attempt
    pub fn failure_summary(&self) -> String {
        self.records
            .iter()
            .filter_map(|r| match &r.outcome {
                AttemptOutcome::Failed(output) => Some(format!("{}: {}", r.label, output.trim())),
                AttemptOutcome::Succeeded => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run each alternative elevated until one exits 0.
///
/// Remote failures are recorded and the next alternative is tried; transport
/// errors abort the chain.
pub async fn try_in_order<S>(
    runner: &mut HostRunner<'_, S>,
    alternatives: &[Alternative],
) -> Result<AttemptLog>
where
    S: RemoteShell + ?Sized,
{
    let mut log = AttemptLog::default();
    for alternative in alternatives {
        match runner.sudo(&alternative.command).await {
            Ok(_) => {
                info!("{} succeeded", alternative.label);
                log.records.push(AttemptRecord {
                    label: alternative.label,
                    outcome: AttemptOutcome::Succeeded,
                });
                return Ok(log);
            }
            Err(ProvisionError::RemoteCommand { output, .. }) => {
                warn!("{} failed, trying next alternative", alternative.label);
                log.records.push(AttemptRecord {
                    label: alternative.label,
                    outcome: AttemptOutcome::Failed(output),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PassthroughDelivery, ScriptedShell};

    fn chain() -> Vec<Alternative> {
        vec![
            Alternative::new("install", "pkg install"),
            Alternative::new("downgrade", "pkg downgrade"),
            Alternative::new("reinstall", "pkg reinstall"),
        ]
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let mut shell = ScriptedShell::new();
        let script = shell.script();
        script.fail_on("pkg install", "conflict");
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        let log = try_in_order(&mut runner, &chain()).await.unwrap();

        assert_eq!(log.succeeded_with(), Some("downgrade"));
        assert_eq!(log.records.len(), 2);
        assert_eq!(script.count_matching("pkg reinstall"), 0);
    }

    #[tokio::test]
    async fn test_all_failures_recorded() {
        let mut shell = ScriptedShell::new();
        shell.script().fail_on("pkg", "nope");
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        let log = try_in_order(&mut runner, &chain()).await.unwrap();

        assert_eq!(log.succeeded_with(), None);
        assert_eq!(log.records.len(), 3);
        assert_eq!(
            log.failure_summary(),
            "install: nope\ndowngrade: nope\nreinstall: nope"
        );
    }
}
