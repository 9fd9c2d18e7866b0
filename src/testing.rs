// file: src/testing.rs
// version: 1.0.0
// guid: 420887ae-7552-485e-8454-34cd421d2a9c

//! Scripted stand-ins for remote sessions, dialing and elevation (tests only)

use crate::network::elevation::{CredentialDelivery, ElevatedCommand};
use crate::network::executor::{CommandOutput, RemoteShell};
use crate::network::probe::Dialer;
use crate::network::ssh::SshTarget;
use crate::network::Connector;
use crate::{ProvisionError, Result};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ok(output: &str) -> CommandOutput {
    CommandOutput {
        exit_status: 0,
        output: output.to_string(),
    }
}

pub fn failed(output: &str) -> CommandOutput {
    CommandOutput {
        exit_status: 1,
        output: output.to_string(),
    }
}

struct Rule {
    pattern: String,
    queue: VecDeque<CommandOutput>,
    fallback: CommandOutput,
}

#[derive(Default)]
struct ScriptState {
    rules: Vec<Rule>,
    commands: Vec<String>,
    uploads: Vec<(String, String)>,
    disconnects: usize,
}

/// Shared command log and canned answers.
///
/// A command is answered by the most recently added rule whose pattern it
/// contains; anything unmatched succeeds with empty output.
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_rule(&self, pattern: &str, queue: Vec<CommandOutput>, fallback: CommandOutput) -> &Self {
        self.0.lock().unwrap().rules.push(Rule {
            pattern: pattern.to_string(),
            queue: queue.into(),
            fallback,
        });
        self
    }

    /// Succeed with `output` for matching commands
    pub fn respond(&self, pattern: &str, output: &str) -> &Self {
        self.push_rule(pattern, Vec::new(), ok(output))
    }

    /// Exit 1 with `output` for matching commands
    pub fn fail_on(&self, pattern: &str, output: &str) -> &Self {
        self.push_rule(pattern, Vec::new(), failed(output))
    }

    /// Answer matching commands in order, repeating the last answer
    pub fn sequence(&self, pattern: &str, outputs: Vec<CommandOutput>) -> &Self {
        let fallback = outputs.last().cloned().unwrap_or_else(|| ok(""));
        self.push_rule(pattern, outputs, fallback)
    }

    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().commands.clone()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    /// Index of the first recorded command containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.0
            .lock()
            .unwrap()
            .commands
            .iter()
            .position(|c| c.contains(pattern))
    }

    pub fn uploads(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .uploads
            .iter()
            .map(|(remote, _)| remote.clone())
            .collect()
    }

    pub fn uploaded_content(&self, remote_path: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap()
            .uploads
            .iter()
            .rev()
            .find(|(remote, _)| remote == remote_path)
            .map(|(_, content)| content.clone())
    }

    /// Content of the most recent upload whose remote name contains `fragment`
    pub fn uploaded_matching(&self, fragment: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap()
            .uploads
            .iter()
            .rev()
            .find(|(remote, _)| remote.contains(fragment))
            .map(|(_, content)| content.clone())
    }

    pub fn disconnects(&self) -> usize {
        self.0.lock().unwrap().disconnects
    }

    fn answer(&self, command: &str) -> CommandOutput {
        let mut state = self.0.lock().unwrap();
        state.commands.push(command.to_string());
        match state
            .rules
            .iter_mut()
            .rev()
            .find(|rule| command.contains(&rule.pattern))
        {
            Some(rule) => rule.queue.pop_front().unwrap_or_else(|| rule.fallback.clone()),
            None => ok(""),
        }
    }
}

/// Remote shell that answers from a [`Script`]
#[derive(Default)]
pub struct ScriptedShell {
    script: Script,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Script) -> Self {
        Self { script }
    }

    pub fn script(&self) -> Script {
        self.script.clone()
    }
}

#[async_trait::async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        Ok(self.script.answer(command))
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let content = std::fs::read_to_string(local_path)?;
        self.script
            .0
            .lock()
            .unwrap()
            .uploads
            .push((remote_path.to_string(), content));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.script.0.lock().unwrap().disconnects += 1;
    }
}

/// Dialer that fails a fixed number of times before succeeding
#[derive(Clone)]
pub struct FakeDialer {
    failures_before_success: Option<u32>,
    attempts: Arc<AtomicU32>,
}

impl FakeDialer {
    pub fn always() -> Self {
        Self::succeed_after(0)
    }

    pub fn never() -> Self {
        Self {
            failures_before_success: None,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn succeed_after(failures: u32) -> Self {
        Self {
            failures_before_success: Some(failures),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, _address: &str, _port: u16, _timeout: Duration) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.failures_before_success {
            Some(failures) => attempt > failures,
            None => false,
        }
    }
}

/// Connector handing out [`ScriptedShell`]s that share one [`Script`]
#[derive(Clone)]
pub struct FakeConnector {
    script: Script,
    dialer: FakeDialer,
    refused_ports: Arc<Mutex<HashSet<u16>>>,
    connections: Arc<Mutex<Vec<SshTarget>>>,
}

impl FakeConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            dialer: FakeDialer::always(),
            refused_ports: Arc::new(Mutex::new(HashSet::new())),
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_dialer(mut self, dialer: FakeDialer) -> Self {
        self.dialer = dialer;
        self
    }

    /// Sessions to this port fail as unreachable
    pub fn refuse_port(self, port: u16) -> Self {
        self.refused_ports.lock().unwrap().insert(port);
        self
    }

    /// Every session that was requested, refused or not
    pub fn connections(&self) -> Vec<SshTarget> {
        self.connections.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Dialer for FakeConnector {
    async fn dial(&self, address: &str, port: u16, timeout: Duration) -> bool {
        self.dialer.dial(address, port, timeout).await
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    type Shell = ScriptedShell;

    async fn connect(&mut self, target: &SshTarget) -> Result<ScriptedShell> {
        self.connections.lock().unwrap().push(target.clone());
        if self.refused_ports.lock().unwrap().contains(&target.port) {
            return Err(ProvisionError::Unreachable {
                address: target.address.clone(),
                port: target.port,
                attempts: 100,
            });
        }
        Ok(ScriptedShell::with_script(self.script.clone()))
    }
}

/// Elevation that runs the command unchanged, for readable command logs
pub struct PassthroughDelivery;

impl CredentialDelivery for PassthroughDelivery {
    fn elevate(&self, command: &str, _workdir: &str) -> ElevatedCommand {
        ElevatedCommand {
            staging: None,
            invocation: command.to_string(),
        }
    }
}
