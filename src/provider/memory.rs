//! In-memory simulated provider
//!
//! Nodes exist only in this process. Useful for dry runs and for exercising
//! the orchestrator: capacity limits, script failures, unreachable nodes and
//! launch-order shuffling can all be configured.

use super::{
    collect_script_results, fan_out, ComputeProvider, NodeCredentials, NodeSelector,
    ProviderNode, ScriptOutput,
};
use crate::error::{EnsembleError, Result};
use crate::planner::TemplateRequest;
use crate::script::Script;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Login user reported for simulated nodes
pub const DEFAULT_LOGIN_USER: &str = "ensemble";

/// A node the simulated provider hands out next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNode {
    pub id: String,
    pub public_addresses: Vec<String>,
    pub private_addresses: Vec<String>,
}

impl SimulatedNode {
    pub fn new(id: &str, public_address: &str, private_address: &str) -> Self {
        Self {
            id: id.to_string(),
            public_addresses: vec![public_address.to_string()],
            private_addresses: vec![private_address.to_string()],
        }
    }
}

/// A recorded `run_script` call
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub selector: NodeSelector,
    pub script: Script,
    /// Node IDs the script ran on, in order
    pub targets: Vec<String>,
    /// Identity the script ran as
    pub identity: String,
}

#[derive(Default)]
struct MemoryState {
    nodes: Vec<ProviderNode>,
    preset: VecDeque<SimulatedNode>,
    next_address: u32,
    ingress: BTreeSet<(String, u16)>,
    ingress_calls: usize,
    create_calls: usize,
    script_runs: Vec<ScriptRun>,
}

/// Simulated compute provider
pub struct InMemoryProvider {
    state: Arc<RwLock<MemoryState>>,
    capacity: Option<usize>,
    create_error: Option<String>,
    shuffle: bool,
    script_failures: HashSet<(String, String)>,
    unreachable: HashSet<String>,
}

impl InMemoryProvider {
    /// Create a provider with unlimited capacity
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            capacity: None,
            create_error: None,
            shuffle: false,
            script_failures: HashSet::new(),
            unreachable: HashSet::new(),
        }
    }

    /// Create at most `capacity` nodes per call
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Hand out these nodes first, in this order
    pub fn with_nodes(self, nodes: Vec<SimulatedNode>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.preset.extend(nodes);
        }
        self
    }

    /// Fail every `create_instances` call outright
    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    /// Return created nodes in random order
    pub fn shuffled(mut self) -> Self {
        self.shuffle = true;
        self
    }

    /// Make scripts named `script` exit non-zero on `node`
    pub fn fail_script(mut self, node: &str, script: &str) -> Self {
        self.script_failures
            .insert((node.to_string(), script.to_string()));
        self
    }

    /// Make `node` unreachable for scripts
    pub fn unreachable(mut self, node: &str) -> Self {
        self.unreachable.insert(node.to_string());
        self
    }

    /// Nodes created under a tag, in creation order
    pub fn nodes(&self, group_tag: &str) -> Result<Vec<ProviderNode>> {
        self.read_state(|s| {
            s.nodes
                .iter()
                .filter(|n| n.group_tag == group_tag)
                .cloned()
                .collect()
        })
    }

    /// Distinct `(group tag, port)` ingress rules
    pub fn ingress_rules(&self) -> Result<BTreeSet<(String, u16)>> {
        self.read_state(|s| s.ingress.clone())
    }

    /// Number of `authorize_ingress` calls made
    pub fn ingress_calls(&self) -> Result<usize> {
        self.read_state(|s| s.ingress_calls)
    }

    /// Number of `create_instances` calls made
    pub fn create_calls(&self) -> Result<usize> {
        self.read_state(|s| s.create_calls)
    }

    /// Every script run so far
    pub fn script_runs(&self) -> Result<Vec<ScriptRun>> {
        self.read_state(|s| s.script_runs.clone())
    }

    fn read_state<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> Result<T> {
        self.state
            .read()
            .map(|s| f(&s))
            .map_err(|_| EnsembleError::Lock("Failed to acquire read lock".to_string()))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| EnsembleError::Lock("Failed to acquire write lock".to_string()))
    }

    fn next_node(state: &mut MemoryState, group_tag: &str, template: &TemplateRequest) -> ProviderNode {
        let simulated = state.preset.pop_front().unwrap_or_else(|| {
            state.next_address += 1;
            let n = state.next_address;
            SimulatedNode::new(
                &Uuid::new_v4().to_string(),
                &format!("node-{}.{}.ensemble.local", n, group_tag),
                &format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff),
            )
        });

        let identity = template
            .hints
            .get("login-user")
            .map(String::as_str)
            .unwrap_or(DEFAULT_LOGIN_USER);

        ProviderNode {
            id: simulated.id,
            group_tag: group_tag.to_string(),
            hostname: simulated.public_addresses.first().cloned(),
            credentials: NodeCredentials::new(identity, None),
            public_addresses: simulated.public_addresses,
            private_addresses: simulated.private_addresses,
        }
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeProvider for InMemoryProvider {
    fn id(&self) -> &str {
        "memory"
    }

    async fn create_instances(
        &self,
        group_tag: &str,
        count: usize,
        template: &TemplateRequest,
    ) -> Result<Vec<ProviderNode>> {
        let mut state = self.write_state()?;
        state.create_calls += 1;

        if let Some(ref message) = self.create_error {
            return Err(EnsembleError::Provision(message.clone()));
        }

        let created = self.capacity.map_or(count, |c| c.min(count));
        if created == 0 {
            return Err(EnsembleError::Provision(format!(
                "No capacity for group {}",
                group_tag
            )));
        }

        let mut nodes: Vec<ProviderNode> = (0..created)
            .map(|_| Self::next_node(&mut state, group_tag, template))
            .collect();

        if self.shuffle {
            nodes.shuffle(&mut rand::thread_rng());
        }

        state.nodes.extend(nodes.iter().cloned());
        tracing::debug!(group = group_tag, requested = count, created, "Simulated nodes created");

        Ok(nodes)
    }

    async fn run_script(
        &self,
        selector: &NodeSelector,
        script: &Script,
        credentials: &NodeCredentials,
    ) -> Result<Vec<ScriptOutput>> {
        let targets: Vec<ProviderNode> = self.read_state(|s| {
            s.nodes
                .iter()
                .filter(|n| selector.matches(n))
                .cloned()
                .collect()
        })?;

        if targets.is_empty() {
            return Err(EnsembleError::Provision(format!(
                "No nodes match {}",
                selector
            )));
        }

        {
            let mut state = self.write_state()?;
            state.script_runs.push(ScriptRun {
                selector: selector.clone(),
                script: script.clone(),
                targets: targets.iter().map(|n| n.id.clone()).collect(),
                identity: credentials.identity.clone(),
            });
        }

        let failures = Arc::new(self.script_failures.clone());
        let unreachable = Arc::new(self.unreachable.clone());
        let name = script.name.clone();

        let results = fan_out(targets, move |node| {
            let failures = failures.clone();
            let unreachable = unreachable.clone();
            let name = name.clone();
            async move {
                if unreachable.contains(&node.id) {
                    return Err("unreachable".to_string());
                }
                let mut output = ScriptOutput::success(&node.id);
                if failures.contains(&(node.id.clone(), name)) {
                    output.exit_code = 1;
                    output.stderr = "simulated failure".to_string();
                }
                Ok(output)
            }
        })
        .await;

        collect_script_results(script, results)
    }

    async fn authorize_ingress(
        &self,
        group_tag: &str,
        nodes: &[ProviderNode],
        port: u16,
    ) -> Result<()> {
        let mut state = self.write_state()?;
        state.ingress_calls += 1;
        if state.ingress.insert((group_tag.to_string(), port)) {
            tracing::debug!(group = group_tag, port, nodes = nodes.len(), "Ingress authorized");
        }
        Ok(())
    }
}
