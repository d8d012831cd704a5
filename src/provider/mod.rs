//! Compute providers
//!
//! A compute provider creates tagged groups of machines, runs scripts on
//! them and opens ingress ports. Everything is scoped by the group tag, so
//! launches of differently named clusters never share provider state.

pub mod byon;
pub mod memory;

pub use byon::ByonProvider;
pub use memory::{InMemoryProvider, SimulatedNode};

use crate::error::{EnsembleError, NodeFailure, Result};
use crate::planner::TemplateRequest;
use crate::script::Script;
use crate::spec::ClusterSpec;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Login credentials for a node
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeCredentials {
    /// Login identity (user name)
    pub identity: String,
    /// Private key, if known
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl NodeCredentials {
    pub fn new(identity: &str, private_key: Option<String>) -> Self {
        Self {
            identity: identity.to_string(),
            private_key,
        }
    }
}

impl fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("identity", &self.identity)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// A running machine as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderNode {
    /// Provider node ID
    pub id: String,
    /// Group tag the node was created under
    pub group_tag: String,
    /// Host name, if the provider reports one
    pub hostname: Option<String>,
    /// Credentials the provider created the node with
    pub credentials: NodeCredentials,
    /// Public names or addresses
    pub public_addresses: Vec<String>,
    /// Private names or addresses
    pub private_addresses: Vec<String>,
}

/// Which nodes a script runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelector {
    /// Every running node with the group tag
    Tag(String),
    /// Exactly these node IDs
    Nodes(Vec<String>),
}

impl NodeSelector {
    /// Select exactly the given nodes
    pub fn nodes(nodes: &[ProviderNode]) -> Self {
        NodeSelector::Nodes(nodes.iter().map(|n| n.id.clone()).collect())
    }

    /// Whether the selector matches a node
    pub fn matches(&self, node: &ProviderNode) -> bool {
        match self {
            NodeSelector::Tag(tag) => node.group_tag == *tag,
            NodeSelector::Nodes(ids) => ids.contains(&node.id),
        }
    }
}

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeSelector::Tag(tag) => write!(f, "tag={}", tag),
            NodeSelector::Nodes(ids) => write!(f, "nodes=[{}]", ids.join(",")),
        }
    }
}

/// Result of a script on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Node ID
    pub node: String,
    /// Exit code
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ScriptOutput {
    pub fn success(node: &str) -> Self {
        Self {
            node: node.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Abstract cloud backend
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Provider ID
    fn id(&self) -> &str;

    /// Create up to `count` nodes tagged `group_tag`.
    ///
    /// Best-effort: may return fewer nodes than requested. Fails with
    /// `Provision` when no node could be created. The returned order is the
    /// provider's launch order.
    async fn create_instances(
        &self,
        group_tag: &str,
        count: usize,
        template: &TemplateRequest,
    ) -> Result<Vec<ProviderNode>>;

    /// Run a script on every node matching `selector`, in parallel.
    ///
    /// Fails with `ScriptExecution` naming every node that exited non-zero
    /// or could not be reached.
    async fn run_script(
        &self,
        selector: &NodeSelector,
        script: &Script,
        credentials: &NodeCredentials,
    ) -> Result<Vec<ScriptOutput>>;

    /// Open a TCP port to the group's nodes. Idempotent.
    async fn authorize_ingress(
        &self,
        group_tag: &str,
        nodes: &[ProviderNode],
        port: u16,
    ) -> Result<()>;
}

/// Build the provider a spec names
pub fn provider_for(spec: &ClusterSpec) -> Result<Arc<dyn ComputeProvider>> {
    match spec.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryProvider::new())),
        "byon" => Ok(Arc::new(ByonProvider::new(spec.byon_hosts.clone()))),
        other => Err(EnsembleError::Configuration(format!(
            "Unsupported provider: {}",
            other
        ))),
    }
}

/// Run `task` for every node concurrently and wait for all of them.
///
/// Results come back in node order. A task that panics counts as a failure
/// of its node.
pub(crate) async fn fan_out<F, Fut>(
    nodes: Vec<ProviderNode>,
    task: F,
) -> Vec<(String, std::result::Result<ScriptOutput, String>)>
where
    F: Fn(ProviderNode) -> Fut,
    Fut: Future<Output = std::result::Result<ScriptOutput, String>> + Send + 'static,
{
    let handles: Vec<_> = nodes
        .into_iter()
        .map(|node| {
            let id = node.id.clone();
            (id, tokio::spawn(task(node)))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(format!("task failed: {}", e)),
        };
        results.push((id, result));
    }
    results
}

/// Turn per-node results into the provider contract: all outputs, or an
/// error naming every failed node
pub(crate) fn collect_script_results(
    script: &Script,
    results: Vec<(String, std::result::Result<ScriptOutput, String>)>,
) -> Result<Vec<ScriptOutput>> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut failed_nodes = Vec::new();

    for (node, result) in results {
        match result {
            Ok(output) if output.exit_code == 0 => outputs.push(output),
            Ok(output) => {
                let reason = if output.stderr.trim().is_empty() {
                    format!("exit status {}", output.exit_code)
                } else {
                    format!(
                        "exit status {}: {}",
                        output.exit_code,
                        output.stderr.trim()
                    )
                };
                failed_nodes.push(NodeFailure::new(node, reason));
            }
            Err(reason) => failed_nodes.push(NodeFailure::new(node, reason)),
        }
    }

    if failed_nodes.is_empty() {
        Ok(outputs)
    } else {
        Err(EnsembleError::ScriptExecution {
            phase: script.name.clone(),
            failed_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::KeyPair;

    fn node(id: &str, tag: &str) -> ProviderNode {
        ProviderNode {
            id: id.to_string(),
            group_tag: tag.to_string(),
            hostname: None,
            credentials: NodeCredentials::default(),
            public_addresses: Vec::new(),
            private_addresses: Vec::new(),
        }
    }

    #[test]
    fn test_selector_matches() {
        let a = node("a", "c1");
        let b = node("b", "c2");

        let tag = NodeSelector::Tag("c1".to_string());
        assert!(tag.matches(&a));
        assert!(!tag.matches(&b));

        let ids = NodeSelector::nodes(&[b.clone()]);
        assert!(!ids.matches(&a));
        assert!(ids.matches(&b));
        assert_eq!(ids.to_string(), "nodes=[b]");
    }

    #[test]
    fn test_collect_script_results() {
        let script = Script::new("bootstrap", Vec::new(), Vec::new());
        let mut failed = ScriptOutput::success("n1");
        failed.exit_code = 2;

        let err = collect_script_results(
            &script,
            vec![
                ("n0".to_string(), Ok(ScriptOutput::success("n0"))),
                ("n1".to_string(), Ok(failed)),
                ("n2".to_string(), Err("unreachable".to_string())),
            ],
        )
        .unwrap_err();

        assert_eq!(err.failed_nodes(), vec!["n1", "n2"]);
        assert!(err.to_string().starts_with("bootstrap script failed"));
    }

    #[tokio::test]
    async fn test_fan_out_keeps_node_order() {
        let nodes = vec![node("a", "t"), node("b", "t"), node("c", "t")];
        let results = fan_out(nodes, |node| async move {
            if node.id == "b" {
                panic!("boom");
            }
            Ok(ScriptOutput::success(&node.id))
        })
        .await;

        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn test_provider_for() {
        let spec = ClusterSpec::new("c", "zookeeper", "memory", KeyPair::default());
        assert_eq!(provider_for(&spec).unwrap().id(), "memory");

        let mut spec = spec;
        spec.provider = "byon".to_string();
        assert_eq!(provider_for(&spec).unwrap().id(), "byon");

        spec.provider = "vcloud".to_string();
        assert!(matches!(
            provider_for(&spec),
            Err(EnsembleError::Configuration(_))
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = NodeCredentials::new("root", Some("secret".to_string()));
        let debug = format!("{:?}", creds);
        assert!(debug.contains("root"));
        assert!(!debug.contains("secret"));
    }
}
