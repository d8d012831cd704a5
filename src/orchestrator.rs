//! Cluster launch orchestration
//!
//! [`ClusterOrchestrator::launch_cluster`] runs a strict pipeline:
//!
//! 1. plan the role launch
//! 2. create instances under the cluster's group tag
//! 3. open the role's ports
//! 4. freeze the launch order and run the bootstrap script
//! 5. resolve private addresses and run the configure script with the
//!    ordered peer list
//! 6. assemble the [`Cluster`]
//!
//! Any failure aborts the launch. Nodes created before the failure are left
//! running; cleaning them up is the caller's job.

use crate::cluster::{Cluster, Instance};
use crate::config::OrchestratorConfig;
use crate::error::{EnsembleError, Result};
use crate::planner::RoleLaunchPlanner;
use crate::provider::{ComputeProvider, NodeCredentials, NodeSelector, ProviderNode};
use crate::script::{source_for, ScriptBuilder, ScriptSource};
use crate::service::ServiceDefinition;
use crate::spec::ClusterSpec;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Launch pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchPhase {
    Planned,
    Created,
    Authorized,
    Bootstrapped,
    Configured,
    Assembled,
    /// Terminal; reached from any other phase
    Failed,
}

impl LaunchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchPhase::Planned => "planned",
            LaunchPhase::Created => "created",
            LaunchPhase::Authorized => "authorized",
            LaunchPhase::Bootstrapped => "bootstrapped",
            LaunchPhase::Configured => "configured",
            LaunchPhase::Assembled => "assembled",
            LaunchPhase::Failed => "failed",
        }
    }

    /// The phase that follows this one on success
    pub fn next(&self) -> Option<LaunchPhase> {
        match self {
            LaunchPhase::Planned => Some(LaunchPhase::Created),
            LaunchPhase::Created => Some(LaunchPhase::Authorized),
            LaunchPhase::Authorized => Some(LaunchPhase::Bootstrapped),
            LaunchPhase::Bootstrapped => Some(LaunchPhase::Configured),
            LaunchPhase::Configured => Some(LaunchPhase::Assembled),
            LaunchPhase::Assembled | LaunchPhase::Failed => None,
        }
    }
}

impl fmt::Display for LaunchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase transition of one launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchEvent {
    pub cluster: String,
    pub role: String,
    pub phase: LaunchPhase,
    /// Phase details, e.g. `count=2/3`
    pub detail: String,
}

/// Tracks one launch through its phases and reports every transition
struct LaunchProgress {
    cluster: String,
    role: String,
    phase: Option<LaunchPhase>,
    events: Option<UnboundedSender<LaunchEvent>>,
}

impl LaunchProgress {
    fn new(cluster: &str, role: &str, events: Option<UnboundedSender<LaunchEvent>>) -> Self {
        Self {
            cluster: cluster.to_string(),
            role: role.to_string(),
            phase: None,
            events,
        }
    }

    fn advance(&mut self, phase: LaunchPhase, detail: String) {
        debug_assert_eq!(
            self.phase.map_or(Some(LaunchPhase::Planned), |p| p.next()),
            Some(phase),
            "launch phases must advance in order"
        );

        tracing::info!(
            cluster = %self.cluster,
            role = %self.role,
            phase = %phase,
            "{}",
            detail
        );
        self.emit(phase, detail);
    }

    fn fail(&mut self, error: &EnsembleError) {
        let last = self.phase.map_or("none", |p| p.as_str());
        tracing::error!(
            cluster = %self.cluster,
            role = %self.role,
            phase = %LaunchPhase::Failed,
            after = last,
            "{}",
            error
        );
        self.emit(LaunchPhase::Failed, format!("after={} error={}", last, error));
    }

    fn emit(&mut self, phase: LaunchPhase, detail: String) {
        self.phase = Some(phase);
        if let Some(ref events) = self.events {
            // A dropped receiver only means nobody is listening
            let _ = events.send(LaunchEvent {
                cluster: self.cluster.clone(),
                role: self.role.clone(),
                phase,
                detail,
            });
        }
    }
}

/// Launches clusters of one service on one compute provider
pub struct ClusterOrchestrator {
    provider: Arc<dyn ComputeProvider>,
    service: Arc<dyn ServiceDefinition>,
    config: OrchestratorConfig,
    script_source: Option<Arc<dyn ScriptSource>>,
    events: Option<UnboundedSender<LaunchEvent>>,
}

impl ClusterOrchestrator {
    pub fn new(provider: Arc<dyn ComputeProvider>, service: Arc<dyn ServiceDefinition>) -> Self {
        Self {
            provider,
            service,
            config: OrchestratorConfig::default(),
            script_source: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve scripts with this source instead of one derived from the cluster's script base
    pub fn with_script_source(mut self, source: Arc<dyn ScriptSource>) -> Self {
        self.script_source = Some(source);
        self
    }

    /// Send every phase transition to `events`
    pub fn with_events(mut self, events: UnboundedSender<LaunchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Launch the nodes of `role` and wire them into a cluster.
    ///
    /// Not idempotent: calling again after a failure creates more nodes.
    pub async fn launch_cluster(&self, spec: &ClusterSpec, role: &str) -> Result<Cluster> {
        let mut progress = LaunchProgress::new(&spec.cluster_name, role, self.events.clone());

        match self.run_pipeline(spec, role, &mut progress).await {
            Ok(cluster) => Ok(cluster),
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        spec: &ClusterSpec,
        role: &str,
        progress: &mut LaunchProgress,
    ) -> Result<Cluster> {
        tracing::info!("Launching {} cluster", spec.cluster_name);

        // Plan
        let plan = RoleLaunchPlanner::new(self.service.clone()).plan(spec, role)?;
        let firewall = self.service.firewall_policy()?;
        let client_port = self.service.client_port(role)?;
        let derived_source;
        let source: &dyn ScriptSource = match self.script_source {
            Some(ref source) => source.as_ref(),
            None => {
                derived_source = source_for(&plan.template.run_url_base, self.config.script_mode);
                derived_source.as_ref()
            }
        };
        progress.advance(
            LaunchPhase::Planned,
            format!("count={} provider={}", plan.instance_count, self.provider.id()),
        );

        // Create
        let group_tag = plan.cluster_name.as_str();
        let requested = plan.instance_count;
        let nodes = self
            .provider
            .create_instances(group_tag, requested, &plan.template)
            .await?;
        self.check_quorum(requested, nodes.len())?;
        progress.advance(
            LaunchPhase::Created,
            format!("count={}/{}", nodes.len(), requested),
        );

        // Authorize
        let ports = firewall
            .authorize(self.provider.as_ref(), group_tag, &nodes, role)
            .await?;
        progress.advance(LaunchPhase::Authorized, format!("ports={}", join(&ports, ",")));

        // Order & bootstrap. From here on the order is fixed: position i is
        // peer ordinal i.
        let ordered: &[ProviderNode] = &nodes;
        let credentials = script_credentials(ordered, spec)?;
        let bootstrap = ScriptBuilder::compose(
            source,
            "bootstrap",
            &plan.template.bootstrap_scripts,
            Vec::new(),
        )
        .await?;
        self.provider
            .run_script(&NodeSelector::nodes(ordered), &bootstrap, &credentials)
            .await?;
        progress.advance(
            LaunchPhase::Bootstrapped,
            format!("nodes={}", ordered.len()),
        );

        // Configure
        let mut private_addresses = Vec::with_capacity(ordered.len());
        for node in ordered {
            private_addresses.push(resolve_private_address(node).await?);
        }
        let peers = peer_list(&private_addresses);
        let configure_ref = self.service.configure_script(role, &spec.provider, &peers)?;
        let configure = ScriptBuilder::compose(
            source,
            "configure",
            std::slice::from_ref(&configure_ref.path),
            configure_ref.args,
        )
        .await?;
        self.provider
            .run_script(
                &NodeSelector::Tag(group_tag.to_string()),
                &configure,
                &credentials,
            )
            .await?;
        progress.advance(LaunchPhase::Configured, format!("peers={}", peers));

        // Assemble
        let roles = BTreeSet::from([role.to_string()]);
        let mut instances = Vec::with_capacity(ordered.len());
        let mut hosts = Vec::with_capacity(ordered.len());
        for (ordinal, (node, private_address)) in
            ordered.iter().zip(private_addresses).enumerate()
        {
            let public_address = public_name(node)?;
            instances.push(Instance::new(
                ordinal,
                &node.id,
                node.credentials.clone(),
                roles.clone(),
                &public_address,
                private_address,
            ));
            hosts.push(public_address);
        }

        let endpoint = service_endpoint(&hosts, client_port);
        let cluster = Cluster::new(&spec.cluster_name, instances, endpoint);
        progress.advance(
            LaunchPhase::Assembled,
            format!("endpoint={}", cluster.service_endpoint()),
        );

        tracing::info!("Completed launch of {}", spec.cluster_name);
        Ok(cluster)
    }

    fn check_quorum(&self, requested: usize, created: usize) -> Result<()> {
        if created == 0 {
            return Err(EnsembleError::Provision(
                "Provider created no nodes".to_string(),
            ));
        }

        if created < requested {
            let required = self.config.quorum.required(requested);
            tracing::warn!(
                created,
                requested,
                required,
                "Provider created fewer nodes than requested"
            );
            if created < required {
                return Err(EnsembleError::QuorumNotMet {
                    requested,
                    created,
                    required,
                });
            }
        }

        Ok(())
    }
}

/// Identity of the first node plus the cluster's private key. Every node shares
/// the injected key, so one set of credentials reaches them all.
fn script_credentials(nodes: &[ProviderNode], spec: &ClusterSpec) -> Result<NodeCredentials> {
    let first = nodes
        .first()
        .ok_or_else(|| EnsembleError::Provision("Provider created no nodes".to_string()))?;

    Ok(NodeCredentials::new(
        &first.credentials.identity,
        Some(spec.credentials.private_key.clone()),
    ))
}

/// Resolve a node's first private address to an IP
pub async fn resolve_private_address(node: &ProviderNode) -> Result<IpAddr> {
    let address = node.private_addresses.first().ok_or_else(|| {
        EnsembleError::AddressResolution {
            node: node.id.clone(),
            reason: "no private address".to_string(),
        }
    })?;

    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut resolved = tokio::net::lookup_host((address.as_str(), 0))
        .await
        .map_err(|e| EnsembleError::AddressResolution {
            node: node.id.clone(),
            reason: format!("{}: {}", address, e),
        })?;

    resolved
        .next()
        .map(|socket| socket.ip())
        .ok_or_else(|| EnsembleError::AddressResolution {
            node: node.id.clone(),
            reason: format!("{} has no addresses", address),
        })
}

/// Provider-reported public name of a node
pub fn public_name(node: &ProviderNode) -> Result<String> {
    node.public_addresses
        .first()
        .or(node.hostname.as_ref())
        .cloned()
        .ok_or_else(|| EnsembleError::AddressResolution {
            node: node.id.clone(),
            reason: "no public address".to_string(),
        })
}

/// Space-separated addresses, in the given order
pub fn peer_list(addresses: &[IpAddr]) -> String {
    join(addresses, " ")
}

/// Comma-separated `host:port` list
pub fn service_endpoint(hosts: &[String], port: u16) -> String {
    hosts
        .iter()
        .map(|host| format!("{}:{}", host, port))
        .collect::<Vec<_>>()
        .join(",")
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>, separator: &str) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
