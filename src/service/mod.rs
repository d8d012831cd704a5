//! Service definitions
//!
//! A service definition maps the roles of a distributed service to the
//! scripts that install and configure it and the ports it listens on. It is
//! independent of the compute provider the service is launched on.

pub mod cassandra;
pub mod zookeeper;

pub use cassandra::CassandraService;
pub use zookeeper::ZooKeeperService;

use crate::error::{EnsembleError, Result};
use crate::firewall::FirewallPolicy;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A script path plus the arguments it runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRef {
    /// Path relative to the script base
    pub path: String,
    /// Arguments, in order
    pub args: Vec<String>,
}

impl ScriptRef {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Role to scripts and ports mapping for one distributed service
pub trait ServiceDefinition: Send + Sync {
    /// Service name, as used in cluster specs
    fn name(&self) -> &'static str;

    /// Roles this service knows how to launch
    fn roles(&self) -> &'static [&'static str];

    /// The single well-known port clients connect to
    fn client_port(&self, role: &str) -> Result<u16>;

    /// Every port that must be reachable for the role
    fn ports(&self, role: &str) -> Result<BTreeSet<u16>>;

    /// Install scripts, in run order; need no peer knowledge
    fn bootstrap_scripts(&self, role: &str) -> Result<Vec<String>>;

    /// Configure script wiring a node to its peers.
    ///
    /// `peers` is the space-separated private address list in ordinal order.
    fn configure_script(&self, role: &str, provider: &str, peers: &str) -> Result<ScriptRef>;

    /// Fail with `UnknownRole` unless the service serves `role`
    fn ensure_role(&self, role: &str) -> Result<()> {
        if self.roles().iter().any(|r| *r == role) {
            Ok(())
        } else {
            Err(EnsembleError::UnknownRole(format!(
                "{} (service {} serves: {})",
                role,
                self.name(),
                self.roles().join(", ")
            )))
        }
    }

    /// Firewall policy covering every role of the service
    fn firewall_policy(&self) -> Result<FirewallPolicy> {
        let mut policy = FirewallPolicy::new();
        for role in self.roles() {
            policy = policy.allow(role, self.ports(role)?);
        }
        Ok(policy)
    }
}

/// Looks up service definitions by name
pub struct ServiceRegistry {
    services: BTreeMap<&'static str, Arc<dyn ServiceDefinition>>,
}

impl ServiceRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            services: BTreeMap::new(),
        }
    }

    /// A registry with every built-in service
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ZooKeeperService));
        registry.register(Arc::new(CassandraService));
        registry
    }

    /// Add a service, replacing any with the same name
    pub fn register(&mut self, service: Arc<dyn ServiceDefinition>) {
        self.services.insert(service.name(), service);
    }

    /// Look up a service by name
    pub fn create(&self, name: &str) -> Result<Arc<dyn ServiceDefinition>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| EnsembleError::UnknownService(name.to_string()))
    }

    /// All registered services, by name
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn ServiceDefinition>> {
        self.services.values()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = ServiceRegistry::builtin();
        assert_eq!(registry.create("zookeeper").unwrap().name(), "zookeeper");
        assert_eq!(registry.create("cassandra").unwrap().name(), "cassandra");
    }

    #[test]
    fn test_registry_unknown_service() {
        let registry = ServiceRegistry::builtin();
        let result = registry.create("bar");
        assert!(matches!(result, Err(EnsembleError::UnknownService(ref s)) if s == "bar"));
    }

    #[test]
    fn test_registry_list_sorted() {
        let registry = ServiceRegistry::builtin();
        let names: Vec<_> = registry.list().map(|s| s.name()).collect();
        assert_eq!(names, vec!["cassandra", "zookeeper"]);
    }

    #[test]
    fn test_ensure_role() {
        let zk = ZooKeeperService;
        assert!(zk.ensure_role("zk").is_ok());
        assert!(matches!(
            zk.ensure_role("cassandra"),
            Err(EnsembleError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_script_ref_builder() {
        let script = ScriptRef::new("a/b").arg("-c").arg("ec2");
        assert_eq!(script.path, "a/b");
        assert_eq!(script.args, vec!["-c", "ec2"]);
    }
}
