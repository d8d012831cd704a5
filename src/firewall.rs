//! Firewall policy
//!
//! Static mapping from role to the ports its nodes must expose.

use crate::error::{EnsembleError, Result};
use crate::provider::{ComputeProvider, ProviderNode};
use std::collections::{BTreeMap, BTreeSet};

/// Ports to open per role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallPolicy {
    rules: BTreeMap<String, BTreeSet<u16>>,
}

impl FirewallPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `ports` for `role`, adding to any already allowed
    pub fn allow(mut self, role: &str, ports: impl IntoIterator<Item = u16>) -> Self {
        self.rules.entry(role.to_string()).or_default().extend(ports);
        self
    }

    /// Ports the role needs open
    pub fn ports_for(&self, role: &str) -> Result<BTreeSet<u16>> {
        self.rules
            .get(role)
            .cloned()
            .ok_or_else(|| EnsembleError::UnknownRole(role.to_string()))
    }

    /// Open the role's ports to the group's nodes.
    ///
    /// Relies on `authorize_ingress` being idempotent, so it is safe to call
    /// again for a group that is already authorized.
    pub async fn authorize(
        &self,
        provider: &dyn ComputeProvider,
        group_tag: &str,
        nodes: &[ProviderNode],
        role: &str,
    ) -> Result<BTreeSet<u16>> {
        let ports = self.ports_for(role)?;
        for port in &ports {
            tracing::debug!(group = group_tag, port = *port, "Authorizing ingress");
            provider.authorize_ingress(group_tag, nodes, *port).await?;
        }
        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::TemplateRequest;
    use crate::provider::InMemoryProvider;

    #[test]
    fn test_ports_for() {
        let policy = FirewallPolicy::new().allow("zk", [2181]).allow("zk", [2888, 3888]);
        let ports: Vec<_> = policy.ports_for("zk").unwrap().into_iter().collect();
        assert_eq!(ports, vec![2181, 2888, 3888]);
    }

    #[test]
    fn test_unknown_role() {
        let policy = FirewallPolicy::new().allow("zk", [2181]);
        assert!(matches!(
            policy.ports_for("nn"),
            Err(EnsembleError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_twice_same_rules() {
        let provider = InMemoryProvider::new();
        let nodes = provider
            .create_instances("c1", 3, &TemplateRequest::default())
            .await
            .unwrap();
        let policy = FirewallPolicy::new().allow("cassandra", [9160, 7000]);

        policy.authorize(&provider, "c1", &nodes, "cassandra").await.unwrap();
        let once = provider.ingress_rules().unwrap();
        policy.authorize(&provider, "c1", &nodes, "cassandra").await.unwrap();

        assert_eq!(provider.ingress_rules().unwrap(), once);
        assert_eq!(
            once,
            BTreeSet::from([("c1".to_string(), 7000), ("c1".to_string(), 9160)])
        );
    }
}
