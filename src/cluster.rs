//! Provisioned clusters

use crate::provider::NodeCredentials;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::IpAddr;

/// A provisioned machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    ordinal: usize,
    id: String,
    credentials: NodeCredentials,
    roles: BTreeSet<String>,
    public_address: String,
    private_address: IpAddr,
}

impl Instance {
    pub(crate) fn new(
        ordinal: usize,
        id: &str,
        credentials: NodeCredentials,
        roles: BTreeSet<String>,
        public_address: &str,
        private_address: IpAddr,
    ) -> Self {
        Self {
            ordinal,
            id: id.to_string(),
            credentials,
            roles,
            public_address: public_address.to_string(),
            private_address,
        }
    }

    /// Position in launch order; the service's peer ID
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Provider node ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credentials(&self) -> &NodeCredentials {
        &self.credentials
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Public name or address, as reported by the provider
    pub fn public_address(&self) -> &str {
        &self.public_address
    }

    pub fn private_address(&self) -> IpAddr {
        self.private_address
    }
}

/// The result of a launch. Never modified after it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    name: String,
    instances: Vec<Instance>,
    service_endpoint: String,
    launched_at: DateTime<Utc>,
}

impl Cluster {
    pub(crate) fn new(name: &str, instances: Vec<Instance>, service_endpoint: String) -> Self {
        Self {
            name: name.to_string(),
            instances,
            service_endpoint,
            launched_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instances in ordinal order
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instances_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Instance> {
        self.instances.iter().filter(move |i| i.has_role(role))
    }

    /// Comma-separated `host:port` list for clients
    pub fn service_endpoint(&self) -> &str {
        &self.service_endpoint
    }

    /// Space-separated private addresses in ordinal order
    pub fn peer_list(&self) -> String {
        self.instances
            .iter()
            .map(|i| i.private_address.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
