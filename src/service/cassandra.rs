//! Cassandra ring

use super::{ScriptRef, ServiceDefinition};
use crate::error::Result;
use std::collections::BTreeSet;

pub const CASSANDRA_ROLE: &str = "cassandra";

/// Thrift client port
pub const CLIENT_PORT: u16 = 9160;

/// Inter-node gossip port
pub const STORAGE_PORT: u16 = 7000;

#[derive(Debug, Clone, Copy, Default)]
pub struct CassandraService;

impl ServiceDefinition for CassandraService {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    fn roles(&self) -> &'static [&'static str] {
        &[CASSANDRA_ROLE]
    }

    fn client_port(&self, role: &str) -> Result<u16> {
        self.ensure_role(role)?;
        Ok(CLIENT_PORT)
    }

    fn ports(&self, role: &str) -> Result<BTreeSet<u16>> {
        self.ensure_role(role)?;
        Ok(BTreeSet::from([CLIENT_PORT, STORAGE_PORT]))
    }

    fn bootstrap_scripts(&self, role: &str) -> Result<Vec<String>> {
        self.ensure_role(role)?;
        Ok(vec![
            "sun/java/install".to_string(),
            "apache/cassandra/install".to_string(),
        ])
    }

    // Every node doubles as a seed.
    fn configure_script(&self, role: &str, provider: &str, peers: &str) -> Result<ScriptRef> {
        self.ensure_role(role)?;
        Ok(ScriptRef::new("apache/cassandra/post-configure")
            .arg("-c")
            .arg(provider)
            .arg(peers))
    }
}
