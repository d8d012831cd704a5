//! ZooKeeper ensemble

use super::{ScriptRef, ServiceDefinition};
use crate::error::Result;
use std::collections::BTreeSet;

/// ZooKeeper server role
pub const ZOOKEEPER_ROLE: &str = "zk";

/// ZooKeeper client port
pub const CLIENT_PORT: u16 = 2181;

/// ZooKeeper ensemble of `zk` servers.
///
/// The configure script receives every server's private address. The i-th
/// address becomes server id i, so the list must keep launch order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZooKeeperService;

impl ServiceDefinition for ZooKeeperService {
    fn name(&self) -> &'static str {
        "zookeeper"
    }

    fn roles(&self) -> &'static [&'static str] {
        &[ZOOKEEPER_ROLE]
    }

    fn client_port(&self, role: &str) -> Result<u16> {
        self.ensure_role(role)?;
        Ok(CLIENT_PORT)
    }

    fn ports(&self, role: &str) -> Result<BTreeSet<u16>> {
        self.ensure_role(role)?;
        Ok(BTreeSet::from([CLIENT_PORT]))
    }

    fn bootstrap_scripts(&self, role: &str) -> Result<Vec<String>> {
        self.ensure_role(role)?;
        Ok(vec![
            "sun/java/install".to_string(),
            "apache/zookeeper/install".to_string(),
        ])
    }

    fn configure_script(&self, role: &str, provider: &str, peers: &str) -> Result<ScriptRef> {
        self.ensure_role(role)?;
        Ok(ScriptRef::new("apache/zookeeper/post-configure")
            .arg("-c")
            .arg(provider)
            .arg(peers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_script() {
        let script = ZooKeeperService
            .configure_script("zk", "ec2", "10.0.0.1 10.0.0.2")
            .unwrap();

        assert_eq!(script.path, "apache/zookeeper/post-configure");
        assert_eq!(script.args, vec!["-c", "ec2", "10.0.0.1 10.0.0.2"]);
    }

    #[test]
    fn test_ports() {
        assert_eq!(ZooKeeperService.client_port("zk").unwrap(), 2181);
        assert_eq!(
            ZooKeeperService.ports("zk").unwrap().into_iter().collect::<Vec<_>>(),
            vec![2181]
        );
        assert!(ZooKeeperService.ports("nn").is_err());
    }
}
