//! Role launch planning
//!
//! Turns a role in a cluster spec into a [`LaunchPlan`]: how many instances to
//! create and the template the provider creates them from. Planning never
//! touches a provider, so every failure here is a configuration defect.

use crate::error::Result;
use crate::service::ServiceDefinition;
use crate::spec::{ClusterSpec, InstanceTemplate};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Provider-facing description of the machines to create
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateRequest {
    /// Image or OS hint
    pub image: Option<String>,
    /// Hardware profile hint
    pub hardware: Option<String>,
    /// Location hint
    pub location: Option<String>,
    /// Provider-specific hints
    pub hints: HashMap<String, String>,
    /// Public key to authorize for login
    pub authorize_public_key: Option<String>,
    /// Private key to install on each node
    #[serde(skip)]
    pub install_private_key: Option<String>,
    /// Base location the bootstrap scripts are fetched from
    pub run_url_base: String,
    /// Bootstrap script paths, in run order
    pub bootstrap_scripts: Vec<String>,
}

impl TemplateRequest {
    /// Start a request from the per-role hints
    pub fn from_instance_template(template: &InstanceTemplate) -> Self {
        Self {
            image: template.image.clone(),
            hardware: template.hardware.clone(),
            location: template.location.clone(),
            hints: template.hints.clone(),
            ..Default::default()
        }
    }
}

impl fmt::Debug for TemplateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRequest")
            .field("image", &self.image)
            .field("hardware", &self.hardware)
            .field("location", &self.location)
            .field("hints", &self.hints)
            .field("authorize_public_key", &self.authorize_public_key.is_some())
            .field("install_private_key", &self.install_private_key.is_some())
            .field("run_url_base", &self.run_url_base)
            .field("bootstrap_scripts", &self.bootstrap_scripts)
            .finish()
    }
}

/// Everything needed to create one role's instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    /// Cluster name, used as the provider group tag
    pub cluster_name: String,
    /// Role being launched
    pub role: String,
    /// Number of instances to request
    pub instance_count: usize,
    /// Creation template
    pub template: TemplateRequest,
}

/// Resolves roles into decorated launch plans
pub struct RoleLaunchPlanner {
    service: Arc<dyn ServiceDefinition>,
}

impl RoleLaunchPlanner {
    pub fn new(service: Arc<dyn ServiceDefinition>) -> Self {
        Self { service }
    }

    /// Plan a role launch
    pub fn plan(&self, spec: &ClusterSpec, role: &str) -> Result<LaunchPlan> {
        spec.validate_name()?;

        let mut plan = spec.resolve_role(role)?;
        let bootstrap_scripts = self.service.bootstrap_scripts(role)?;

        plan.template.authorize_public_key = Some(spec.credentials.public_key.clone());
        plan.template.install_private_key = Some(spec.credentials.private_key.clone());
        plan.template.run_url_base = spec.run_url_base.clone();
        plan.template.bootstrap_scripts = bootstrap_scripts;

        tracing::debug!(
            cluster = %plan.cluster_name,
            role = %plan.role,
            count = plan.instance_count,
            "Planned launch"
        );

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnsembleError;
    use crate::service::ZooKeeperService;
    use crate::spec::KeyPair;

    fn planner() -> RoleLaunchPlanner {
        RoleLaunchPlanner::new(Arc::new(ZooKeeperService))
    }

    fn spec() -> ClusterSpec {
        ClusterSpec::new("zk-cluster", "zookeeper", "memory", KeyPair::new("pub", "priv"))
            .role("zk", 3)
            .run_url_base("http://scripts.example.com")
    }

    #[test]
    fn test_plan_decorates_template() {
        let plan = planner().plan(&spec(), "zk").unwrap();

        assert_eq!(plan.instance_count, 3);
        assert_eq!(plan.template.authorize_public_key.as_deref(), Some("pub"));
        assert_eq!(plan.template.install_private_key.as_deref(), Some("priv"));
        assert_eq!(plan.template.run_url_base, "http://scripts.example.com");
        assert_eq!(
            plan.template.bootstrap_scripts,
            vec!["sun/java/install", "apache/zookeeper/install"]
        );
    }

    #[test]
    fn test_plan_unknown_role() {
        let result = planner().plan(&spec(), "namenode");
        assert!(matches!(result, Err(EnsembleError::UnknownRole(_))));
    }

    #[test]
    fn test_plan_role_not_served() {
        // Declared in the spec but the service has no scripts for it
        let spec = spec().role("cassandra", 2);
        let result = planner().plan(&spec, "cassandra");
        assert!(matches!(result, Err(EnsembleError::UnknownRole(_))));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let plan = planner().plan(&spec(), "zk").unwrap();
        assert!(!format!("{:?}", plan).contains("\"priv\""));
    }
}
