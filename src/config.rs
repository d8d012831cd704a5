//! Orchestrator configuration

use crate::script::ScriptMode;
use serde::{Deserialize, Serialize};

/// How many of the requested nodes must come up for a launch to proceed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// Proceed with any non-empty set of nodes
    #[default]
    Permissive,
    /// Require a strict majority of the requested nodes
    Majority,
    /// Require at least this many nodes (capped at the requested count)
    AtLeast(usize),
}

impl QuorumPolicy {
    /// Minimum node count for a request of `requested` nodes
    pub fn required(&self, requested: usize) -> usize {
        let required = match self {
            QuorumPolicy::Permissive => 1,
            QuorumPolicy::Majority => requested / 2 + 1,
            QuorumPolicy::AtLeast(n) => (*n).min(requested),
        };
        required.max(1)
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Under-provisioning threshold
    #[serde(default)]
    pub quorum: QuorumPolicy,
    /// How HTTP script bases are resolved
    #[serde(default)]
    pub script_mode: ScriptMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_required() {
        assert_eq!(QuorumPolicy::Permissive.required(5), 1);
        assert_eq!(QuorumPolicy::Majority.required(3), 2);
        assert_eq!(QuorumPolicy::Majority.required(4), 3);
        assert_eq!(QuorumPolicy::AtLeast(2).required(5), 2);
        assert_eq!(QuorumPolicy::AtLeast(9).required(3), 3);
        assert_eq!(QuorumPolicy::AtLeast(0).required(3), 1);
    }

    #[test]
    fn test_deserialize_config() {
        let config: OrchestratorConfig =
            serde_yaml::from_str("quorum: majority\nscript_mode: inline\n").unwrap();
        assert_eq!(config.quorum, QuorumPolicy::Majority);
        assert_eq!(config.script_mode, ScriptMode::Inline);

        let config: OrchestratorConfig = serde_json::from_str(r#"{"quorum":{"at_least":2}}"#).unwrap();
        assert_eq!(config.quorum, QuorumPolicy::AtLeast(2));
        assert_eq!(config.script_mode, ScriptMode::RunUrl);
    }
}
