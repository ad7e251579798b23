use serde::{Deserialize, Serialize};

use crate::generator::GeneratorConfig;
use crate::service::ServiceConfig;
use crate::solver::SearchConfig;

/// All tunables in one place. Missing JSON fields fall back to their defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub generator: GeneratorConfig,
    pub service: ServiceConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::PourPolicy;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "search": { "max_expansions": 50, "policy": "capped" }, "generator": { "seed": 7 } }"#,
        )
        .unwrap();
        assert_eq!(config.search.max_expansions, 50);
        assert_eq!(config.search.max_states, 10_000);
        assert_eq!(config.search.policy, PourPolicy::Capped);
        assert_eq!(config.generator.seed, Some(7));
        assert_eq!(config.generator.container_capacity, 4);
        assert_eq!(config.service.max_attempts, 50);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }
}
