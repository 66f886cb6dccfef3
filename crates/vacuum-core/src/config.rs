//! Coordinator configuration.
//!
//! Loaded from TOML, overridable from `VACUUM_*` environment variables, and
//! validated before any component is built from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::types::{BackendClass, Node, SignerPolicy};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "VACUUM_";

/// One entry of the registry seed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSeed {
    /// Node identifier
    pub id: String,
    /// Backend class
    pub backend_class: BackendClass,
    /// Transport endpoint
    pub endpoint: String,
    /// Region label
    pub region: String,
    /// Primary flag
    #[serde(default)]
    pub is_primary: bool,
    /// Capacity in bytes
    pub capacity_bytes: u64,
}

impl NodeSeed {
    /// Materialise the seed as an empty active node.
    pub fn to_node(&self) -> Node {
        let node = Node::new(
            self.id.as_str(),
            self.backend_class,
            self.endpoint.as_str(),
            self.region.as_str(),
            self.capacity_bytes,
        );
        if self.is_primary {
            node.primary()
        } else {
            node
        }
    }
}

/// Runtime configuration for the coordinator and its scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Signatures required for approval
    pub signature_threshold: usize,
    /// How repeated signers count towards the threshold
    pub signer_policy: SignerPolicy,
    /// Whether approval also requires a passed policy precheck
    pub require_precheck_for_approval: bool,
    /// Utilisation at which a node becomes `Degraded`
    pub degraded_ratio: f64,
    /// Utilisation at which a node becomes `Failed`
    pub failed_ratio: f64,
    /// Active nodes required for distributed resilience
    pub min_active_nodes: usize,
    /// Balance coefficient ceiling for configuration balance
    pub balance_ceiling: f64,
    /// Per-node backend write timeout
    pub backend_write_timeout_ms: u64,
    /// Scheduler tick interval
    pub sync_interval_secs: u64,
    /// Rebalance on every Nth scheduler tick
    pub rebalance_every_ticks: u64,
    /// Distinct authorisers required to reset escalation
    pub deescalation_quorum: usize,
    /// Anchor entries kept in memory and in the state file; 0 keeps all
    pub anchor_retention: usize,
    /// Material hashed by the default policy source
    pub policy_material: String,
    /// Root directory for the CLI's directory backend
    pub data_dir: PathBuf,
    /// Registry seed set
    pub seed_nodes: Vec<NodeSeed>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            signature_threshold: 3,
            signer_policy: SignerPolicy::DistinctSigners,
            require_precheck_for_approval: true,
            degraded_ratio: 0.80,
            failed_ratio: 0.95,
            min_active_nodes: 5,
            balance_ceiling: 0.1,
            backend_write_timeout_ms: 5_000,
            sync_interval_secs: 60,
            rebalance_every_ticks: 10,
            deescalation_quorum: 3,
            anchor_retention: 1_440,
            policy_material: "vacuum-default-policy".to_string(),
            data_dir: PathBuf::from("./vacuum-data"),
            seed_nodes: default_seed_nodes(),
        }
    }
}

/// Two nodes per backend class, the first of each class primary, 1 GiB each.
pub fn default_seed_nodes() -> Vec<NodeSeed> {
    const GIB: u64 = 1024 * 1024 * 1024;
    let mut seeds = Vec::new();
    for class in BackendClass::ALL {
        let (prefix, scheme) = match class {
            BackendClass::ObjectStore => ("os", "s3"),
            BackendClass::ServerVolume => ("sv", "ssh"),
            BackendClass::CloudVolume => ("cv", "blk"),
        };
        for index in 1..=2 {
            seeds.push(NodeSeed {
                id: format!("{prefix}-{index}"),
                backend_class: class,
                endpoint: format!("{scheme}://{prefix}-{index}.vacuum.internal"),
                region: if index == 1 { "eu-west" } else { "us-east" }.to_string(),
                is_primary: index == 1,
                capacity_bytes: GIB,
            });
        }
    }
    seeds
}

impl CoordinatorConfig {
    /// Parse from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> CoordinatorResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> CoordinatorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise start from defaults; then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> CoordinatorResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            _ => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VACUUM_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> CoordinatorResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `VACUUM_*` overrides from an explicit variable list.
    ///
    /// Keys map to field names, e.g. `VACUUM_SIGNATURE_THRESHOLD=4`. Unknown
    /// keys are ignored.
    pub fn merge_with_vars<I>(&mut self, vars: I) -> CoordinatorResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field.to_ascii_lowercase().as_str() {
                "signature_threshold" => self.signature_threshold = parse(&key, &value)?,
                "require_precheck_for_approval" => {
                    self.require_precheck_for_approval = parse(&key, &value)?;
                }
                "signer_policy" => {
                    self.signer_policy = match value.as_str() {
                        "distinct_signers" => SignerPolicy::DistinctSigners,
                        "count_every_signature" => SignerPolicy::CountEverySignature,
                        other => {
                            return Err(CoordinatorError::config(format!(
                                "{key}: unknown signer policy {other:?}"
                            )))
                        }
                    };
                }
                "degraded_ratio" => self.degraded_ratio = parse(&key, &value)?,
                "failed_ratio" => self.failed_ratio = parse(&key, &value)?,
                "min_active_nodes" => self.min_active_nodes = parse(&key, &value)?,
                "balance_ceiling" => self.balance_ceiling = parse(&key, &value)?,
                "backend_write_timeout_ms" => {
                    self.backend_write_timeout_ms = parse(&key, &value)?;
                }
                "sync_interval_secs" => self.sync_interval_secs = parse(&key, &value)?,
                "rebalance_every_ticks" => self.rebalance_every_ticks = parse(&key, &value)?,
                "deescalation_quorum" => self.deescalation_quorum = parse(&key, &value)?,
                "anchor_retention" => self.anchor_retention = parse(&key, &value)?,
                "policy_material" => self.policy_material = value,
                "data_dir" => self.data_dir = PathBuf::from(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.signature_threshold == 0 {
            return Err(CoordinatorError::config("signature_threshold must be >= 1"));
        }
        if self.deescalation_quorum == 0 {
            return Err(CoordinatorError::config("deescalation_quorum must be >= 1"));
        }
        for (name, ratio) in [
            ("degraded_ratio", self.degraded_ratio),
            ("failed_ratio", self.failed_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(CoordinatorError::config(format!(
                    "{name} must be in (0, 1], got {ratio}"
                )));
            }
        }
        if self.degraded_ratio >= self.failed_ratio {
            return Err(CoordinatorError::config(format!(
                "degraded_ratio ({}) must be below failed_ratio ({})",
                self.degraded_ratio, self.failed_ratio
            )));
        }
        if self.balance_ceiling < 0.0 {
            return Err(CoordinatorError::config("balance_ceiling must be >= 0"));
        }
        if self.sync_interval_secs == 0 {
            return Err(CoordinatorError::config("sync_interval_secs must be >= 1"));
        }
        if self.rebalance_every_ticks == 0 {
            return Err(CoordinatorError::config("rebalance_every_ticks must be >= 1"));
        }
        let mut ids = BTreeSet::new();
        for seed in &self.seed_nodes {
            if !ids.insert(seed.id.as_str()) {
                return Err(CoordinatorError::config(format!(
                    "duplicate seed node id {}",
                    seed.id
                )));
            }
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> CoordinatorResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| CoordinatorError::config(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = CoordinatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.seed_nodes.len(), 6);
        assert_eq!(config.seed_nodes.iter().filter(|s| s.is_primary).count(), 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            signature_threshold = 4
            signer_policy = "count_every_signature"

            [[seed_nodes]]
            id = "os-a"
            backend_class = "ObjectStore"
            endpoint = "s3://a"
            region = "eu"
            capacity_bytes = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.signature_threshold, 4);
        assert_eq!(config.signer_policy, SignerPolicy::CountEverySignature);
        assert_eq!(config.seed_nodes.len(), 1);
        assert!(!config.seed_nodes[0].is_primary);
        assert!((config.failed_ratio - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "min_active_nodes = 2").unwrap();
        let config = CoordinatorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.min_active_nodes, 2);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CoordinatorConfig::default();
        config
            .merge_with_vars(vec![
                ("VACUUM_SIGNATURE_THRESHOLD".to_string(), "5".to_string()),
                ("VACUUM_FAILED_RATIO".to_string(), "0.9".to_string()),
                ("VACUUM_ANCHOR_RETENTION".to_string(), "0".to_string()),
                ("OTHER_SETTING".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.signature_threshold, 5);
        assert!((config.failed_ratio - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.anchor_retention, 0);

        let err = config
            .merge_with_vars(vec![(
                "VACUUM_MIN_ACTIVE_NODES".to_string(),
                "many".to_string(),
            )])
            .unwrap_err();
        assert_matches!(err, CoordinatorError::Config { .. });
    }

    #[test]
    fn test_validation_rejects_inverted_ratios() {
        let config = CoordinatorConfig {
            degraded_ratio: 0.96,
            ..CoordinatorConfig::default()
        };
        assert_matches!(config.validate(), Err(CoordinatorError::Config { .. }));
    }

    #[test]
    fn test_validation_rejects_duplicate_seeds() {
        let mut config = CoordinatorConfig::default();
        let first = config.seed_nodes[0].clone();
        config.seed_nodes.push(first);
        assert_matches!(config.validate(), Err(CoordinatorError::Config { .. }));
    }
}
