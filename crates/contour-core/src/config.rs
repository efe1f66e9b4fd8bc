//! Per-node configuration
//!
//! Loaded from TOML, optionally overridden from `CONTOUR_*` environment
//! variables, then validated. Bootstrap code owns loading; the routing core
//! only reads the resulting values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::effects::{ConsistencyLevel, ReadConsistency, WriteConsistency};
use crate::errors::{ContourError, Result};
use crate::identifiers::{HandlerIdentity, NodeId, ProcessingUnitId};
use crate::registration::TrustWeight;

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "CONTOUR_";

/// Per processing unit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingUnitProps {
    /// Processing unit id, unique within the node
    pub name: String,
    /// Whether the unit should be penalised in tie-breaks
    #[serde(default)]
    pub untrustworthy: bool,
    /// Requested penalty; only honoured for untrustworthy units
    #[serde(default = "default_mistrust_factor")]
    pub mistrust_factor: u32,
}

fn default_mistrust_factor() -> u32 {
    1
}

impl ProcessingUnitProps {
    /// Settings for a fully trusted unit
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            untrustworthy: false,
            mistrust_factor: 1,
        }
    }

    /// Settings for an untrustworthy unit with the given penalty
    pub fn untrustworthy(name: impl Into<String>, mistrust_factor: u32) -> Self {
        Self {
            name: name.into(),
            untrustworthy: true,
            mistrust_factor,
        }
    }

    /// Effective trust weight: untrustworthy units weigh at least 2, trusted ones exactly 1
    pub fn trust_weight(&self) -> TrustWeight {
        if self.untrustworthy {
            TrustWeight::new(self.mistrust_factor.max(2)).unwrap_or_default()
        } else {
            TrustWeight::TRUSTED
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier, first half of every handler identity
    pub node_id: String,
    /// Logical name of the message system
    pub system_name: String,
    /// Cluster roles of this node
    pub roles: Vec<String>,
    /// Addresses of seed nodes
    pub seed_nodes: Vec<String>,
    /// Readiness poll interval, in milliseconds
    pub gossip_time_frame_ms: u64,
    /// Readiness poll attempts
    pub gossip_synchro_attempt_count: u32,
    /// Consistency of directory reads
    pub read_consistency: ConsistencyLevel,
    /// Consistency of directory writes
    pub write_consistency: ConsistencyLevel,
    /// Upper bound for non-local reads and writes, in milliseconds
    pub consistency_timeout_ms: u64,
    /// Default deadline for request/response dispatch, in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Settings per processing unit
    pub processing_units: Vec<ProcessingUnitProps>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_string(),
            system_name: "MessageSystem".to_string(),
            roles: Vec::new(),
            seed_nodes: Vec::new(),
            gossip_time_frame_ms: 5_000,
            gossip_synchro_attempt_count: 3,
            read_consistency: ConsistencyLevel::Local,
            write_consistency: ConsistencyLevel::Local,
            consistency_timeout_ms: 5_000,
            request_timeout_ms: None,
            processing_units: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Default configuration for the given node
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContourError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| ContourError::config(format!("Failed to serialize config: {e}")))
    }

    /// Override scalar fields from `CONTOUR_*` process environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Override scalar fields from `(name, value)` pairs using the `CONTOUR_*` convention
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "NODE_ID" => self.node_id = value,
                "SYSTEM_NAME" => self.system_name = value,
                "GOSSIP_TIME_FRAME_MS" => self.gossip_time_frame_ms = parse_env(&key, &value)?,
                "GOSSIP_SYNCHRO_ATTEMPT_COUNT" => {
                    self.gossip_synchro_attempt_count = parse_env(&key, &value)?;
                }
                "READ_CONSISTENCY" => self.read_consistency = parse_level(&key, &value)?,
                "WRITE_CONSISTENCY" => self.write_consistency = parse_level(&key, &value)?,
                "CONSISTENCY_TIMEOUT_MS" => {
                    self.consistency_timeout_ms = parse_env(&key, &value)?;
                }
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = Some(parse_env(&key, &value)?),
                _ => tracing::debug!(variable = %key, "Ignoring unknown configuration variable"),
            }
        }
        Ok(())
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(ContourError::config("node_id cannot be empty"));
        }
        if self.gossip_synchro_attempt_count == 0 {
            return Err(ContourError::config(
                "gossip_synchro_attempt_count must be at least 1",
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for unit in &self.processing_units {
            if unit.name.trim().is_empty() {
                return Err(ContourError::config("processing unit name cannot be empty"));
            }
            if !seen.insert(unit.name.as_str()) {
                return Err(ContourError::config(format!(
                    "processing unit {} is configured twice",
                    unit.name
                )));
            }
        }
        Ok(())
    }

    /// Node identifier
    pub fn node_id(&self) -> Result<NodeId> {
        NodeId::new(self.node_id.clone())
    }

    /// Identity of one of this node's processing units (`{node}_{unit}`)
    pub fn processing_unit_name(&self, unit: &ProcessingUnitId) -> Result<HandlerIdentity> {
        Ok(HandlerIdentity::compose(&self.node_id()?, unit))
    }

    /// Settings of a processing unit, if configured
    pub fn processing_unit_props(&self, unit: &str) -> Option<&ProcessingUnitProps> {
        self.processing_units.iter().find(|p| p.name == unit)
    }

    /// Insert or replace the settings of a processing unit
    pub fn set_processing_unit_props(&mut self, props: ProcessingUnitProps) {
        match self
            .processing_units
            .iter_mut()
            .find(|p| p.name == props.name)
        {
            Some(existing) => *existing = props,
            None => self.processing_units.push(props),
        }
    }

    /// Trust weight published for a unit; unknown units are fully trusted
    pub fn trust_weight_for(&self, unit: &str) -> TrustWeight {
        self.processing_unit_props(unit)
            .map(ProcessingUnitProps::trust_weight)
            .unwrap_or_default()
    }

    /// Readiness poll interval
    pub fn gossip_time_frame(&self) -> Duration {
        Duration::from_millis(self.gossip_time_frame_ms)
    }

    /// Consistency for directory reads
    pub fn read_consistency(&self) -> ReadConsistency {
        ReadConsistency {
            level: self.read_consistency,
            timeout: Duration::from_millis(self.consistency_timeout_ms),
        }
    }

    /// Consistency for directory writes
    pub fn write_consistency(&self) -> WriteConsistency {
        WriteConsistency {
            level: self.write_consistency,
            timeout: Duration::from_millis(self.consistency_timeout_ms),
        }
    }

    /// Default request/response deadline
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ContourError::config(format!("{key} has invalid value {value:?}")))
}

fn parse_level(key: &str, value: &str) -> Result<ConsistencyLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "local" => Ok(ConsistencyLevel::Local),
        "quorum" => Ok(ConsistencyLevel::Quorum),
        "all" => Ok(ConsistencyLevel::All),
        _ => Err(ContourError::config(format!(
            "{key} must be one of local, quorum, all (got {value:?})"
        ))),
    }
}
