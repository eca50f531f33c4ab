use crate::error::GraphError;
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

// --- Constants for Default Configuration ---
pub const DEFAULT_PROPAGATION_ROUNDS: usize = 20;
pub const DEFAULT_PROPAGATION_CUTOFF: f64 = 0.3;

pub const DEFAULT_UPDATE_ROUNDS: usize = 10;

pub const DEFAULT_COMMUNITY_MIN_SIZE: usize = 1;

pub const DEFAULT_WORKER_FLUSH_THRESHOLD: usize = 3;
pub const DEFAULT_WORKER_TICK_INTERVAL_MS: u64 = 1000;

/// How speakers expose their memory to listeners within one round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoundSemantics {
    /// Speakers expose memory as it stood at the start of the round (Jacobi).
    #[default]
    Synchronous,
    /// Speakers expose their most recently updated memory (Gauss-Seidel).
    Asynchronous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    pub rounds: usize,
    pub cutoff: f64,
    #[serde(default)]
    pub semantics: RoundSemantics,
    /// Process listeners of a round on the rayon pool. Only honoured for synchronous rounds.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Rounds of the scoped re-run after a batch.
    pub rounds: usize,
    /// Grow the affected set to every node sharing a community with an affected node.
    #[serde(default)]
    pub expand_communities: bool,
    /// Fall back to a full re-run when more than this fraction of the graph is affected.
    #[serde(default)]
    pub full_rerun_fraction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    pub min_community_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub flush_threshold: usize,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlpaConfig {
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub community: CommunityConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_PROPAGATION_ROUNDS,
            cutoff: DEFAULT_PROPAGATION_CUTOFF,
            semantics: RoundSemantics::default(),
            parallel: false,
            seed: None,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_UPDATE_ROUNDS,
            expand_communities: false,
            full_rerun_fraction: None,
        }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            min_community_size: DEFAULT_COMMUNITY_MIN_SIZE,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_WORKER_FLUSH_THRESHOLD,
            tick_interval_ms: DEFAULT_WORKER_TICK_INTERVAL_MS,
        }
    }
}

impl Default for SlpaConfig {
    fn default() -> Self {
        Self {
            propagation: PropagationConfig::default(),
            update: UpdateConfig::default(),
            community: CommunityConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl SlpaConfig {
    /// Loads defaults, then `slpa.toml` (optional), then `SLPA__SECTION__KEY` environment
    /// variables. The merged result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("slpa").required(false))
            .add_source(
                Environment::with_prefix("SLPA")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("propagation.rounds", DEFAULT_PROPAGATION_ROUNDS as i64)?
            .set_default("propagation.cutoff", DEFAULT_PROPAGATION_CUTOFF)?
            .set_default("propagation.semantics", "synchronous")?
            .set_default("propagation.parallel", false)?
            .set_default("update.rounds", DEFAULT_UPDATE_ROUNDS as i64)?
            .set_default("update.expand_communities", false)?
            .set_default("community.min_community_size", DEFAULT_COMMUNITY_MIN_SIZE as i64)?
            .set_default("worker.flush_threshold", DEFAULT_WORKER_FLUSH_THRESHOLD as i64)?
            .set_default("worker.tick_interval_ms", DEFAULT_WORKER_TICK_INTERVAL_MS)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, GraphError> {
        let config: Self = toml::from_str(raw).map_err(|e| GraphError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        validate_cutoff(self.propagation.cutoff)?;
        if let Some(fraction) = self.update.full_rerun_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(GraphError::invalid_config(format!(
                    "update.full_rerun_fraction must be in (0, 1], got {}",
                    fraction
                )));
            }
        }
        if self.worker.flush_threshold == 0 {
            return Err(GraphError::invalid_config("worker.flush_threshold must be at least 1"));
        }
        if self.worker.tick_interval_ms == 0 {
            return Err(GraphError::invalid_config("worker.tick_interval_ms must be at least 1"));
        }
        Ok(())
    }
}

/// Cutoff fractions live in the open interval (0, 1).
pub fn validate_cutoff(cutoff: f64) -> Result<(), GraphError> {
    if cutoff > 0.0 && cutoff < 1.0 {
        Ok(())
    } else {
        Err(GraphError::invalid_config(format!(
            "cutoff must be in (0, 1), got {}",
            cutoff
        )))
    }
}
