//! Pipeline Configuration and YAML Loading
//!
//! The pipeline (stages, templates, automatic activity texts) and the engine
//! policies are declared in one YAML document loaded at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::stage::{Pipeline, PipelineStage};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "LEAD_PIPELINE_CONFIG";

/// Lock reason written when a transition is flagged as ineligible
pub const DEFAULT_LOCKED_REASON: &str = "Mandatory activities pending";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("pipeline declares no stages")]
    NoStages,

    #[error("stage at position {0} has an empty id")]
    EmptyStageId(usize),

    #[error("duplicate stage id: {0}")]
    DuplicateStage(String),

    #[error("stage {stage} has a template with an empty type")]
    EmptyTemplateType { stage: String },
}

/// Whether an ineligible move is applied-and-flagged or refused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Apply the move and lock the lead
    #[default]
    Soft,
    /// Refuse the move when leaving a stage that has mandatory templates
    Hard,
}

/// When mandatory activities are spawned on stage entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPolicy {
    /// Every entry spawns a fresh set, duplicates included
    #[default]
    EveryEntry,
    /// At most one set per (lead, stage)
    OncePerStage,
}

/// How the thread builder treats replies whose parent appears later
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadResolution {
    /// Single pass; late parents leave the reply as a root
    #[default]
    SinglePass,
    /// Attach to late parents, breaking cycles
    Backfill,
}

/// Engine policies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub gate_policy: GatePolicy,
    pub generation_policy: GenerationPolicy,
    pub locked_reason: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            gate_policy: GatePolicy::default(),
            generation_policy: GenerationPolicy::default(),
            locked_reason: DEFAULT_LOCKED_REASON.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSettings {
    pub resolution: ThreadResolution,
}

/// Complete pipeline configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<PipelineStage>,

    /// Default activity text keyed by activity type
    #[serde(default)]
    pub activity_texts: HashMap<String, String>,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub threads: ThreadSettings,
}

impl PipelineConfig {
    /// Load from a YAML string
    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    /// Load from the file named by `LEAD_PIPELINE_CONFIG`
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_ENV_VAR).map_err(|_| ConfigError::MissingEnv(CONFIG_ENV_VAR))?;
        Self::load_from_file(Path::new(&path))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let mut seen = HashSet::new();
        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.id.trim().is_empty() {
                return Err(ConfigError::EmptyStageId(idx));
            }
            if !seen.insert(stage.id.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.id.clone()));
            }
            if stage
                .mandatory_activities
                .iter()
                .any(|t| t.activity_type.trim().is_empty())
            {
                return Err(ConfigError::EmptyTemplateType {
                    stage: stage.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Build the stage catalog
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.stages.clone())
    }
}
