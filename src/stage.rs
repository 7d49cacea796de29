//! Pipeline Stage Types
//!
//! Stages are shared, read-only configuration. Each stage carries the
//! mandatory-activity templates spawned when a lead enters it.

use serde::{Deserialize, Serialize};

/// A template for one mandatory activity of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTemplate {
    /// Activity type tag (e.g., "call", "quote")
    #[serde(rename = "type")]
    pub activity_type: String,
    /// Text copied into the generated activity
    pub description: String,
}

impl ActivityTemplate {
    pub fn new(activity_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            description: description.into(),
        }
    }
}

/// One ordered step of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stable slug, also used as the lead's state identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Display order. Not enforced by the engine.
    pub order_index: i32,
    /// Display color (e.g., "#4CAF50")
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Templates spawned on every entry into this stage
    #[serde(default)]
    pub mandatory_activities: Vec<ActivityTemplate>,
}

impl PipelineStage {
    pub fn new(id: impl Into<String>, order_index: i32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            order_index,
            color: None,
            description: None,
            mandatory_activities: Vec::new(),
        }
    }

    /// Add a mandatory-activity template
    pub fn with_template(mut self, template: ActivityTemplate) -> Self {
        self.mandatory_activities.push(template);
        self
    }

    pub fn has_mandatory_activities(&self) -> bool {
        !self.mandatory_activities.is_empty()
    }
}

/// The configured set of stages, kept sorted by `order_index`
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(mut stages: Vec<PipelineStage>) -> Self {
        stages.sort_by_key(|s| s.order_index);
        Self { stages }
    }

    /// Look up a stage by id
    pub fn stage(&self, id: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stage(id).is_some()
    }

    /// Stages in display order
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// First stage in display order (where new leads start)
    pub fn initial_stage(&self) -> Option<&PipelineStage> {
        self.stages.first()
    }

    /// Templates of a stage; empty for unknown ids
    pub fn templates(&self, id: &str) -> &[ActivityTemplate] {
        self.stage(id)
            .map(|s| s.mandatory_activities.as_slice())
            .unwrap_or(&[])
    }
}
