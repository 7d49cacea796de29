//! Mandatory Activity Generation
//!
//! Turns a stage's templates into activity records for one lead. Inserts are
//! independent: a failed insert is recorded and the remaining templates are
//! still attempted.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::{Activity, NewActivity};
use crate::config::GenerationPolicy;
use crate::stage::Pipeline;
use crate::store::PipelineStore;

/// One template whose activity could not be inserted
#[derive(Debug, Clone, Serialize)]
pub struct ActivityInsertFailure {
    pub activity_type: String,
    pub description: String,
    pub error: String,
}

/// Result of one generation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub created: Vec<Activity>,
    pub failures: Vec<ActivityInsertFailure>,
    /// Generation skipped because the stage already generated for this lead
    pub skipped: bool,
}

impl GenerationReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("store: {0}")]
    Store(#[from] anyhow::Error),
}

pub struct MandatoryActivityGenerator {
    store: Arc<dyn PipelineStore>,
    pipeline: Arc<Pipeline>,
    policy: GenerationPolicy,
}

impl MandatoryActivityGenerator {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        pipeline: Arc<Pipeline>,
        policy: GenerationPolicy,
    ) -> Self {
        Self {
            store,
            pipeline,
            policy,
        }
    }

    pub fn policy(&self) -> GenerationPolicy {
        self.policy
    }

    /// Create one mandatory activity per template of `stage_id`.
    ///
    /// A stage without templates yields an empty report. Under
    /// `OncePerStage` a stage that already generated for the lead is skipped.
    pub async fn generate_for_stage(
        &self,
        lead_id: Uuid,
        stage_id: &str,
    ) -> Result<GenerationReport, GenerationError> {
        let stage = self
            .pipeline
            .stage(stage_id)
            .ok_or_else(|| GenerationError::UnknownStage(stage_id.to_string()))?;

        let mut report = GenerationReport::default();
        if stage.mandatory_activities.is_empty() {
            debug!(lead_id = %lead_id, stage = %stage_id, "stage has no mandatory activities");
            return Ok(report);
        }

        if self.policy == GenerationPolicy::OncePerStage
            && self
                .store
                .has_generated_activities(lead_id, stage_id)
                .await?
        {
            debug!(lead_id = %lead_id, stage = %stage_id, "mandatory activities already generated");
            report.skipped = true;
            return Ok(report);
        }

        for template in &stage.mandatory_activities {
            let new_activity = NewActivity::mandatory(lead_id, stage_id, template);
            match self.store.insert_activity(&new_activity).await {
                Ok(activity) => report.created.push(activity),
                Err(e) => {
                    warn!(
                        lead_id = %lead_id,
                        stage = %stage_id,
                        activity_type = %template.activity_type,
                        error = %e,
                        "failed to create mandatory activity"
                    );
                    report.failures.push(ActivityInsertFailure {
                        activity_type: template.activity_type.clone(),
                        description: template.description.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            lead_id = %lead_id,
            stage = %stage_id,
            created = report.created.len(),
            failed = report.failures.len(),
            "mandatory activities generated"
        );
        Ok(report)
    }
}
