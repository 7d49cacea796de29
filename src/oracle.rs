//! Eligibility Oracle
//!
//! The engine asks an oracle whether a lead may advance into a target stage.
//! Oracle failures fail closed: the lead is treated as ineligible, but the
//! verdict stays distinguishable from an explicit "no".

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::lead::Lead;
use crate::stage::Pipeline;
use crate::status::status;
use crate::store::PipelineStore;

/// Decides whether a lead may advance into a stage
#[async_trait]
pub trait EligibilityOracle: Send + Sync {
    async fn can_advance(&self, lead_id: Uuid, target_stage: &str) -> Result<bool>;

    /// Whether a move from `from_stage` into `target_stage` would be allowed
    /// now. Used to re-judge a lead after it has already moved; oracles that
    /// cannot look back answer for the target alone.
    async fn can_advance_from(
        &self,
        lead_id: Uuid,
        from_stage: &str,
        target_stage: &str,
    ) -> Result<bool> {
        let _ = from_stage;
        self.can_advance(lead_id, target_stage).await
    }
}

/// Outcome of an eligibility check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Eligibility {
    Eligible,
    Ineligible,
    /// The oracle failed; treated as ineligible
    Unverified { error: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    pub fn is_unverified(&self) -> bool {
        matches!(self, Self::Unverified { .. })
    }
}

/// Ask the oracle, folding failures into `Unverified`
pub async fn check_eligibility(
    oracle: &dyn EligibilityOracle,
    lead_id: Uuid,
    target_stage: &str,
) -> Eligibility {
    verdict(oracle.can_advance(lead_id, target_stage).await, lead_id, target_stage)
}

/// Re-judge a move from `from_stage` into `target_stage`
pub async fn check_eligibility_from(
    oracle: &dyn EligibilityOracle,
    lead_id: Uuid,
    from_stage: &str,
    target_stage: &str,
) -> Eligibility {
    verdict(
        oracle.can_advance_from(lead_id, from_stage, target_stage).await,
        lead_id,
        target_stage,
    )
}

fn verdict(answer: Result<bool>, lead_id: Uuid, target_stage: &str) -> Eligibility {
    match answer {
        Ok(true) => Eligibility::Eligible,
        Ok(false) => Eligibility::Ineligible,
        Err(e) => {
            warn!(
                lead_id = %lead_id,
                target_stage = %target_stage,
                error = %e,
                "eligibility check failed, treating lead as ineligible"
            );
            Eligibility::Unverified {
                error: e.to_string(),
            }
        }
    }
}

/// In-process oracle: a lead may leave its current stage once every
/// mandatory template of that stage has a completed mandatory activity.
pub struct CompletionOracle {
    store: Arc<dyn PipelineStore>,
    pipeline: Arc<Pipeline>,
}

impl CompletionOracle {
    pub fn new(store: Arc<dyn PipelineStore>, pipeline: Arc<Pipeline>) -> Self {
        Self { store, pipeline }
    }

    /// Every mandatory template of `stage_id` is satisfied for the lead
    async fn stage_satisfied(&self, lead: &Lead, stage_id: &str) -> Result<bool> {
        let stage = self
            .pipeline
            .stage(stage_id)
            .ok_or_else(|| anyhow!("lead {} is in unknown stage {stage_id}", lead.id))?;
        let activities = self.store.list_activities(lead.id).await?;
        Ok(!status(lead, &activities, stage).is_blocked)
    }

    async fn lead_for(&self, lead_id: Uuid, target_stage: &str) -> Result<Lead> {
        if !self.pipeline.contains(target_stage) {
            return Err(anyhow!("unknown stage: {target_stage}"));
        }
        self.store
            .load_lead(lead_id)
            .await?
            .ok_or_else(|| anyhow!("lead not found: {lead_id}"))
    }
}

#[async_trait]
impl EligibilityOracle for CompletionOracle {
    async fn can_advance(&self, lead_id: Uuid, target_stage: &str) -> Result<bool> {
        let lead = self.lead_for(lead_id, target_stage).await?;
        self.stage_satisfied(&lead, &lead.current_stage).await
    }

    async fn can_advance_from(
        &self,
        lead_id: Uuid,
        from_stage: &str,
        target_stage: &str,
    ) -> Result<bool> {
        let lead = self.lead_for(lead_id, target_stage).await?;
        self.stage_satisfied(&lead, from_stage).await
    }
}
