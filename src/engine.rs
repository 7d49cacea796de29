//! Stage Transition Engine
//!
//! Moves leads between pipeline stages. Moves are never refused under the
//! default soft gate: an ineligible move is applied and the lead is locked
//! with a reason. Entering a stage always spawns its mandatory activities.
//!
//! Transitions for the same lead are serialized: the engine holds a per-lead
//! mutex across load → eligibility → write → generation, and re-reads the
//! lead from the store under that mutex.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::Activity;
use crate::config::{EngineSettings, GatePolicy, PipelineConfig};
use crate::generator::{ActivityInsertFailure, MandatoryActivityGenerator};
use crate::lead::{InternalNote, Lead, StageLock, StagePlacement};
use crate::oracle::{check_eligibility, check_eligibility_from, Eligibility, EligibilityOracle};
use crate::stage::Pipeline;
use crate::status::{pending_descriptions, status, MandatoryStatus};
use crate::store::PipelineStore;

/// Message shown when the oracle could not be reached
pub const UNVERIFIED_NOTICE: &str = "Could not verify stage eligibility. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("lead not found: {0}")]
    LeadNotFound(Uuid),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("lead {lead_id} cannot leave stage {stage}: {} mandatory activities pending", .pending.len())]
    Blocked {
        lead_id: Uuid,
        stage: String,
        pending: Vec<String>,
        eligibility: Eligibility,
    },

    #[error("internal note text is empty")]
    EmptyNote,

    #[error("failed to load lead {lead_id}")]
    Load {
        lead_id: Uuid,
        source: anyhow::Error,
    },

    #[error("failed to persist stage change for lead {lead_id}")]
    Persistence {
        lead_id: Uuid,
        source: anyhow::Error,
    },
}

/// A requested move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub lead_id: Uuid,
    pub target_stage: String,
    /// The lead also changed position within the board column
    pub reordered: bool,
}

impl TransitionRequest {
    pub fn new(lead_id: Uuid, target_stage: impl Into<String>) -> Self {
        Self {
            lead_id,
            target_stage: target_stage.into(),
            reordered: false,
        }
    }

    pub fn with_reorder(mut self) -> Self {
        self.reordered = true;
        self
    }
}

/// Result of a transition request
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    /// Lead after the request (unchanged for a no-op)
    pub lead: Lead,
    pub from_stage: String,
    /// `None` when the request was a no-op and the oracle was not asked
    pub eligibility: Option<Eligibility>,
    /// Unmet mandatory activities of the stage being left, when ineligible
    pub pending: Vec<String>,
    pub generated: Vec<Activity>,
    pub activity_failures: Vec<ActivityInsertFailure>,
}

impl TransitionOutcome {
    fn noop(lead: Lead) -> Self {
        Self {
            from_stage: lead.current_stage.clone(),
            lead,
            eligibility: None,
            pending: Vec::new(),
            generated: Vec::new(),
            activity_failures: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.eligibility.is_none()
    }

    /// The stage moved but some mandatory activities were not created
    pub fn is_partial(&self) -> bool {
        !self.activity_failures.is_empty()
    }

    /// User-facing message for a locked, unverified or partial transition
    pub fn notice(&self) -> Option<String> {
        let mut lines = Vec::new();

        match &self.eligibility {
            Some(Eligibility::Unverified { .. }) => lines.push(UNVERIFIED_NOTICE.to_string()),
            Some(Eligibility::Ineligible) => {
                lines.push(
                    self.lead
                        .stage_locked_reason()
                        .unwrap_or("Mandatory activities pending")
                        .to_string(),
                );
                lines.extend(self.pending.iter().map(|p| format!("- {p}")));
            }
            _ => {}
        }

        if self.is_partial() {
            lines.push("Some mandatory activities could not be created:".to_string());
            lines.extend(
                self.activity_failures
                    .iter()
                    .map(|f| format!("- {}", f.description)),
            );
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Result of re-evaluating a lead's lock in place
#[derive(Debug, Clone, Serialize)]
pub struct LockRefresh {
    pub lead: Lead,
    /// `None` when the lead was not locked and the oracle was not asked
    pub eligibility: Option<Eligibility>,
    pub changed: bool,
}

/// Per-lead async mutexes
#[derive(Default)]
struct LeadLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LeadLocks {
    async fn acquire(&self, lead_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(lead_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The stage transition engine
pub struct StageTransitionEngine {
    store: Arc<dyn PipelineStore>,
    oracle: Arc<dyn EligibilityOracle>,
    pipeline: Arc<Pipeline>,
    generator: MandatoryActivityGenerator,
    settings: EngineSettings,
    locks: LeadLocks,
}

impl StageTransitionEngine {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        oracle: Arc<dyn EligibilityOracle>,
        pipeline: Arc<Pipeline>,
        settings: EngineSettings,
    ) -> Self {
        let generator = MandatoryActivityGenerator::new(
            store.clone(),
            pipeline.clone(),
            settings.generation_policy,
        );
        Self {
            store,
            oracle,
            pipeline,
            generator,
            settings,
            locks: LeadLocks::default(),
        }
    }

    /// Build from a loaded configuration
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn PipelineStore>,
        oracle: Arc<dyn EligibilityOracle>,
    ) -> Self {
        Self::new(
            store,
            oracle,
            Arc::new(config.pipeline()),
            config.engine.clone(),
        )
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Move `lead` into `target_stage`
    pub async fn request_transition(
        &self,
        lead: &Lead,
        target_stage: &str,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.transition(TransitionRequest::new(lead.id, target_stage))
            .await
    }

    /// Process a transition request
    pub async fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, TransitionError> {
        let lead_id = request.lead_id;
        let target = self
            .pipeline
            .stage(&request.target_stage)
            .ok_or_else(|| TransitionError::UnknownStage(request.target_stage.clone()))?;

        let _guard = self.locks.acquire(lead_id).await;
        let lead = self.load_lead(lead_id).await?;

        if lead.current_stage == target.id && !request.reordered {
            debug!(lead_id = %lead_id, stage = %target.id, "transition to current stage, nothing to do");
            return Ok(TransitionOutcome::noop(lead));
        }

        let eligibility = check_eligibility(self.oracle.as_ref(), lead_id, &target.id).await;
        let pending = if eligibility.is_eligible() {
            Vec::new()
        } else {
            self.pending_for(&lead).await
        };

        if !eligibility.is_eligible()
            && self.settings.gate_policy == GatePolicy::Hard
            && lead.current_stage != target.id
            && self
                .pipeline
                .stage(&lead.current_stage)
                .is_some_and(|s| s.has_mandatory_activities())
        {
            info!(
                lead_id = %lead_id,
                from = %lead.current_stage,
                to = %target.id,
                pending = pending.len(),
                "transition refused by hard gate"
            );
            return Err(TransitionError::Blocked {
                lead_id,
                stage: lead.current_stage,
                pending,
                eligibility,
            });
        }

        let placement = StagePlacement::new(
            target.id.clone(),
            eligibility.is_eligible(),
            &self.settings.locked_reason,
        );
        let updated = self
            .store
            .update_lead_stage(lead_id, &placement)
            .await
            .map_err(|source| TransitionError::Persistence { lead_id, source })?;

        info!(
            lead_id = %lead_id,
            from = %lead.current_stage,
            to = %target.id,
            locked = updated.is_locked(),
            unverified = eligibility.is_unverified(),
            "lead stage changed"
        );

        let (generated, activity_failures) =
            match self.generator.generate_for_stage(lead_id, &target.id).await {
                Ok(report) => (report.created, report.failures),
                Err(e) => {
                    warn!(
                        lead_id = %lead_id,
                        stage = %target.id,
                        error = %e,
                        "mandatory activity generation failed"
                    );
                    let failures = target
                        .mandatory_activities
                        .iter()
                        .map(|t| ActivityInsertFailure {
                            activity_type: t.activity_type.clone(),
                            description: t.description.clone(),
                            error: e.to_string(),
                        })
                        .collect();
                    (Vec::new(), failures)
                }
            };

        Ok(TransitionOutcome {
            lead: updated,
            from_stage: lead.current_stage,
            eligibility: Some(eligibility),
            pending,
            generated,
            activity_failures,
        })
    }

    /// Clear a stale lock without moving the lead or generating activities.
    ///
    /// The lock only ever opens here. A locked lead is re-judged on the move
    /// that locked it, from `previous_stage` into `current_stage`; an unlocked
    /// lead is returned untouched.
    pub async fn refresh_lock(&self, lead_id: Uuid) -> Result<LockRefresh, TransitionError> {
        let _guard = self.locks.acquire(lead_id).await;
        let lead = self.load_lead(lead_id).await?;

        if !lead.is_locked() {
            return Ok(LockRefresh {
                lead,
                eligibility: None,
                changed: false,
            });
        }

        let from = lead
            .previous_stage
            .clone()
            .unwrap_or_else(|| lead.current_stage.clone());
        let eligibility =
            check_eligibility_from(self.oracle.as_ref(), lead_id, &from, &lead.current_stage)
                .await;

        if !eligibility.is_eligible() {
            debug!(lead_id = %lead_id, from_stage = %from, "lead stays locked");
            return Ok(LockRefresh {
                lead,
                eligibility: Some(eligibility),
                changed: false,
            });
        }

        let updated = self
            .store
            .update_lead_lock(lead_id, &StageLock::Unlocked)
            .await
            .map_err(|source| TransitionError::Persistence { lead_id, source })?;

        info!(lead_id = %lead_id, from_stage = %from, "lead lock cleared");
        Ok(LockRefresh {
            lead: updated,
            eligibility: Some(eligibility),
            changed: true,
        })
    }

    /// Completion status of the lead's current stage
    pub async fn mandatory_status(&self, lead_id: Uuid) -> Result<MandatoryStatus, TransitionError> {
        let lead = self.load_lead(lead_id).await?;
        let stage = self
            .pipeline
            .stage(&lead.current_stage)
            .ok_or_else(|| TransitionError::UnknownStage(lead.current_stage.clone()))?;
        let activities = self
            .store
            .list_activities(lead_id)
            .await
            .map_err(|source| TransitionError::Load { lead_id, source })?;
        Ok(status(&lead, &activities, stage))
    }

    /// Append to the lead's internal notes log
    pub async fn add_internal_note(&self, lead_id: Uuid, text: &str) -> Result<Lead, TransitionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TransitionError::EmptyNote);
        }

        let _guard = self.locks.acquire(lead_id).await;
        self.load_lead(lead_id).await?;
        let note = InternalNote::new(text);
        self.store
            .append_internal_note(lead_id, &note)
            .await
            .map_err(|source| TransitionError::Persistence { lead_id, source })
    }

    async fn load_lead(&self, lead_id: Uuid) -> Result<Lead, TransitionError> {
        self.store
            .load_lead(lead_id)
            .await
            .map_err(|source| TransitionError::Load { lead_id, source })?
            .ok_or(TransitionError::LeadNotFound(lead_id))
    }

    /// Unmet mandatory activities of the lead's current stage
    async fn pending_for(&self, lead: &Lead) -> Vec<String> {
        let Some(stage) = self.pipeline.stage(&lead.current_stage) else {
            return Vec::new();
        };

        match self.store.list_activities(lead.id).await {
            Ok(activities) => pending_descriptions(stage, &activities),
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "could not list activities, reporting all as pending");
                stage
                    .mandatory_activities
                    .iter()
                    .map(|t| t.description.clone())
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityCompletion;
    use crate::config::GenerationPolicy;
    use crate::oracle::CompletionOracle;
    use crate::stage::{ActivityTemplate, PipelineStage};
    use crate::store_memory::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct FixedOracle(bool);

    #[async_trait]
    impl EligibilityOracle for FixedOracle {
        async fn can_advance(&self, _lead_id: Uuid, _target_stage: &str) -> anyhow::Result<bool> {
            Ok(self.0)
        }
    }

    struct DownOracle;

    #[async_trait]
    impl EligibilityOracle for DownOracle {
        async fn can_advance(&self, _lead_id: Uuid, _target_stage: &str) -> anyhow::Result<bool> {
            Err(anyhow!("backend unavailable"))
        }
    }

    fn pipeline() -> Arc<Pipeline> {
        Arc::new(Pipeline::new(vec![
            PipelineStage::new("verification_call", 1)
                .with_template(ActivityTemplate::new("call", "Verification call"))
                .with_template(ActivityTemplate::new("email", "Send the catalogue")),
            PipelineStage::new("quote", 2)
                .with_template(ActivityTemplate::new("quote", "Send the quote")),
            PipelineStage::new("won", 3),
        ]))
    }

    async fn setup(
        oracle: Arc<dyn EligibilityOracle>,
        settings: EngineSettings,
    ) -> (Arc<MemoryStore>, StageTransitionEngine, Lead) {
        let store = Arc::new(MemoryStore::new());
        let lead = Lead::new(1, Uuid::new_v4(), "Neon sign", "verification_call");
        store.save_lead(&lead).await.unwrap();
        let engine = StageTransitionEngine::new(store.clone(), oracle, pipeline(), settings);
        (store, engine, lead)
    }

    #[tokio::test]
    async fn test_same_stage_is_noop() {
        let (store, engine, lead) = setup(Arc::new(DownOracle), EngineSettings::default()).await;

        let outcome = engine
            .request_transition(&lead, "verification_call")
            .await
            .unwrap();

        assert!(outcome.is_noop());
        assert!(outcome.generated.is_empty());
        assert_eq!(outcome.notice(), None);
        let stored = store.load_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.last_stage_change, None);
        assert!(store.list_activities(lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_stage_reorder_reenters() {
        let (_store, engine, lead) =
            setup(Arc::new(FixedOracle(true)), EngineSettings::default()).await;

        let outcome = engine
            .transition(TransitionRequest::new(lead.id, "verification_call").with_reorder())
            .await
            .unwrap();

        assert!(!outcome.is_noop());
        assert_eq!(outcome.generated.len(), 2);
        assert!(outcome.lead.last_stage_change.is_some());
    }

    #[tokio::test]
    async fn test_eligible_move_unlocks_and_generates() {
        let (_store, engine, lead) =
            setup(Arc::new(FixedOracle(true)), EngineSettings::default()).await;

        let outcome = engine.request_transition(&lead, "quote").await.unwrap();

        assert_eq!(outcome.lead.current_stage, "quote");
        assert_eq!(outcome.from_stage, "verification_call");
        assert!(!outcome.lead.is_locked());
        assert_eq!(outcome.eligibility, Some(Eligibility::Eligible));
        assert!(outcome.pending.is_empty());
        assert_eq!(outcome.generated.len(), 1);
        assert_eq!(outcome.generated[0].text, "Send the quote");
        assert_eq!(outcome.notice(), None);
    }

    #[tokio::test]
    async fn test_ineligible_move_is_applied_and_locked() {
        let (_store, engine, lead) =
            setup(Arc::new(FixedOracle(false)), EngineSettings::default()).await;

        let outcome = engine.request_transition(&lead, "quote").await.unwrap();

        assert_eq!(outcome.lead.current_stage, "quote");
        assert!(outcome.lead.is_locked());
        assert_eq!(
            outcome.lead.stage_locked_reason(),
            Some(crate::config::DEFAULT_LOCKED_REASON)
        );
        assert_eq!(
            outcome.pending,
            vec!["Verification call", "Send the catalogue"]
        );
        assert_eq!(outcome.generated.len(), 1);

        let notice = outcome.notice().unwrap();
        assert!(notice.contains("- Verification call"));
        assert!(notice.contains("- Send the catalogue"));
    }

    #[tokio::test]
    async fn test_oracle_failure_fails_closed() {
        let (_store, engine, lead) = setup(Arc::new(DownOracle), EngineSettings::default()).await;

        let outcome = engine.request_transition(&lead, "won").await.unwrap();

        assert_eq!(outcome.lead.current_stage, "won");
        assert!(outcome.lead.is_locked());
        assert!(matches!(
            outcome.eligibility,
            Some(Eligibility::Unverified { .. })
        ));
        assert_eq!(outcome.notice().as_deref(), Some(UNVERIFIED_NOTICE));
    }

    #[tokio::test]
    async fn test_unknown_stage_fails_before_any_write() {
        let (store, engine, lead) =
            setup(Arc::new(FixedOracle(true)), EngineSettings::default()).await;

        let err = engine.request_transition(&lead, "nowhere").await.unwrap_err();

        assert!(matches!(err, TransitionError::UnknownStage(s) if s == "nowhere"));
        let stored = store.load_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stage, "verification_call");
    }

    #[tokio::test]
    async fn test_unknown_lead() {
        let (_store, engine, _lead) =
            setup(Arc::new(FixedOracle(true)), EngineSettings::default()).await;

        let missing = Uuid::new_v4();
        let err = engine
            .transition(TransitionRequest::new(missing, "quote"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::LeadNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_hard_gate_refuses_ineligible_move() {
        let settings = EngineSettings {
            gate_policy: GatePolicy::Hard,
            ..EngineSettings::default()
        };
        let (store, engine, lead) = setup(Arc::new(FixedOracle(false)), settings).await;

        let err = engine.request_transition(&lead, "quote").await.unwrap_err();

        match err {
            TransitionError::Blocked { stage, pending, .. } => {
                assert_eq!(stage, "verification_call");
                assert_eq!(pending.len(), 2);
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
        let stored = store.load_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stage, "verification_call");
        assert!(store.list_activities(lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hard_gate_allows_leaving_stage_without_templates() {
        let settings = EngineSettings {
            gate_policy: GatePolicy::Hard,
            ..EngineSettings::default()
        };
        let (store, engine, mut lead) = setup(Arc::new(FixedOracle(false)), settings).await;
        lead.current_stage = "won".to_string();
        store.save_lead(&lead).await.unwrap();

        let outcome = engine.request_transition(&lead, "quote").await.unwrap();
        assert_eq!(outcome.lead.current_stage, "quote");
        assert!(outcome.lead.is_locked());
    }

    #[tokio::test]
    async fn test_once_per_stage_generation() {
        let settings = EngineSettings {
            generation_policy: GenerationPolicy::OncePerStage,
            ..EngineSettings::default()
        };
        let (store, engine, lead) = setup(Arc::new(FixedOracle(true)), settings).await;

        engine.request_transition(&lead, "quote").await.unwrap();
        engine.request_transition(&lead, "won").await.unwrap();
        let back = engine.request_transition(&lead, "quote").await.unwrap();

        assert!(back.generated.is_empty());
        assert_eq!(store.list_activities(lead.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_lock_without_move() {
        let (store, engine, lead) =
            setup(Arc::new(FixedOracle(true)), EngineSettings::default()).await;
        store
            .update_lead_lock(lead.id, &StageLock::locked("stale"))
            .await
            .unwrap();

        let refresh = engine.refresh_lock(lead.id).await.unwrap();

        assert!(refresh.changed);
        assert!(!refresh.lead.is_locked());
        assert_eq!(refresh.lead.current_stage, "verification_call");
        assert!(store.list_activities(lead.id).await.unwrap().is_empty());

        let again = engine.refresh_lock(lead.id).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.eligibility, None);
    }

    #[tokio::test]
    async fn test_refresh_lock_never_locks() {
        let (store, engine, lead) =
            setup(Arc::new(FixedOracle(false)), EngineSettings::default()).await;

        let refresh = engine.refresh_lock(lead.id).await.unwrap();

        assert!(!refresh.changed);
        assert!(!refresh.lead.is_locked());
        assert!(!store.load_lead(lead.id).await.unwrap().unwrap().is_locked());
    }

    #[tokio::test]
    async fn test_refresh_after_eligible_move_keeps_lead_unlocked() {
        let store = Arc::new(MemoryStore::new());
        let lead = Lead::new(1, Uuid::new_v4(), "Neon sign", "won");
        store.save_lead(&lead).await.unwrap();
        let oracle = Arc::new(CompletionOracle::new(store.clone(), pipeline()));
        let engine =
            StageTransitionEngine::new(store.clone(), oracle, pipeline(), EngineSettings::default());

        // "won" has no templates, so entering verification_call is allowed
        let outcome = engine.request_transition(&lead, "verification_call").await.unwrap();
        assert!(!outcome.lead.is_locked());
        assert_eq!(outcome.generated.len(), 2);

        // The new stage has pending work; that must not lock the lead
        let refresh = engine.refresh_lock(lead.id).await.unwrap();
        assert!(!refresh.changed);
        assert!(!refresh.lead.is_locked());
        assert!(!store.load_lead(lead.id).await.unwrap().unwrap().is_locked());
    }

    #[tokio::test]
    async fn test_refresh_judges_the_stage_left() {
        let store = Arc::new(MemoryStore::new());
        let lead = Lead::new(1, Uuid::new_v4(), "Neon sign", "verification_call");
        store.save_lead(&lead).await.unwrap();
        let oracle = Arc::new(CompletionOracle::new(store.clone(), pipeline()));
        let engine =
            StageTransitionEngine::new(store.clone(), oracle, pipeline(), EngineSettings::default());

        let entered = engine
            .transition(TransitionRequest::new(lead.id, "verification_call").with_reorder())
            .await
            .unwrap();
        let moved = engine.request_transition(&lead, "won").await.unwrap();
        assert!(moved.lead.is_locked());
        assert_eq!(moved.lead.previous_stage.as_deref(), Some("verification_call"));

        // "won" has nothing pending, but verification_call still does
        let refresh = engine.refresh_lock(lead.id).await.unwrap();
        assert!(!refresh.changed);
        assert!(refresh.lead.is_locked());
        assert_eq!(refresh.eligibility, Some(Eligibility::Ineligible));

        for a in &entered.generated {
            store
                .set_activity_completion(a.id, &ActivityCompletion::completed_now())
                .await
                .unwrap();
        }
        let refresh = engine.refresh_lock(lead.id).await.unwrap();
        assert!(refresh.changed);
        assert!(!refresh.lead.is_locked());
        assert_eq!(refresh.lead.current_stage, "won");
    }

    #[tokio::test]
    async fn test_mandatory_status_tracks_completion() {
        let (store, engine, lead) =
            setup(Arc::new(FixedOracle(false)), EngineSettings::default()).await;
        let outcome = engine
            .transition(TransitionRequest::new(lead.id, "verification_call").with_reorder())
            .await
            .unwrap();

        let s = engine.mandatory_status(lead.id).await.unwrap();
        assert_eq!((s.completed, s.total, s.is_blocked, s.is_locked), (0, 2, true, true));

        for a in &outcome.generated {
            store
                .set_activity_completion(a.id, &ActivityCompletion::completed_now())
                .await
                .unwrap();
        }
        let s = engine.mandatory_status(lead.id).await.unwrap();
        assert_eq!((s.completed, s.is_blocked, s.is_locked), (2, false, true));
    }

    #[tokio::test]
    async fn test_internal_notes() {
        let (_store, engine, lead) =
            setup(Arc::new(FixedOracle(true)), EngineSettings::default()).await;

        engine.add_internal_note(lead.id, "Asked for a discount").await.unwrap();
        let updated = engine.add_internal_note(lead.id, " Sent photos ").await.unwrap();

        let texts: Vec<_> = updated.notes_internal.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Asked for a discount", "Sent photos"]);
        assert!(matches!(
            engine.add_internal_note(lead.id, "   ").await,
            Err(TransitionError::EmptyNote)
        ));
    }

    #[tokio::test]
    async fn test_lead_locks_are_pruned() {
        let locks = LeadLocks::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        drop(locks.acquire(a).await);
        let _held = locks.acquire(b).await;

        let map = locks.locks.lock().await;
        assert!(!map.contains_key(&a));
        assert!(map.contains_key(&b));
    }
}
