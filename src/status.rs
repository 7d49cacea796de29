//! Mandatory-Activity Completion Status
//!
//! Derived view computed fresh on every query. It is independent of the
//! lock snapshot stored on the lead, and the two may disagree: completing
//! the missing activities clears `is_blocked` while `is_locked` stays set
//! until the next transition (or lock refresh).

use serde::Serialize;

use crate::activity::Activity;
use crate::lead::Lead;
use crate::stage::PipelineStage;

/// Completion of a stage's mandatory activities for one lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MandatoryStatus {
    /// Completed mandatory activities of the lead
    pub completed: usize,
    /// Mandatory templates configured on the stage
    pub total: usize,
    pub is_blocked: bool,
    /// Persisted lock snapshot, carried alongside for the caller
    pub is_locked: bool,
}

/// Compute the completion status of `lead` against `stage`.
///
/// `total` counts the stage's templates, not the generated records, so
/// duplicate generation can push `completed` above `total`.
pub fn status(lead: &Lead, activities: &[Activity], stage: &PipelineStage) -> MandatoryStatus {
    let total = stage.mandatory_activities.len();
    let completed = activities
        .iter()
        .filter(|a| a.lead_id == lead.id && a.counts_toward_completion())
        .count();

    MandatoryStatus {
        completed,
        total,
        is_blocked: total > 0 && completed < total,
        is_locked: lead.is_locked(),
    }
}

/// Descriptions of the stage templates with no completed mandatory activity
/// of the same type, in template order
pub fn pending_descriptions(stage: &PipelineStage, activities: &[Activity]) -> Vec<String> {
    stage
        .mandatory_activities
        .iter()
        .filter(|t| {
            !activities
                .iter()
                .any(|a| a.counts_toward_completion() && a.activity_type == t.activity_type)
        })
        .map(|t| t.description.clone())
        .collect()
}
