//! Activity Types and Completion Tracking
//!
//! Activities are created manually or by the mandatory-activity generator on
//! stage entry. Completion is reversible: `completed_at` is set on
//! false→true and cleared on true→false.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::stage::ActivityTemplate;
use crate::store::PipelineStore;

/// Activity type used for activities created by hand
pub const MANUAL_ACTIVITY_TYPE: &str = "manual";

/// A task attached to a lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub text: String,
    /// Free-form tag, also keys the automatic text lookup
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub auto_generated: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Stage whose entry generated this activity
    #[serde(default)]
    pub source_stage: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Mandatory and completed
    pub fn counts_toward_completion(&self) -> bool {
        self.is_mandatory && self.is_completed
    }

    pub fn apply_completion(&mut self, completion: &ActivityCompletion) {
        self.is_completed = completion.is_completed;
        self.completed_at = completion.completed_at;
    }
}

/// Completion fields written together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCompletion {
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActivityCompletion {
    pub fn completed_now() -> Self {
        Self {
            is_completed: true,
            completed_at: Some(Utc::now()),
        }
    }

    pub fn reopened() -> Self {
        Self {
            is_completed: false,
            completed_at: None,
        }
    }

    /// The completion that flips `activity`
    pub fn toggle_of(activity: &Activity) -> Self {
        if activity.is_completed {
            Self::reopened()
        } else {
            Self::completed_now()
        }
    }
}

/// Insert payload for an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivity {
    pub lead_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub is_mandatory: bool,
    pub auto_generated: bool,
    pub source_stage: Option<String>,
}

impl NewActivity {
    /// A hand-written activity
    pub fn manual(lead_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            lead_id,
            text: text.into(),
            activity_type: MANUAL_ACTIVITY_TYPE.to_string(),
            is_mandatory: false,
            auto_generated: false,
            source_stage: None,
        }
    }

    /// A mandatory activity spawned from a stage template
    pub fn mandatory(lead_id: Uuid, stage_id: &str, template: &ActivityTemplate) -> Self {
        Self {
            lead_id,
            text: template.description.clone(),
            activity_type: template.activity_type.clone(),
            is_mandatory: true,
            auto_generated: true,
            source_stage: Some(stage_id.to_string()),
        }
    }

    pub fn with_type(mut self, activity_type: impl Into<String>) -> Self {
        self.activity_type = activity_type.into();
        self
    }

    /// Materialize as a stored record (used by in-process stores)
    pub fn into_activity(self) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            lead_id: self.lead_id,
            text: self.text,
            activity_type: self.activity_type,
            is_mandatory: self.is_mandatory,
            auto_generated: self.auto_generated,
            is_completed: false,
            completed_at: None,
            source_stage: self.source_stage,
            created_at: Utc::now(),
        }
    }
}

/// Filter for activity listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &Activity) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !activity.is_completed,
            Self::Completed => activity.is_completed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("lead not found: {0}")]
    LeadNotFound(Uuid),

    #[error("activity not found: {0}")]
    NotFound(Uuid),

    #[error("activity text is empty and type {0:?} has no automatic text")]
    EmptyText(String),

    #[error("store: {0}")]
    Store(#[from] anyhow::Error),
}

/// Manual activity creation and completion toggling
pub struct ActivityTracker {
    store: Arc<dyn PipelineStore>,
    activity_texts: Arc<HashMap<String, String>>,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn PipelineStore>, activity_texts: HashMap<String, String>) -> Self {
        Self {
            store,
            activity_texts: Arc::new(activity_texts),
        }
    }

    /// Automatic text configured for an activity type
    pub fn automatic_text(&self, activity_type: &str) -> Option<&str> {
        self.activity_texts.get(activity_type).map(String::as_str)
    }

    /// Create an activity by hand. A blank `text` falls back to the automatic
    /// text of `activity_type`.
    pub async fn create(
        &self,
        lead_id: Uuid,
        text: &str,
        activity_type: Option<&str>,
    ) -> Result<Activity, ActivityError> {
        if self.store.load_lead(lead_id).await?.is_none() {
            return Err(ActivityError::LeadNotFound(lead_id));
        }

        let activity_type = activity_type.unwrap_or(MANUAL_ACTIVITY_TYPE);
        let text = match text.trim() {
            "" => self
                .automatic_text(activity_type)
                .ok_or_else(|| ActivityError::EmptyText(activity_type.to_string()))?,
            t => t,
        };

        let activity = self
            .store
            .insert_activity(&NewActivity::manual(lead_id, text).with_type(activity_type))
            .await?;

        debug!(lead_id = %lead_id, activity_id = %activity.id, "activity created");
        Ok(activity)
    }

    /// Flip completion of an activity
    pub async fn toggle(&self, activity_id: Uuid) -> Result<Activity, ActivityError> {
        let activity = self
            .store
            .load_activity(activity_id)
            .await?
            .ok_or(ActivityError::NotFound(activity_id))?;

        let completion = ActivityCompletion::toggle_of(&activity);
        let updated = self
            .store
            .set_activity_completion(activity_id, &completion)
            .await?;

        info!(
            activity_id = %activity_id,
            lead_id = %updated.lead_id,
            completed = updated.is_completed,
            "activity completion toggled"
        );
        Ok(updated)
    }

    /// Set completion explicitly; a no-op when already in that state
    pub async fn set_completed(
        &self,
        activity_id: Uuid,
        completed: bool,
    ) -> Result<Activity, ActivityError> {
        let activity = self
            .store
            .load_activity(activity_id)
            .await?
            .ok_or(ActivityError::NotFound(activity_id))?;

        if activity.is_completed == completed {
            return Ok(activity);
        }

        self.toggle(activity_id).await
    }

    /// Activities of a lead matching `filter`, oldest first
    pub async fn list(
        &self,
        lead_id: Uuid,
        filter: ActivityFilter,
    ) -> Result<Vec<Activity>, ActivityError> {
        Ok(self
            .store
            .list_activities(lead_id)
            .await?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect())
    }
}
