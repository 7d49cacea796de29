//! Lead State Types
//!
//! A lead is a contact's progress through the pipeline. Its stage and lock
//! are updated together as one [`StagePlacement`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock flag recorded by the most recent transition into the current stage.
///
/// Snapshot, not recomputed: it can go stale once activities are completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LockFields", into = "LockFields")]
pub enum StageLock {
    #[default]
    Unlocked,
    Locked {
        reason: String,
    },
}

impl StageLock {
    pub fn locked(reason: impl Into<String>) -> Self {
        Self::Locked {
            reason: reason.into(),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Locked { reason } => Some(reason),
            Self::Unlocked => None,
        }
    }
}

/// Flat wire form: `is_locked` + `stage_locked_reason`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LockFields {
    #[serde(default)]
    is_locked: bool,
    #[serde(default)]
    stage_locked_reason: Option<String>,
}

impl From<LockFields> for StageLock {
    fn from(fields: LockFields) -> Self {
        if fields.is_locked {
            StageLock::Locked {
                reason: fields.stage_locked_reason.unwrap_or_default(),
            }
        } else {
            StageLock::Unlocked
        }
    }
}

impl From<StageLock> for LockFields {
    fn from(lock: StageLock) -> Self {
        match lock {
            StageLock::Unlocked => LockFields::default(),
            StageLock::Locked { reason } => LockFields {
                is_locked: true,
                stage_locked_reason: Some(reason),
            },
        }
    }
}

/// The stage/lock value written by one transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlacement {
    pub stage: String,
    pub lock: StageLock,
    pub changed_at: DateTime<Utc>,
}

impl StagePlacement {
    /// Placement for a move into `stage` given the eligibility verdict
    pub fn new(stage: impl Into<String>, eligible: bool, locked_reason: &str) -> Self {
        Self {
            stage: stage.into(),
            lock: if eligible {
                StageLock::Unlocked
            } else {
                StageLock::locked(locked_reason)
            },
            changed_at: Utc::now(),
        }
    }
}

/// Append-only internal note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalNote {
    pub text: String,
    pub date: DateTime<Utc>,
}

impl InternalNote {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            date: Utc::now(),
        }
    }
}

/// A contact's progress instance through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Sequential display number, assigned by the store
    pub lead_number: i64,
    pub contact_id: Uuid,
    pub product: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub notes_internal: Vec<InternalNote>,
    #[serde(default)]
    pub label_color: Option<String>,
    #[serde(default)]
    pub label_text: Option<String>,

    /// Id of the stage the lead currently occupies
    pub current_stage: String,
    /// Stage left by the most recent transition
    #[serde(default)]
    pub previous_stage: Option<String>,
    #[serde(flatten)]
    pub lock: StageLock,
    #[serde(default)]
    pub last_stage_change: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(
        lead_number: i64,
        contact_id: Uuid,
        product: impl Into<String>,
        initial_stage: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            lead_number,
            contact_id,
            product: product.into(),
            notes: None,
            notes_internal: Vec::new(),
            label_color: None,
            label_text: None,
            current_stage: initial_stage.into(),
            previous_stage: None,
            lock: StageLock::Unlocked,
            last_stage_change: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn stage_locked_reason(&self) -> Option<&str> {
        self.lock.reason()
    }

    /// Apply a transition's stage and lock together
    pub fn apply_placement(&mut self, placement: &StagePlacement) {
        let left = std::mem::replace(&mut self.current_stage, placement.stage.clone());
        self.previous_stage = Some(left);
        self.lock = placement.lock.clone();
        self.last_stage_change = Some(placement.changed_at);
        self.updated_at = placement.changed_at;
    }

    /// Rewrite the lock without moving the lead
    pub fn set_lock(&mut self, lock: StageLock) {
        self.lock = lock;
        self.updated_at = Utc::now();
    }

    /// Append an internal note. Existing notes are never touched.
    pub fn append_note(&mut self, text: impl Into<String>) -> &InternalNote {
        let note = InternalNote::new(text);
        self.updated_at = note.date;
        self.notes_internal.push(note);
        &self.notes_internal[self.notes_internal.len() - 1]
    }

    /// Set or clear the free-form label
    pub fn set_label(&mut self, text: Option<String>, color: Option<String>) {
        self.label_text = text;
        self.label_color = color;
        self.updated_at = Utc::now();
    }
}
