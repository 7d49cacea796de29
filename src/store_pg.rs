//! Postgres implementations of [`PipelineStore`] and [`EligibilityOracle`].
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) so building
//! does not need a live database. Expected tables: `leads`, `activities`,
//! `messages`, plus the `can_advance_stage(uuid, text)` function.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::{Activity, ActivityCompletion, NewActivity};
use crate::lead::{InternalNote, Lead, StageLock, StagePlacement};
use crate::message::{Message, NewMessage};
use crate::oracle::EligibilityOracle;
use crate::store::PipelineStore;

const LEAD_COLUMNS: &str = "id, lead_number, contact_id, product, notes, notes_internal, \
     label_color, label_text, current_stage, previous_stage, is_locked, stage_locked_reason, \
     last_stage_change, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, lead_id, text, type, is_mandatory, auto_generated, \
     is_completed, completed_at, source_stage, created_at";

const MESSAGE_COLUMNS: &str = "id, lead_id, content, channel, sender, timestamp, \
     in_reply_to, thread_id, ai_generated, reply_status";

#[derive(Debug, FromRow)]
struct LeadRow {
    id: Uuid,
    lead_number: i64,
    contact_id: Uuid,
    product: String,
    notes: Option<String>,
    notes_internal: Option<Json<Vec<InternalNote>>>,
    label_color: Option<String>,
    label_text: Option<String>,
    current_stage: String,
    previous_stage: Option<String>,
    is_locked: bool,
    stage_locked_reason: Option<String>,
    last_stage_change: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LeadRow> for Lead {
    fn from(r: LeadRow) -> Self {
        let lock = if r.is_locked {
            StageLock::locked(r.stage_locked_reason.unwrap_or_default())
        } else {
            StageLock::Unlocked
        };
        Lead {
            id: r.id,
            lead_number: r.lead_number,
            contact_id: r.contact_id,
            product: r.product,
            notes: r.notes,
            notes_internal: r.notes_internal.map(|j| j.0).unwrap_or_default(),
            label_color: r.label_color,
            label_text: r.label_text,
            current_stage: r.current_stage,
            previous_stage: r.previous_stage,
            lock,
            last_stage_change: r.last_stage_change,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: Uuid,
    lead_id: Uuid,
    text: String,
    #[sqlx(rename = "type")]
    activity_type: String,
    is_mandatory: bool,
    auto_generated: bool,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    source_stage: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(r: ActivityRow) -> Self {
        Activity {
            id: r.id,
            lead_id: r.lead_id,
            text: r.text,
            activity_type: r.activity_type,
            is_mandatory: r.is_mandatory,
            auto_generated: r.auto_generated,
            is_completed: r.is_completed,
            completed_at: r.completed_at,
            source_stage: r.source_stage,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    lead_id: Uuid,
    content: String,
    channel: String,
    sender: String,
    timestamp: DateTime<Utc>,
    in_reply_to: Option<Uuid>,
    thread_id: Option<String>,
    ai_generated: bool,
    reply_status: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Message {
            id: r.id,
            lead_id: r.lead_id,
            content: r.content,
            channel: r.channel.parse().map_err(|e: String| anyhow!(e))?,
            sender: r.sender,
            timestamp: r.timestamp,
            in_reply_to: r.in_reply_to,
            thread_id: r.thread_id,
            ai_generated: r.ai_generated,
            reply_status: match r.reply_status {
                Some(s) => s.parse().map_err(|e: String| anyhow!(e))?,
                None => Default::default(),
            },
        })
    }
}

/// Postgres-backed pipeline store
#[derive(Clone, Debug)]
pub struct PgPipelineStore {
    pool: PgPool,
}

impl PgPipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PipelineStore for PgPipelineStore {
    // ── Leads ──

    async fn save_lead(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (id, lead_number, contact_id, product, notes, notes_internal,
                               label_color, label_text, current_stage, previous_stage,
                               is_locked, stage_locked_reason, last_stage_change,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                product = EXCLUDED.product,
                notes = EXCLUDED.notes,
                notes_internal = EXCLUDED.notes_internal,
                label_color = EXCLUDED.label_color,
                label_text = EXCLUDED.label_text,
                current_stage = EXCLUDED.current_stage,
                previous_stage = EXCLUDED.previous_stage,
                is_locked = EXCLUDED.is_locked,
                stage_locked_reason = EXCLUDED.stage_locked_reason,
                last_stage_change = EXCLUDED.last_stage_change,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(lead.id)
        .bind(lead.lead_number)
        .bind(lead.contact_id)
        .bind(&lead.product)
        .bind(&lead.notes)
        .bind(Json(&lead.notes_internal))
        .bind(&lead.label_color)
        .bind(&lead.label_text)
        .bind(&lead.current_stage)
        .bind(&lead.previous_stage)
        .bind(lead.is_locked())
        .bind(lead.stage_locked_reason())
        .bind(lead.last_stage_change)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save lead")?;
        Ok(())
    }

    async fn load_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let query = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        let row = sqlx::query_as::<_, LeadRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load lead")?;
        Ok(row.map(Lead::from))
    }

    async fn update_lead_stage(&self, id: Uuid, placement: &StagePlacement) -> Result<Lead> {
        let query = format!(
            "UPDATE leads SET previous_stage = current_stage, current_stage = $2, is_locked = $3, \
             stage_locked_reason = $4, last_stage_change = $5, updated_at = $5 \
             WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LeadRow>(&query)
            .bind(id)
            .bind(&placement.stage)
            .bind(placement.lock.is_locked())
            .bind(placement.lock.reason())
            .bind(placement.changed_at)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update lead stage")?
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;

        debug!(lead_id = %id, stage = %placement.stage, "lead stage row updated");
        Ok(row.into())
    }

    async fn update_lead_lock(&self, id: Uuid, lock: &StageLock) -> Result<Lead> {
        let query = format!(
            "UPDATE leads SET is_locked = $2, stage_locked_reason = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LeadRow>(&query)
            .bind(id)
            .bind(lock.is_locked())
            .bind(lock.reason())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update lead lock")?
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;
        Ok(row.into())
    }

    async fn append_internal_note(&self, id: Uuid, note: &InternalNote) -> Result<Lead> {
        // jsonb concatenation keeps earlier notes untouched
        let query = format!(
            "UPDATE leads SET notes_internal = COALESCE(notes_internal, '[]'::jsonb) || $2::jsonb, \
             updated_at = $3 WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LeadRow>(&query)
            .bind(id)
            .bind(Json(vec![note]))
            .bind(note.date)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to append internal note")?
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;
        Ok(row.into())
    }

    // ── Activities ──

    async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity> {
        let query = format!(
            "INSERT INTO activities (id, lead_id, text, type, is_mandatory, auto_generated, \
             is_completed, source_stage, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, NOW()) RETURNING {ACTIVITY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ActivityRow>(&query)
            .bind(Uuid::new_v4())
            .bind(activity.lead_id)
            .bind(&activity.text)
            .bind(&activity.activity_type)
            .bind(activity.is_mandatory)
            .bind(activity.auto_generated)
            .bind(&activity.source_stage)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert activity")?;

        info!(lead_id = %activity.lead_id, activity_id = %row.id, "activity created");
        Ok(row.into())
    }

    async fn load_activity(&self, id: Uuid) -> Result<Option<Activity>> {
        let query = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1");
        let row = sqlx::query_as::<_, ActivityRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load activity")?;
        Ok(row.map(Activity::from))
    }

    async fn list_activities(&self, lead_id: Uuid) -> Result<Vec<Activity>> {
        let query = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE lead_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, ActivityRow>(&query)
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list activities")?;
        Ok(rows.into_iter().map(Activity::from).collect())
    }

    async fn set_activity_completion(
        &self,
        id: Uuid,
        completion: &ActivityCompletion,
    ) -> Result<Activity> {
        let query = format!(
            "UPDATE activities SET is_completed = $2, completed_at = $3 \
             WHERE id = $1 RETURNING {ACTIVITY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ActivityRow>(&query)
            .bind(id)
            .bind(completion.is_completed)
            .bind(completion.completed_at)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update activity completion")?
            .ok_or_else(|| anyhow!("activity not found: {id}"))?;
        Ok(row.into())
    }

    async fn has_generated_activities(&self, lead_id: Uuid, stage_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM activities
                WHERE lead_id = $1 AND auto_generated AND source_stage = $2
            )
            "#,
        )
        .bind(lead_id)
        .bind(stage_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check generated activities")?;
        Ok(exists)
    }

    // ── Messages ──

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let query = format!(
            "INSERT INTO messages (id, lead_id, content, channel, sender, timestamp, \
             in_reply_to, thread_id, ai_generated, reply_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(Uuid::new_v4())
            .bind(message.lead_id)
            .bind(&message.content)
            .bind(message.channel.as_str())
            .bind(&message.sender)
            .bind(message.timestamp)
            .bind(message.in_reply_to)
            .bind(&message.thread_id)
            .bind(message.ai_generated)
            .bind(message.reply_status.as_str())
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert message")?;
        row.try_into()
    }

    async fn load_message(&self, id: Uuid) -> Result<Option<Message>> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        sqlx::query_as::<_, MessageRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load message")?
            .map(Message::try_from)
            .transpose()
    }

    async fn list_messages(&self, lead_id: Uuid) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE lead_id = $1 ORDER BY timestamp ASC"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list messages")?;
        rows.into_iter().map(Message::try_from).collect()
    }
}

/// Eligibility answered by the `can_advance_stage` database function
#[derive(Clone, Debug)]
pub struct PgEligibilityOracle {
    pool: PgPool,
}

impl PgEligibilityOracle {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EligibilityOracle for PgEligibilityOracle {
    async fn can_advance(&self, lead_id: Uuid, target_stage: &str) -> Result<bool> {
        let allowed: Option<bool> = sqlx::query_scalar("SELECT can_advance_stage($1, $2)")
            .bind(lead_id)
            .bind(target_stage)
            .fetch_one(&self.pool)
            .await
            .context("can_advance_stage failed")?;
        // NULL is not a yes
        Ok(allowed.unwrap_or(false))
    }
}
