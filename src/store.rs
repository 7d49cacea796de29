use crate::activity::{Activity, ActivityCompletion, NewActivity};
use crate::lead::{InternalNote, Lead, StageLock, StagePlacement};
use crate::message::{Message, NewMessage};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence trait for leads, activities and messages.
///
/// The engine and the services operate exclusively through this trait
/// (MemoryStore for tests and embedding, Postgres behind the `database`
/// feature). No transaction spans two calls: a stage update followed by
/// activity inserts may partially succeed.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    // ── Leads ──

    async fn save_lead(&self, lead: &Lead) -> Result<()>;
    async fn load_lead(&self, id: Uuid) -> Result<Option<Lead>>;

    /// Write stage, lock and `last_stage_change` in one update.
    async fn update_lead_stage(&self, id: Uuid, placement: &StagePlacement) -> Result<Lead>;
    async fn update_lead_lock(&self, id: Uuid, lock: &StageLock) -> Result<Lead>;
    async fn append_internal_note(&self, id: Uuid, note: &InternalNote) -> Result<Lead>;

    // ── Activities ──

    async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity>;
    async fn load_activity(&self, id: Uuid) -> Result<Option<Activity>>;
    /// Activities of a lead, oldest first.
    async fn list_activities(&self, lead_id: Uuid) -> Result<Vec<Activity>>;
    async fn set_activity_completion(
        &self,
        id: Uuid,
        completion: &ActivityCompletion,
    ) -> Result<Activity>;
    /// Whether an entry into `stage_id` already generated activities for the lead.
    async fn has_generated_activities(&self, lead_id: Uuid, stage_id: &str) -> Result<bool>;

    // ── Messages ──

    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;
    async fn load_message(&self, id: Uuid) -> Result<Option<Message>>;
    /// Messages of a lead, timestamp ascending.
    async fn list_messages(&self, lead_id: Uuid) -> Result<Vec<Message>>;
}
