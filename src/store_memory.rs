use crate::activity::{Activity, ActivityCompletion, NewActivity};
use crate::lead::{InternalNote, Lead, StageLock, StagePlacement};
use crate::message::{Message, NewMessage};
use crate::store::PipelineStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    leads: HashMap<Uuid, Lead>,
    /// Insertion order doubles as creation order
    activities: Vec<Activity>,
    messages: Vec<Message>,
}

/// In-memory `PipelineStore`.
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    // ── Leads ──

    async fn save_lead(&self, lead: &Lead) -> Result<()> {
        self.tables.lock().await.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn load_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        Ok(self.tables.lock().await.leads.get(&id).cloned())
    }

    async fn update_lead_stage(&self, id: Uuid, placement: &StagePlacement) -> Result<Lead> {
        let mut tables = self.tables.lock().await;
        let lead = tables
            .leads
            .get_mut(&id)
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;
        lead.apply_placement(placement);
        Ok(lead.clone())
    }

    async fn update_lead_lock(&self, id: Uuid, lock: &StageLock) -> Result<Lead> {
        let mut tables = self.tables.lock().await;
        let lead = tables
            .leads
            .get_mut(&id)
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;
        lead.set_lock(lock.clone());
        Ok(lead.clone())
    }

    async fn append_internal_note(&self, id: Uuid, note: &InternalNote) -> Result<Lead> {
        let mut tables = self.tables.lock().await;
        let lead = tables
            .leads
            .get_mut(&id)
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;
        lead.notes_internal.push(note.clone());
        lead.updated_at = note.date;
        Ok(lead.clone())
    }

    // ── Activities ──

    async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity> {
        let activity = activity.clone().into_activity();
        self.tables.lock().await.activities.push(activity.clone());
        Ok(activity)
    }

    async fn load_activity(&self, id: Uuid) -> Result<Option<Activity>> {
        let tables = self.tables.lock().await;
        Ok(tables.activities.iter().find(|a| a.id == id).cloned())
    }

    async fn list_activities(&self, lead_id: Uuid) -> Result<Vec<Activity>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .activities
            .iter()
            .filter(|a| a.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn set_activity_completion(
        &self,
        id: Uuid,
        completion: &ActivityCompletion,
    ) -> Result<Activity> {
        let mut tables = self.tables.lock().await;
        let activity = tables
            .activities
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("activity not found: {id}"))?;
        activity.apply_completion(completion);
        Ok(activity.clone())
    }

    async fn has_generated_activities(&self, lead_id: Uuid, stage_id: &str) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.activities.iter().any(|a| {
            a.lead_id == lead_id && a.auto_generated && a.source_stage.as_deref() == Some(stage_id)
        }))
    }

    // ── Messages ──

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let message = message.clone().into_message();
        self.tables.lock().await.messages.push(message.clone());
        Ok(message)
    }

    async fn load_message(&self, id: Uuid) -> Result<Option<Message>> {
        let tables = self.tables.lock().await;
        Ok(tables.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_messages(&self, lead_id: Uuid) -> Result<Vec<Message>> {
        let tables = self.tables.lock().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.lead_id == lead_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }
}
