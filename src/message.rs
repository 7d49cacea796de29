//! Message Types and Sending
//!
//! Messages form reply trees through `in_reply_to`. `thread_id` is a
//! denormalized grouping label assigned at send time; tree construction
//! never reads it (see [`crate::thread`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::ThreadResolution;
use crate::store::PipelineStore;
use crate::thread::{ThreadBuilder, ThreadedMessage};

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "whatsapp" => Ok(Self::Whatsapp),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// Reply state of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    #[default]
    Pending,
    Sent,
    Received,
    Replied,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Received => "received",
            Self::Replied => "replied",
        }
    }
}

impl std::str::FromStr for ReplyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "received" => Ok(Self::Received),
            "replied" => Ok(Self::Replied),
            _ => Err(format!("Unknown reply status: {}", s)),
        }
    }
}

/// A message exchanged with a lead's contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub content: String,
    pub channel: Channel,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    /// Non-owning reference to the message this one answers
    #[serde(default)]
    pub in_reply_to: Option<Uuid>,
    /// Conversation label; may be missing on legacy rows
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(default)]
    pub reply_status: ReplyStatus,
}

impl Message {
    /// Thread label a reply to this message inherits
    pub fn thread_key(&self) -> String {
        match self.thread_id.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.id.to_string(),
        }
    }
}

/// Mint a thread id for a new conversation
pub fn new_thread_id() -> String {
    format!("thread_{}", Uuid::new_v4().simple())
}

/// Insert payload for a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub lead_id: Uuid,
    pub content: String,
    pub channel: Channel,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub in_reply_to: Option<Uuid>,
    pub thread_id: String,
    pub ai_generated: bool,
    pub reply_status: ReplyStatus,
}

impl NewMessage {
    /// First message of a new conversation
    pub fn fresh(
        lead_id: Uuid,
        content: impl Into<String>,
        channel: Channel,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            lead_id,
            content: content.into(),
            channel,
            sender: sender.into(),
            timestamp: Utc::now(),
            in_reply_to: None,
            thread_id: new_thread_id(),
            ai_generated: false,
            reply_status: ReplyStatus::Sent,
        }
    }

    /// Reply to `parent`, inheriting its thread
    pub fn reply_to(
        parent: &Message,
        content: impl Into<String>,
        channel: Channel,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            in_reply_to: Some(parent.id),
            thread_id: parent.thread_key(),
            ..Self::fresh(parent.lead_id, content, channel, sender)
        }
    }

    pub fn ai_generated(mut self) -> Self {
        self.ai_generated = true;
        self
    }

    pub fn with_status(mut self, status: ReplyStatus) -> Self {
        self.reply_status = status;
        self
    }

    /// Materialize as a stored record (used by in-process stores)
    pub fn into_message(self) -> Message {
        Message {
            id: Uuid::new_v4(),
            lead_id: self.lead_id,
            content: self.content,
            channel: self.channel,
            sender: self.sender,
            timestamp: self.timestamp,
            in_reply_to: self.in_reply_to,
            thread_id: Some(self.thread_id),
            ai_generated: self.ai_generated,
            reply_status: self.reply_status,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message content is empty")]
    EmptyContent,

    #[error("message to reply to not found: {0}")]
    ParentNotFound(Uuid),

    #[error("store: {0}")]
    Store(#[from] anyhow::Error),
}

/// Sends messages and reads conversations back as reply forests
pub struct Messenger {
    store: Arc<dyn PipelineStore>,
    builder: ThreadBuilder,
}

impl Messenger {
    pub fn new(store: Arc<dyn PipelineStore>, resolution: ThreadResolution) -> Self {
        Self {
            store,
            builder: ThreadBuilder::new(resolution),
        }
    }

    /// Start a new conversation
    pub async fn send(
        &self,
        lead_id: Uuid,
        content: &str,
        channel: Channel,
        sender: &str,
    ) -> Result<Message, MessageError> {
        if content.trim().is_empty() {
            return Err(MessageError::EmptyContent);
        }
        let message = self
            .store
            .insert_message(&NewMessage::fresh(lead_id, content, channel, sender))
            .await?;

        info!(lead_id = %lead_id, message_id = %message.id, channel = %channel, "message sent");
        Ok(message)
    }

    /// Reply to an existing message, inheriting its thread
    pub async fn reply(
        &self,
        parent_id: Uuid,
        content: &str,
        channel: Channel,
        sender: &str,
    ) -> Result<Message, MessageError> {
        if content.trim().is_empty() {
            return Err(MessageError::EmptyContent);
        }
        let parent = self
            .store
            .load_message(parent_id)
            .await?
            .ok_or(MessageError::ParentNotFound(parent_id))?;

        let message = self
            .store
            .insert_message(&NewMessage::reply_to(&parent, content, channel, sender))
            .await?;

        info!(
            lead_id = %message.lead_id,
            message_id = %message.id,
            in_reply_to = %parent_id,
            "reply sent"
        );
        Ok(message)
    }

    /// A lead's messages as a reply forest
    pub async fn conversation(&self, lead_id: Uuid) -> Result<Vec<ThreadedMessage>, MessageError> {
        let messages = self.store.list_messages(lead_id).await?;
        Ok(self.builder.build(messages))
    }
}
