//! Lead Pipeline - stage transitions, mandatory activities and message threads
//!
//! A lead moves through configurable pipeline stages. Each move asks an
//! eligibility oracle whether the lead may advance, applies the move either
//! way (flagging the lead as locked when it may not), and spawns the target
//! stage's mandatory activities.
//!
//! ## Flow
//! caller -> StageTransitionEngine -> EligibilityOracle (read)
//!        -> MandatoryActivityGenerator (write) -> PipelineStore
//!
//! Message threads are rebuilt independently by the [`thread`] module.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lead_pipeline::{
//!     CompletionOracle, Lead, MemoryStore, PipelineConfig, PipelineStore, StageTransitionEngine,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let pipeline = Arc::new(config.pipeline());
//! let store = Arc::new(MemoryStore::new());
//! let oracle = Arc::new(CompletionOracle::new(store.clone(), pipeline.clone()));
//! let engine = StageTransitionEngine::new(store.clone(), oracle, pipeline, config.engine.clone());
//!
//! let lead = Lead::new(1, uuid::Uuid::new_v4(), "Neon sign", "verification_call");
//! store.save_lead(&lead).await?;
//! let outcome = engine.request_transition(&lead, "quote").await?;
//! if let Some(notice) = outcome.notice() {
//!     println!("{notice}");
//! }
//! # Ok(())
//! # }
//! ```

// Configuration and stage definitions
pub mod config;
pub mod stage;

// Domain records
pub mod activity;
pub mod lead;
pub mod message;

// Persistence
pub mod store;
pub mod store_memory;
#[cfg(feature = "database")]
pub mod store_pg;

// Eligibility, status and generation
pub mod generator;
pub mod oracle;
pub mod status;

// Transition engine
pub mod engine;

// Reply forest reconstruction
pub mod thread;

pub use activity::{Activity, ActivityCompletion, ActivityFilter, ActivityTracker, NewActivity};
pub use config::{
    ConfigError, EngineSettings, GatePolicy, GenerationPolicy, PipelineConfig, ThreadResolution,
};
pub use engine::{
    LockRefresh, StageTransitionEngine, TransitionError, TransitionOutcome, TransitionRequest,
};
pub use generator::{GenerationReport, MandatoryActivityGenerator};
pub use lead::{InternalNote, Lead, StageLock, StagePlacement};
pub use message::{Channel, Message, Messenger, NewMessage, ReplyStatus};
pub use oracle::{check_eligibility, check_eligibility_from, CompletionOracle, Eligibility, EligibilityOracle};
pub use stage::{ActivityTemplate, Pipeline, PipelineStage};
pub use status::{status, MandatoryStatus};
pub use store::PipelineStore;
pub use store_memory::MemoryStore;
#[cfg(feature = "database")]
pub use store_pg::{PgEligibilityOracle, PgPipelineStore};
pub use thread::{build_threads, ThreadBuilder, ThreadReport, ThreadedMessage};
