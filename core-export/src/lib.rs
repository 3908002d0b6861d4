//! # Video Translation Export Core
//!
//! Client-side orchestration of video translation jobs against a remote
//! rendering service.
//!
//! ## Overview
//!
//! This crate manages the lifecycle of translation projects and their export
//! renders, including:
//! - Creating projects from uploaded videos, with local upload validation
//! - Submitting export jobs and tracking them to completion
//! - Polling job status with capped exponential backoff and jitter
//! - Applying server-reported status transitions to a strict state machine
//! - Proofreading support: local script edits and remote audio regeneration
//!
//! ## Components
//!
//! - **Orchestrator** (`orchestrator`): Public operations callers drive the workflow with
//! - **Entity Store** (`store`): In-memory entity ownership with per-id write serialization
//! - **Status Poller** (`poller`): Background polling with backoff, jitter, and a global in-flight cap
//! - **Export State Machine** (`export`): Validated status transitions and terminal outcomes
//! - **Retry Policy** (`retry`): Classification-driven retry for remote calls
//! - **Event Bus** (`events`): Broadcast progress events for subscribers and completion awaiters
//! - **Logging** (`logging`): `tracing` subscriber setup

pub mod error;
pub mod events;
pub mod export;
pub mod logging;
pub mod orchestrator;
pub mod poller;
pub mod project;
pub mod retry;
pub mod store;

pub use error::{ExportError, Result};
pub use events::{EventBus, EventStream, ExportEvent, ScriptEvent, TranslationEvent};
pub use export::{Export, ExportId, ExportOutcome, ExportRequest, StatusApplied};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use orchestrator::{ExportOrder, NewProject, OrchestratorConfig, TranslationOrchestrator};
pub use poller::{PollerConfig, PollerStats, StatusPoller, TrackingDisposition};
pub use project::{Project, ProjectId, Script, ScriptId, SourceFile, SUPPORTED_EXTENSIONS};
pub use retry::RetryPolicy;
pub use store::EntityStore;

// Wire-level types callers need when building requests or reading outcomes
pub use service_traits::{
    ExportArtifacts, ExportKind, ExportPriority, ExportStatus, MediaKind, RemoteService,
    ServiceError,
};

/// Seconds since the Unix epoch, used for entity timestamps
pub(crate) fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
