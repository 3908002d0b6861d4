//! # Translation Orchestrator
//!
//! Client-side coordination of video translation jobs against a remote
//! rendering service.
//!
//! ## Overview
//!
//! The orchestrator owns the entity store, the event bus and the status
//! poller, and exposes the operations callers drive the workflow with:
//! - Project creation with local upload validation
//! - Export submission with proofread-readiness checks
//! - Completion awaiting backed by the event bus
//! - Local script editing and remote audio regeneration
//! - Withdrawal of local tracking and orderly shutdown
//!
//! ## Workflow
//!
//! 1. Create a project from an uploaded video (`create_project`)
//! 2. Order a render (`submit_export`); the acknowledged export is stored
//!    and handed to the background poller
//! 3. Wait for the outcome (`await_completion`) or watch events
//!    (`subscribe`)
//! 4. During proofreading, edit text locally (`update_script_text`), push it
//!    and rebuild the dub (`regenerate_audio`), then order a
//!    `PROOFREAD_EXPORT`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_export::{ExportOrder, NewProject, OrchestratorConfig, TranslationOrchestrator};
//! use service_traits::ExportKind;
//!
//! let orchestrator = TranslationOrchestrator::new(service, OrchestratorConfig::default());
//!
//! let project = orchestrator
//!     .create_project(NewProject::new(upload_url, "video.mp4", "ko"))
//!     .await?;
//!
//! let export = orchestrator
//!     .submit_export(&project.id, ExportOrder::new("en", ExportKind::InitialExport))
//!     .await?;
//!
//! let outcome = orchestrator.await_completion(&export.id).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use service_traits::{
    CreateExportRequest, CreateProjectRequest, ExportKind, ExportPriority, MediaKind, RemoteService,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{ExportError, Result};
use crate::events::{
    EventBus, EventStream, ExportEvent, RecvError, ScriptEvent, TranslationEvent,
    DEFAULT_EVENT_BUFFER_SIZE,
};
use crate::export::{Export, ExportId, ExportOutcome, ExportRequest};
use crate::poller::{PollerConfig, PollerStats, StatusPoller, TrackingDisposition};
use crate::project::{Project, ProjectId, Script, ScriptId, SourceFile};
use crate::retry::RetryPolicy;
use crate::store::EntityStore;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the translation orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay before the first status check of a freshly submitted export
    pub initial_poll_delay: Duration,

    /// Upper bound for the delay between consecutive status checks
    pub max_poll_delay: Duration,

    /// Multiplier applied to the poll delay after every check
    pub backoff_factor: f64,

    /// Maximum random jitter added on top of each poll delay
    pub poll_jitter: Duration,

    /// Total polling budget per export before it is reported as timed out
    pub max_total_wait: Duration,

    /// Maximum number of status checks in flight at once, across all exports
    pub max_in_flight: usize,

    /// Retries allowed after the first attempt of a transient-failing call
    pub max_retry_attempts: u32,

    /// Events buffered per subscriber before it starts lagging
    pub event_buffer_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            initial_poll_delay: Duration::from_secs(5),
            max_poll_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            poll_jitter: Duration::from_secs(1),
            max_total_wait: Duration::from_secs(30 * 60), // 30 minutes
            max_in_flight: 4,
            max_retry_attempts: 3,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl OrchestratorConfig {
    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            initial_delay: self.initial_poll_delay,
            max_delay: self.max_poll_delay,
            backoff_factor: self.backoff_factor,
            jitter: self.poll_jitter,
            max_total_wait: self.max_total_wait,
            max_in_flight: self.max_in_flight,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry_attempts: self.max_retry_attempts,
            ..RetryPolicy::default()
        }
    }
}

// ============================================================================
// Operation Parameters
// ============================================================================

/// Parameters for creating a translation project
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Location the service downloads the uploaded file from
    pub file_url: String,

    /// Original file name, extension included
    pub file_name: String,

    /// Declared media type of the upload
    pub media_kind: MediaKind,

    /// Spoken language of the source (BCP 47 tag)
    pub source_language: String,

    /// Key the service uses to deduplicate a retried creation
    pub idempotency_key: Option<String>,
}

impl NewProject {
    pub fn new(
        file_url: impl Into<String>,
        file_name: impl Into<String>,
        source_language: impl Into<String>,
    ) -> Self {
        Self {
            file_url: file_url.into(),
            file_name: file_name.into(),
            media_kind: MediaKind::Video,
            source_language: source_language.into(),
            idempotency_key: None,
        }
    }

    /// Attach a caller-chosen idempotency key
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach a random idempotency key, making the creation safe to retry
    pub fn with_generated_idempotency_key(mut self) -> Self {
        self.idempotency_key = Some(Uuid::new_v4().to_string());
        self
    }
}

/// Parameters for ordering an export render
#[derive(Debug, Clone)]
pub struct ExportOrder {
    /// Language to translate into (BCP 47 tag)
    pub target_language: String,

    /// First render or proofread re-render
    pub kind: ExportKind,

    /// Request a lip-synchronized video
    pub lipsync: bool,

    /// Request a watermarked render
    pub watermark: bool,

    /// Render priority
    pub priority: ExportPriority,

    /// Key the service uses to deduplicate a retried creation
    pub idempotency_key: Option<String>,
}

impl ExportOrder {
    pub fn new(target_language: impl Into<String>, kind: ExportKind) -> Self {
        Self {
            target_language: target_language.into(),
            kind,
            lipsync: false,
            watermark: false,
            priority: ExportPriority::default(),
            idempotency_key: None,
        }
    }

    pub fn with_priority(mut self, priority: ExportPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a caller-chosen idempotency key
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach a random idempotency key, making the creation safe to retry
    pub fn with_generated_idempotency_key(mut self) -> Self {
        self.idempotency_key = Some(Uuid::new_v4().to_string());
        self
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Orchestrator for video translation jobs
pub struct TranslationOrchestrator {
    /// Configuration
    config: OrchestratorConfig,

    /// Remote service adapter
    service: Arc<dyn RemoteService>,

    /// In-memory entity store, shared with the poller
    store: Arc<EntityStore>,

    /// Event bus all progress events are published on
    events: EventBus,

    /// Background status poller
    poller: StatusPoller,

    /// Retry policy for remote calls issued directly by the orchestrator
    retry: RetryPolicy,
}

impl TranslationOrchestrator {
    /// Create an orchestrator and start its background poller
    ///
    /// Must be called from within a Tokio runtime; the poller spawns its
    /// dispatcher task immediately.
    ///
    /// # Arguments
    ///
    /// * `service` - Adapter to the remote translation service
    /// * `config` - Orchestrator configuration
    pub fn new(service: Arc<dyn RemoteService>, config: OrchestratorConfig) -> Self {
        let store = Arc::new(EntityStore::new());
        let events = EventBus::new(config.event_buffer_size);
        let retry = config.retry_policy();
        let poller = StatusPoller::new(
            Arc::clone(&service),
            Arc::clone(&store),
            events.clone(),
            config.poller_config(),
            retry.clone(),
        );

        Self {
            config,
            service,
            store,
            events,
            poller,
            retry,
        }
    }

    /// Create an orchestrator with default configuration
    pub fn with_defaults(service: Arc<dyn RemoteService>) -> Self {
        Self::new(service, OrchestratorConfig::default())
    }

    /// Create a translation project from an uploaded source file
    ///
    /// The file extension is validated locally before the service is
    /// contacted: anything but `.mp4` or `.webm` (case-insensitive) is
    /// rejected without a remote call. Creation is only retried on transient
    /// failures when the request carries an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidFileExtension`] for an unsupported
    /// upload, or the classified service error if creation fails remotely.
    #[instrument(skip(self, params), fields(file_name = %params.file_name))]
    pub async fn create_project(&self, params: NewProject) -> Result<Project> {
        let NewProject {
            file_url,
            file_name,
            media_kind,
            source_language,
            idempotency_key,
        } = params;

        let source = SourceFile::new(file_url, media_kind, file_name);
        if !source.has_supported_extension() {
            return Err(ExportError::InvalidFileExtension {
                file_name: source.file_name,
            });
        }

        let request = CreateProjectRequest {
            file_type: source.media_kind,
            file_url: source.url.clone(),
            file_name: source.file_name.clone(),
            source_language: source_language.clone(),
            idempotency_key: idempotency_key.clone(),
        };

        let service = Arc::clone(&self.service);
        let response = self
            .retry
            .execute_create("create_project", idempotency_key.as_deref(), || {
                let service = Arc::clone(&service);
                let request = request.clone();
                async move { service.create_project(request).await }
            })
            .await?;

        let project = Project::new(ProjectId::new(response.project_id), source, source_language);
        self.store.put_project(project.clone()).await;

        info!(project_id = %project.id, "Created translation project");

        Ok(project)
    }

    /// Register a transcribed script segment under a project
    ///
    /// Scripts carry server-assigned ids from the transcription flow;
    /// registering one here is local bookkeeping only.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ProjectNotFound`] if the project is unknown.
    #[instrument(skip(self, original_text, translated_text), fields(project_id = %project_id, script_id = %script_id))]
    pub async fn register_script(
        &self,
        project_id: &ProjectId,
        script_id: ScriptId,
        original_text: impl Into<String>,
        translated_text: impl Into<String>,
    ) -> Result<Script> {
        let script = Script::new(script_id, project_id.clone(), original_text, translated_text);
        self.store.attach_script(script.clone()).await?;
        Ok(script)
    }

    /// Order an export render for a project and start tracking it
    ///
    /// A `PROOFREAD_EXPORT` order is refused while any script of the project
    /// has audio out of sync; push the edits through
    /// [`Self::regenerate_audio`] first. The call returns as soon as the
    /// service acknowledges the order. Wait for the result with
    /// [`Self::await_completion`] or by subscribing to events.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ProjectNotFound`] for an unknown project,
    /// [`ExportError::ScriptsOutOfSync`] for a blocked proofread order,
    /// [`ExportError::Shutdown`] once the orchestrator has been stopped, or
    /// the classified service error if creation fails remotely.
    #[instrument(skip(self, order), fields(project_id = %project_id, kind = %order.kind, target_language = %order.target_language))]
    pub async fn submit_export(
        &self,
        project_id: &ProjectId,
        order: ExportOrder,
    ) -> Result<Export> {
        if self.poller.is_shutdown() {
            return Err(ExportError::Shutdown);
        }

        let project = self.store.get_project(project_id).await?;

        if order.kind == ExportKind::ProofreadExport {
            let scripts = self.store.scripts_for_project(project_id).await?;
            let out_of_sync = scripts
                .iter()
                .filter(|script| script.audio_out_of_sync)
                .count();
            if out_of_sync > 0 {
                return Err(ExportError::ScriptsOutOfSync {
                    project_id: project_id.to_string(),
                    count: out_of_sync,
                });
            }
        }

        let ExportOrder {
            target_language,
            kind,
            lipsync,
            watermark,
            priority,
            idempotency_key,
        } = order;

        let mut request = ExportRequest::new(project_id.clone(), target_language.clone(), kind);
        request.lipsync = lipsync;
        request.watermark = watermark;
        request.priority = priority;

        let server_label = format!(
            "{} -> {} ({})",
            project.source.stem(),
            target_language,
            kind.as_str()
        );

        let wire_request = CreateExportRequest {
            project_id: project_id.to_string(),
            target_language,
            kind,
            lipsync,
            watermark,
            priority,
            server_label,
            idempotency_key: idempotency_key.clone(),
        };

        let service = Arc::clone(&self.service);
        let response = self
            .retry
            .execute_create("create_export", idempotency_key.as_deref(), || {
                let service = Arc::clone(&service);
                let request = wire_request.clone();
                async move { service.create_export(request).await }
            })
            .await?;

        let export = request.acknowledge(ExportId::new(response.export_id));
        self.store.put_export(export.clone()).await;
        self.poller.track(export.id.clone()).await?;

        self.events
            .emit(TranslationEvent::Export(ExportEvent::Submitted {
                export_id: export.id.to_string(),
                project_id: export.project_id.to_string(),
                target_language: export.target_language.clone(),
                kind: export.kind,
            }))
            .ok();

        info!(export_id = %export.id, "Export submitted and tracked");

        Ok(export)
    }

    /// Wait until a tracked export reaches a terminal status
    ///
    /// Any number of tasks may await the same export; each observes the same
    /// outcome. The event subscription is opened before the store snapshot is
    /// taken, so a terminal transition between the two is never missed.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ExportNotFound`] for an unknown id,
    /// [`ExportError::PollTimeout`] if the polling budget ran out while the
    /// export was still running, [`ExportError::TrackingCancelled`] if
    /// tracking was withdrawn, and [`ExportError::Shutdown`] if the event
    /// bus closes while waiting.
    #[instrument(skip(self), fields(export_id = %export_id))]
    pub async fn await_completion(&self, export_id: &ExportId) -> Result<ExportOutcome> {
        let filter_id = export_id.to_string();
        let mut stream = EventStream::new(self.events.subscribe()).filter(move |event| {
            matches!(event, TranslationEvent::Export(export) if export.export_id() == filter_id)
        });

        let export = self.store.get_export(export_id).await?;
        if let Some(outcome) = export.outcome() {
            return Ok(outcome);
        }

        match self.poller.disposition(export_id).await {
            TrackingDisposition::Tracked => {}
            TrackingDisposition::TimedOut => {
                return Err(ExportError::PollTimeout {
                    export_id: export_id.to_string(),
                    waited_secs: self.config.max_total_wait.as_secs(),
                });
            }
            TrackingDisposition::Untracked => return self.settle_untracked(export_id).await,
        }

        loop {
            match stream.recv().await {
                Ok(TranslationEvent::Export(ExportEvent::Completed {
                    export_id,
                    artifacts,
                })) => {
                    return Ok(ExportOutcome::Completed {
                        export_id: ExportId::new(export_id),
                        artifacts,
                    });
                }
                Ok(TranslationEvent::Export(ExportEvent::Failed { export_id, detail })) => {
                    return Ok(ExportOutcome::Failed {
                        export_id: ExportId::new(export_id),
                        detail,
                    });
                }
                Ok(TranslationEvent::Export(ExportEvent::TimedOut {
                    export_id,
                    waited_secs,
                })) => {
                    return Err(ExportError::PollTimeout {
                        export_id,
                        waited_secs,
                    });
                }
                Ok(TranslationEvent::Export(ExportEvent::TrackingCancelled { export_id })) => {
                    return Err(ExportError::TrackingCancelled { export_id });
                }
                // Submitted and StatusChanged keep the wait alive
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Completion awaiter lagged, re-reading the store");
                    let export = self.store.get_export(export_id).await?;
                    if let Some(outcome) = export.outcome() {
                        return Ok(outcome);
                    }
                    match self.poller.disposition(export_id).await {
                        TrackingDisposition::Tracked => {}
                        TrackingDisposition::TimedOut => {
                            return Err(ExportError::PollTimeout {
                                export_id: export_id.to_string(),
                                waited_secs: self.config.max_total_wait.as_secs(),
                            });
                        }
                        TrackingDisposition::Untracked => {
                            return self.settle_untracked(export_id).await;
                        }
                    }
                }
                Err(RecvError::Closed) => return Err(ExportError::Shutdown),
            }
        }
    }

    /// Settle an awaiter that found its export untracked but not terminal:
    /// either tracking was withdrawn, or the export finished right after the
    /// last snapshot. A second read decides which.
    async fn settle_untracked(&self, export_id: &ExportId) -> Result<ExportOutcome> {
        let export = self.store.get_export(export_id).await?;
        match export.outcome() {
            Some(outcome) => Ok(outcome),
            None => Err(ExportError::TrackingCancelled {
                export_id: export_id.to_string(),
            }),
        }
    }

    /// Replace the translated text of a script locally
    ///
    /// Nothing is pushed to the service here. The script is flagged as
    /// having audio out of sync until [`Self::regenerate_audio`] confirms
    /// the dub was rebuilt from the new text, and proofread exports are
    /// blocked while the flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ScriptNotFound`] if the script is unknown.
    #[instrument(skip(self, text), fields(script_id = %script_id))]
    pub async fn update_script_text(
        &self,
        script_id: &ScriptId,
        text: impl Into<String>,
    ) -> Result<Script> {
        let text = text.into();
        let script = self
            .store
            .update_script(script_id, |script| {
                script.update_translation(text);
                script.clone()
            })
            .await?;

        self.events
            .emit(TranslationEvent::Script(ScriptEvent::TextUpdated {
                script_id: script_id.to_string(),
            }))
            .ok();

        Ok(script)
    }

    /// Push the edited script text to the service and regenerate its audio
    ///
    /// The out-of-sync flag is cleared only after both remote calls succeed.
    /// On failure the script stays flagged, so proofread exports remain
    /// blocked until a later attempt goes through.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ScriptNotFound`] if the script is unknown, or
    /// the classified service error if either remote call fails.
    #[instrument(skip(self), fields(script_id = %script_id))]
    pub async fn regenerate_audio(&self, script_id: &ScriptId) -> Result<Script> {
        let script = self.store.get_script(script_id).await?;

        if let Err(error) = self.push_text_and_regenerate(&script).await {
            warn!(error = %error, "Audio regeneration failed, script stays out of sync");
            self.events
                .emit(TranslationEvent::Script(ScriptEvent::AudioRegenerationFailed {
                    script_id: script_id.to_string(),
                    message: error.to_string(),
                }))
                .ok();
            return Err(error);
        }

        let script = self
            .store
            .update_script(script_id, |script| {
                script.mark_audio_current();
                script.clone()
            })
            .await?;

        self.events
            .emit(TranslationEvent::Script(ScriptEvent::AudioRegenerated {
                script_id: script_id.to_string(),
            }))
            .ok();

        Ok(script)
    }

    async fn push_text_and_regenerate(&self, script: &Script) -> Result<()> {
        let service = Arc::clone(&self.service);
        let script_id = script.id.to_string();
        let text = script.translated_text.clone();
        self.retry
            .execute_read("update_script_text", || {
                let service = Arc::clone(&service);
                let script_id = script_id.clone();
                let text = text.clone();
                async move { service.update_script_text(&script_id, &text).await }
            })
            .await?;

        let service = Arc::clone(&self.service);
        let script_id = script.id.to_string();
        self.retry
            .execute_read("regenerate_script_audio", || {
                let service = Arc::clone(&service);
                let script_id = script_id.clone();
                async move { service.regenerate_script_audio(&script_id).await }
            })
            .await
    }

    /// Stop polling an export without contacting the service
    ///
    /// The remote render keeps running; only local tracking is withdrawn,
    /// and pending completion awaiters observe
    /// [`ExportError::TrackingCancelled`]. Withdrawing an export that is no
    /// longer tracked is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ExportNotFound`] for an id this orchestrator
    /// never stored.
    #[instrument(skip(self), fields(export_id = %export_id))]
    pub async fn cancel_tracking(&self, export_id: &ExportId) -> Result<()> {
        self.store.get_export(export_id).await?;
        self.poller.cancel(export_id).await;
        Ok(())
    }

    /// Stop the background poller and withdraw every tracked export
    ///
    /// Pending completion awaiters observe
    /// [`ExportError::TrackingCancelled`]; later submissions fail with
    /// [`ExportError::Shutdown`]. Shutting down twice is a no-op.
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
    }

    /// Whether the orchestrator has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.poller.is_shutdown()
    }

    /// Fetch a project by id
    pub async fn get_project(&self, id: &ProjectId) -> Result<Project> {
        self.store.get_project(id).await
    }

    /// Fetch a script by id
    pub async fn get_script(&self, id: &ScriptId) -> Result<Script> {
        self.store.get_script(id).await
    }

    /// Fetch an export by id
    pub async fn get_export(&self, id: &ExportId) -> Result<Export> {
        self.store.get_export(id).await
    }

    /// All scripts attached to a project, in ingestion order
    pub async fn scripts_for_project(&self, project_id: &ProjectId) -> Result<Vec<Script>> {
        self.store.scripts_for_project(project_id).await
    }

    /// Ids of every export not yet in a terminal status
    pub async fn active_exports(&self) -> Vec<ExportId> {
        self.store.list_active_exports().await
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// The event bus progress events are published on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Poller counters, for diagnostics
    pub async fn poller_stats(&self) -> PollerStats {
        self.poller.stats().await
    }

    /// The configuration this orchestrator runs with
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

// ============================================================================
// Tests
// ============================================================================
