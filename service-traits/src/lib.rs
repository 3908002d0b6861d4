//! # Translation Service Traits
//!
//! Contract between the orchestration core and the remote video-translation
//! service.
//!
//! ## Overview
//!
//! This crate defines what the core needs from a service adapter without
//! prescribing how the adapter talks to the service. A deployment wires in a
//! concrete [`RemoteService`](remote::RemoteService) implementation (HTTP,
//! gRPC, an in-process fake for tests) and the core never notices the
//! difference.
//!
//! ## Contents
//!
//! ### Service Interface
//! - [`RemoteService`](remote::RemoteService) - Project creation, export jobs, script edits
//!
//! ### Wire Vocabulary
//! - [`ExportStatus`](wire::ExportStatus) - Server-reported job status
//! - [`ExportKind`](wire::ExportKind) - Initial vs proofread render
//! - [`MediaKind`](wire::MediaKind) - Declared source file type
//! - [`ExportPriority`](wire::ExportPriority) - Render priority
//!
//! ## Error Handling
//!
//! Adapters report failures through [`ServiceError`](error::ServiceError),
//! which separates the classes the core reacts to differently:
//!
//! - Transient faults (network, 5xx, 429) that are safe to retry
//! - Authentication failures (401, 403)
//! - Permanent request rejections (remaining 4xx)
//! - Wire tokens this crate does not recognize
//!
//! ## Thread Safety
//!
//! [`RemoteService`](remote::RemoteService) requires `Send + Sync` so one
//! adapter instance can be shared across async tasks.
//!
//! ## Examples
//!
//! ### Implementing RemoteService
//!
//! ```ignore
//! use service_traits::remote::{
//!     CreateExportRequest, CreateExportResponse, CreateProjectRequest,
//!     CreateProjectResponse, ExportStatusResponse, RemoteService,
//! };
//! use service_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct HttpRemote {
//!     client: reqwest::Client,
//!     base_url: String,
//! }
//!
//! #[async_trait]
//! impl RemoteService for HttpRemote {
//!     async fn create_project(&self, request: CreateProjectRequest) -> Result<CreateProjectResponse> {
//!         // POST /projects
//!         todo!()
//!     }
//!
//!     async fn create_export(&self, request: CreateExportRequest) -> Result<CreateExportResponse> {
//!         // POST /exports
//!         todo!()
//!     }
//!
//!     async fn get_export_status(&self, export_id: &str) -> Result<ExportStatusResponse> {
//!         // GET /exports/{id}
//!         todo!()
//!     }
//!
//!     async fn update_script_text(&self, script_id: &str, text: &str) -> Result<()> {
//!         // PATCH /scripts/{id}
//!         todo!()
//!     }
//!
//!     async fn regenerate_script_audio(&self, script_id: &str) -> Result<()> {
//!         // POST /scripts/{id}/audio
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod remote;
pub mod wire;

pub use error::{Result, ServiceError};

// Re-export commonly used types
pub use remote::{
    CreateExportRequest, CreateExportResponse, CreateProjectRequest, CreateProjectResponse,
    ExportArtifacts, ExportStatusResponse, RemoteService,
};
pub use wire::{ExportKind, ExportPriority, ExportStatus, MediaKind};
