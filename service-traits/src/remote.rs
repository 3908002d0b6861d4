//! # Remote Translation Service
//!
//! Defines the interface the orchestration core uses to reach the remote
//! video-translation service, together with the request and response
//! payloads exchanged with it.
//!
//! ## Overview
//!
//! Implementations own the transport (HTTP client, auth headers, retries at
//! the socket level). The core only sees this trait:
//! - Creating translation projects and export jobs
//! - Fetching export job status
//! - Pushing proofread script text and regenerating dubbed audio
//!
//! Status responses carry the status as a raw string so that tokens this
//! crate does not know about still reach the caller, which decides how to
//! react to them.

use crate::error::Result;
use crate::wire::{ExportKind, ExportPriority, MediaKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Payloads
// ============================================================================

/// Payload for creating a translation project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    /// Declared media type of the uploaded file
    pub file_type: MediaKind,

    /// Location the service should fetch the source file from
    pub file_url: String,

    /// Original file name, extension included
    pub file_name: String,

    /// Spoken language of the source file (BCP 47 tag)
    pub source_language: String,

    /// Token allowing the service to deduplicate repeated submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Payload for creating an export job on an existing project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportRequest {
    /// Project the export renders
    pub project_id: String,

    /// Language to translate into (BCP 47 tag)
    pub target_language: String,

    /// Whether this is a first render or a proofread re-render
    pub kind: ExportKind,

    /// Request lip-synchronized video output
    pub lipsync: bool,

    /// Request a watermarked render
    pub watermark: bool,

    /// Render priority
    pub priority: ExportPriority,

    /// Human-readable label shown in the service dashboard
    pub server_label: String,

    /// Token allowing the service to deduplicate repeated submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

// ============================================================================
// Response Payloads
// ============================================================================

/// Response to a project creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectResponse {
    /// Server-assigned project identifier
    pub project_id: String,
}

/// Response to an export creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportResponse {
    /// Server-assigned export job identifier
    pub export_id: String,
}

/// Output file URLs attached to a finished export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifacts {
    /// Translated video without lip synchronization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_no_lipsync: Option<String>,

    /// Translated video with lip synchronization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_lipsync: Option<String>,

    /// Subtitles in the source language
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_original: Option<String>,

    /// Subtitles in the target language
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_translated: Option<String>,
}

impl ExportArtifacts {
    /// Check whether at least one translated video URL is present
    ///
    /// A completed export without a primary video artifact is unusable,
    /// whatever the server claims.
    pub fn has_primary_video(&self) -> bool {
        self.video_no_lipsync.is_some() || self.video_lipsync.is_some()
    }
}

/// Status report for an export job
///
/// The `status` field deliberately stays a raw string: unknown tokens must
/// survive deserialization so the caller can classify them itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatusResponse {
    /// Raw status token as reported by the service
    pub status: String,

    /// Optional human-readable detail for the current status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,

    /// Output files, populated once the job completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ExportArtifacts>,

    /// Server-side failure description, populated for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

// ============================================================================
// Service Trait
// ============================================================================

/// Interface to the remote video-translation service
///
/// Transport concerns (HTTP, auth, serialization over the wire) live in the
/// implementation. Errors are reported through [`crate::ServiceError`] so
/// the caller can distinguish transient faults from permanent rejections.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Create a translation project for an uploaded source file
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request or is unreachable
    async fn create_project(&self, request: CreateProjectRequest) -> Result<CreateProjectResponse>;

    /// Create an export job on an existing project
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request or is unreachable
    async fn create_export(&self, request: CreateExportRequest) -> Result<CreateExportResponse>;

    /// Fetch the current status of an export job
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request or is unreachable
    async fn get_export_status(&self, export_id: &str) -> Result<ExportStatusResponse>;

    /// Replace the translated text of a script segment
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request or is unreachable
    async fn update_script_text(&self, script_id: &str, text: &str) -> Result<()>;

    /// Regenerate the dubbed audio for a script segment from its current text
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request or is unreachable
    async fn regenerate_script_audio(&self, script_id: &str) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
