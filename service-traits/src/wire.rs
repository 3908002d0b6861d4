//! Wire Vocabulary
//!
//! Enumerations shared verbatim with the remote job-processing API. The
//! string tokens round-trip exactly: `as_str` produces the wire value and
//! `FromStr` accepts nothing else (no case folding).

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Export Status
// ============================================================================

/// Server-reported status of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    /// Job accepted, waiting to be picked up
    Pending,
    /// Job is being rendered
    Processing,
    /// Job finished and artifacts are available
    Completed,
    /// Job failed server-side
    Failed,
}

impl ExportStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }

    /// Check if this status still requires polling
    pub fn is_active(&self) -> bool {
        matches!(self, ExportStatus::Pending | ExportStatus::Processing)
    }

    /// Get the exact wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "PENDING",
            ExportStatus::Processing => "PROCESSING",
            ExportStatus::Completed => "COMPLETED",
            ExportStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ExportStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExportStatus::Pending),
            "PROCESSING" => Ok(ExportStatus::Processing),
            "COMPLETED" => Ok(ExportStatus::Completed),
            "FAILED" => Ok(ExportStatus::Failed),
            _ => Err(ServiceError::UnknownToken(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Export Kind
// ============================================================================

/// The kind of export being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportKind {
    /// First render of a project into a target language
    InitialExport,
    /// Re-render after proofreading edits to the translated scripts
    ProofreadExport,
}

impl ExportKind {
    /// Get the exact wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::InitialExport => "INITIAL_EXPORT",
            ExportKind::ProofreadExport => "PROOFREAD_EXPORT",
        }
    }
}

impl FromStr for ExportKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL_EXPORT" => Ok(ExportKind::InitialExport),
            "PROOFREAD_EXPORT" => Ok(ExportKind::ProofreadExport),
            _ => Err(ServiceError::UnknownToken(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Media Kind
// ============================================================================

/// Declared type of an uploaded source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Get the exact wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "VIDEO",
            MediaKind::Audio => "AUDIO",
        }
    }
}

impl FromStr for MediaKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIDEO" => Ok(MediaKind::Video),
            "AUDIO" => Ok(MediaKind::Audio),
            _ => Err(ServiceError::UnknownToken(s.to_string())),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Export Priority
// ============================================================================

/// Render priority requested for an export job.
///
/// Ordered so that `High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportPriority {
    Low,
    Normal,
    High,
}

impl ExportPriority {
    /// Get the exact wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportPriority::Low => "LOW",
            ExportPriority::Normal => "NORMAL",
            ExportPriority::High => "HIGH",
        }
    }
}

impl Default for ExportPriority {
    fn default() -> Self {
        ExportPriority::Normal
    }
}

impl FromStr for ExportPriority {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(ExportPriority::Low),
            "NORMAL" => Ok(ExportPriority::Normal),
            "HIGH" => Ok(ExportPriority::High),
            _ => Err(ServiceError::UnknownToken(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
