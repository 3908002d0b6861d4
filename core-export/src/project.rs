//! # Translation Projects and Scripts
//!
//! Domain models for translation projects and their script segments.
//!
//! ## Overview
//!
//! A project wraps one uploaded source video together with the scripts the
//! service transcribed from it. Script segments carry the translated text a
//! user can proofread; edits are staged locally and flagged until the dubbed
//! audio is regenerated to match.

use crate::current_timestamp;
use serde::{Deserialize, Serialize};
use service_traits::MediaKind;
use std::fmt;

/// File extensions the service accepts for source videos
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "webm"];

// ============================================================================
// ID Types
// ============================================================================

/// Server-assigned identifier for a translation project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Server-assigned identifier for a script segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptId(String);

impl ScriptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ScriptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ScriptId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Source File
// ============================================================================

/// An uploaded source file a project is created from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Location the service fetches the file from
    pub url: String,
    /// Declared media type
    pub media_kind: MediaKind,
    /// Original file name, extension included
    pub file_name: String,
}

impl SourceFile {
    pub fn new(url: impl Into<String>, media_kind: MediaKind, file_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            media_kind,
            file_name: file_name.into(),
        }
    }

    /// File extension without the dot, if the name has one
    pub fn extension(&self) -> Option<&str> {
        let (stem, extension) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(extension)
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.file_name,
        }
    }

    /// Check the extension against the formats the service accepts
    ///
    /// Comparison is case-insensitive: `VIDEO.MP4` passes.
    pub fn has_supported_extension(&self) -> bool {
        self.extension()
            .map(|extension| {
                let lowered = extension.to_ascii_lowercase();
                SUPPORTED_EXTENSIONS.contains(&lowered.as_str())
            })
            .unwrap_or(false)
    }
}

// ============================================================================
// Project Entity
// ============================================================================

/// A translation project tracked by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Server-assigned identifier
    pub id: ProjectId,
    /// The uploaded file this project was created from
    pub source: SourceFile,
    /// Spoken language of the source (BCP 47 tag)
    pub source_language: String,
    /// Script segments attached to this project, in ingestion order
    pub script_ids: Vec<ScriptId>,
    /// When the project was registered locally
    pub created_at: i64,
}

impl Project {
    pub fn new(id: ProjectId, source: SourceFile, source_language: impl Into<String>) -> Self {
        Self {
            id,
            source,
            source_language: source_language.into(),
            script_ids: Vec::new(),
            created_at: current_timestamp(),
        }
    }
}

// ============================================================================
// Script Entity
// ============================================================================

/// One transcribed script segment of a project
///
/// `audio_out_of_sync` is set whenever the translated text is edited locally
/// and cleared only after the service confirms the dubbed audio was
/// regenerated from the new text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Server-assigned identifier
    pub id: ScriptId,
    /// Project this segment belongs to
    pub project_id: ProjectId,
    /// Transcribed text in the source language
    pub original_text: String,
    /// Translated text, possibly edited during proofreading
    pub translated_text: String,
    /// Whether the dubbed audio no longer matches `translated_text`
    pub audio_out_of_sync: bool,
    /// Last local modification time
    pub updated_at: i64,
}

impl Script {
    pub fn new(
        id: ScriptId,
        project_id: ProjectId,
        original_text: impl Into<String>,
        translated_text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            project_id,
            original_text: original_text.into(),
            translated_text: translated_text.into(),
            audio_out_of_sync: false,
            updated_at: current_timestamp(),
        }
    }

    /// Replace the translated text and flag the audio as stale
    pub fn update_translation(&mut self, text: impl Into<String>) {
        self.translated_text = text.into();
        self.audio_out_of_sync = true;
        self.updated_at = current_timestamp();
    }

    /// Record that the dubbed audio matches the current text again
    pub fn mark_audio_current(&mut self) {
        self.audio_out_of_sync = false;
        self.updated_at = current_timestamp();
    }
}

// ============================================================================
// Tests
// ============================================================================
