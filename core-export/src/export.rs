//! # Export Job State Machine
//!
//! Manages the lifecycle of export jobs with validated state transitions.
//!
//! ## Overview
//!
//! An export starts as an [`ExportRequest`] with no identity. Once the remote
//! service acknowledges creation it becomes an [`Export`] entity in `PENDING`
//! status, and from then on every transition is driven by the `status` field
//! of a poll response. The machine never infers progress locally, so a server
//! that introduces intermediate statuses degrades to an explicit local failure
//! instead of silent drift.
//!
//! ## State Machine
//!
//! ```text
//! (request) → Pending → Processing → Completed
//!                 ↓          ↓
//!                 └────────→ Failed
//! ```
//!
//! Terminal states accept no further transitions, and `Processing` never
//! regresses to `Pending`; stale reports are discarded as no-ops.

use crate::current_timestamp;
use crate::project::ProjectId;
use crate::{ExportError, Result};
use serde::{Deserialize, Serialize};
use service_traits::{ExportArtifacts, ExportKind, ExportPriority, ExportStatus, ExportStatusResponse};
use std::fmt;

// ============================================================================
// ID Type
// ============================================================================

/// Server-assigned identifier for an export job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportId(String);

impl ExportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ExportId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Export Request
// ============================================================================

/// An export that has been ordered but not yet acknowledged by the service
///
/// Holding the pre-acknowledgment phase as its own type keeps unidentified
/// exports out of the store: only [`Export`] entities (which always have an
/// id) can be stored or polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub project_id: ProjectId,
    pub target_language: String,
    pub kind: ExportKind,
    pub lipsync: bool,
    pub watermark: bool,
    pub priority: ExportPriority,
    pub created_at: i64,
}

impl ExportRequest {
    pub fn new(project_id: ProjectId, target_language: impl Into<String>, kind: ExportKind) -> Self {
        Self {
            project_id,
            target_language: target_language.into(),
            kind,
            lipsync: false,
            watermark: false,
            priority: ExportPriority::default(),
            created_at: current_timestamp(),
        }
    }

    /// Promote the request to a tracked entity once the service assigned an id
    pub fn acknowledge(self, id: ExportId) -> Export {
        Export {
            id,
            project_id: self.project_id,
            target_language: self.target_language,
            kind: self.kind,
            lipsync: self.lipsync,
            watermark: self.watermark,
            priority: self.priority,
            status: ExportStatus::Pending,
            status_detail: None,
            artifacts: None,
            failure_reason: None,
            created_at: self.created_at,
            acknowledged_at: current_timestamp(),
            completed_at: None,
        }
    }
}

// ============================================================================
// Status Application Results
// ============================================================================

/// Final result of an export, delivered to completion awaiters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Export finished and produced output files
    Completed {
        export_id: ExportId,
        artifacts: ExportArtifacts,
    },
    /// Export failed, server-side or through an unusable server response
    Failed { export_id: ExportId, detail: String },
}

/// What applying one status report to an export changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusApplied {
    /// Status moved forward along the transition graph
    Advanced {
        from: ExportStatus,
        to: ExportStatus,
    },
    /// Report confirmed the status already held (detail refreshed)
    Unchanged,
    /// Export entered a terminal status with this report
    Terminal { outcome: ExportOutcome },
    /// Report discarded: export already terminal locally, or the report
    /// would regress the status
    Ignored { current: ExportStatus },
}

// ============================================================================
// Export Entity
// ============================================================================

/// An acknowledged export job tracked by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// Server-assigned identifier
    pub id: ExportId,
    /// Project this export renders
    pub project_id: ProjectId,
    /// Language being translated into (BCP 47 tag)
    pub target_language: String,
    /// First render or proofread re-render
    pub kind: ExportKind,
    /// Lip-synchronized video requested
    pub lipsync: bool,
    /// Watermarked render requested
    pub watermark: bool,
    /// Render priority
    pub priority: ExportPriority,
    /// Last server-reported status
    pub status: ExportStatus,
    /// Free-text detail attached to the current status
    pub status_detail: Option<String>,
    /// Output files (only once completed)
    pub artifacts: Option<ExportArtifacts>,
    /// Server-side failure description (only once failed)
    pub failure_reason: Option<String>,
    /// When the export was ordered locally
    pub created_at: i64,
    /// When the service acknowledged creation
    pub acknowledged_at: i64,
    /// When a terminal status was entered
    pub completed_at: Option<i64>,
}

impl Export {
    /// Apply one status report from the remote service
    ///
    /// This is the only way an export changes status. Reports against a
    /// terminal export and regressions are discarded as [`StatusApplied::Ignored`];
    /// unusable reports (unrecognized status token, completion without a
    /// translated video) force the export to `Failed` with the diagnostic
    /// preserved in the status detail.
    pub fn apply_status(&mut self, report: &ExportStatusResponse) -> StatusApplied {
        if self.status.is_terminal() {
            return StatusApplied::Ignored {
                current: self.status,
            };
        }

        let next = match report.status.parse::<ExportStatus>() {
            Ok(next) => next,
            Err(_) => {
                let error = ExportError::UnknownStatus {
                    value: report.status.clone(),
                };
                return self.mark_failed(error.to_string());
            }
        };

        if next == self.status {
            if report.status_detail.is_some() {
                self.status_detail = report.status_detail.clone();
            }
            return StatusApplied::Unchanged;
        }

        if self.validate_transition(next).is_err() {
            // Stale or reordered report; the local view stays ahead
            return StatusApplied::Ignored {
                current: self.status,
            };
        }

        let from = self.status;
        match next {
            ExportStatus::Completed => {
                let artifacts = report.artifacts.clone().unwrap_or_default();
                if !artifacts.has_primary_video() {
                    let error = ExportError::IncompleteArtifact {
                        export_id: self.id.to_string(),
                    };
                    return self.mark_failed(error.to_string());
                }
                self.status = ExportStatus::Completed;
                self.status_detail = report.status_detail.clone();
                self.artifacts = Some(artifacts.clone());
                self.completed_at = Some(current_timestamp());
                StatusApplied::Terminal {
                    outcome: ExportOutcome::Completed {
                        export_id: self.id.clone(),
                        artifacts,
                    },
                }
            }
            ExportStatus::Failed => {
                self.status = ExportStatus::Failed;
                self.status_detail = report.status_detail.clone();
                self.failure_reason = report.failure_reason.clone();
                self.completed_at = Some(current_timestamp());
                StatusApplied::Terminal {
                    outcome: ExportOutcome::Failed {
                        export_id: self.id.clone(),
                        detail: self.failure_detail(),
                    },
                }
            }
            ExportStatus::Pending | ExportStatus::Processing => {
                self.status = next;
                self.status_detail = report.status_detail.clone();
                StatusApplied::Advanced { from, to: next }
            }
        }
    }

    /// Force the export to `Failed` with a locally produced diagnostic
    ///
    /// Used when a poll response is unusable or a status check fails
    /// permanently. No-op against an already terminal export.
    pub fn mark_failed(&mut self, detail: impl Into<String>) -> StatusApplied {
        if self.status.is_terminal() {
            return StatusApplied::Ignored {
                current: self.status,
            };
        }

        let detail = detail.into();
        self.status = ExportStatus::Failed;
        self.status_detail = Some(detail.clone());
        self.completed_at = Some(current_timestamp());
        StatusApplied::Terminal {
            outcome: ExportOutcome::Failed {
                export_id: self.id.clone(),
                detail,
            },
        }
    }

    /// Terminal outcome of this export, if it has reached one
    pub fn outcome(&self) -> Option<ExportOutcome> {
        match self.status {
            ExportStatus::Completed => Some(ExportOutcome::Completed {
                export_id: self.id.clone(),
                artifacts: self.artifacts.clone().unwrap_or_default(),
            }),
            ExportStatus::Failed => Some(ExportOutcome::Failed {
                export_id: self.id.clone(),
                detail: self.failure_detail(),
            }),
            _ => None,
        }
    }

    /// Best available failure description for awaiters
    fn failure_detail(&self) -> String {
        self.failure_reason
            .clone()
            .or_else(|| self.status_detail.clone())
            .unwrap_or_else(|| "export failed without server detail".to_string())
    }

    /// Validate a status transition
    fn validate_transition(&self, to: ExportStatus) -> Result<()> {
        let valid = match (self.status, to) {
            // From Pending
            (ExportStatus::Pending, ExportStatus::Pending) => true,
            (ExportStatus::Pending, ExportStatus::Processing) => true,
            (ExportStatus::Pending, ExportStatus::Completed) => true,
            (ExportStatus::Pending, ExportStatus::Failed) => true,

            // From Processing (never back to Pending)
            (ExportStatus::Processing, ExportStatus::Processing) => true,
            (ExportStatus::Processing, ExportStatus::Completed) => true,
            (ExportStatus::Processing, ExportStatus::Failed) => true,

            // Terminal states cannot transition
            (ExportStatus::Completed, _) => false,
            (ExportStatus::Failed, _) => false,

            // All other transitions are invalid
            _ => false,
        };

        if !valid {
            return Err(ExportError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("cannot transition from {} to {}", self.status, to),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use service_traits::ExportKind;

    fn acknowledged_export() -> Export {
        ExportRequest::new(ProjectId::new("proj-1"), "en", ExportKind::InitialExport)
            .acknowledge(ExportId::new("exp-1"))
    }

    fn report(status: &str) -> ExportStatusResponse {
        ExportStatusResponse {
            status: status.to_string(),
            status_detail: None,
            artifacts: None,
            failure_reason: None,
        }
    }

    fn completed_report(video_url: &str) -> ExportStatusResponse {
        ExportStatusResponse {
            status: "COMPLETED".to_string(),
            status_detail: None,
            artifacts: Some(ExportArtifacts {
                video_no_lipsync: Some(video_url.to_string()),
                ..Default::default()
            }),
            failure_reason: None,
        }
    }

    #[test]
    fn test_acknowledge_starts_pending() {
        let request = ExportRequest::new(ProjectId::new("proj-1"), "en", ExportKind::InitialExport);
        assert!(!request.lipsync);
        assert_eq!(request.priority, ExportPriority::Normal);

        let export = request.acknowledge(ExportId::new("exp-1"));
        assert_eq!(export.status, ExportStatus::Pending);
        assert_eq!(export.id.as_str(), "exp-1");
        assert!(export.artifacts.is_none());
        assert!(export.completed_at.is_none());
        assert!(export.acknowledged_at >= export.created_at);
    }

    #[test]
    fn test_apply_advances_through_lifecycle() {
        let mut export = acknowledged_export();

        let applied = export.apply_status(&report("PROCESSING"));
        assert_eq!(
            applied,
            StatusApplied::Advanced {
                from: ExportStatus::Pending,
                to: ExportStatus::Processing,
            }
        );

        let applied = export.apply_status(&completed_report("https://x/out.mp4"));
        match applied {
            StatusApplied::Terminal {
                outcome: ExportOutcome::Completed { artifacts, .. },
            } => {
                assert_eq!(artifacts.video_no_lipsync.as_deref(), Some("https://x/out.mp4"));
            }
            other => panic!("expected completed terminal, got {other:?}"),
        }
        assert_eq!(export.status, ExportStatus::Completed);
        assert!(export.completed_at.is_some());
    }

    #[test]
    fn test_pending_can_jump_straight_to_completed() {
        let mut export = acknowledged_export();
        let applied = export.apply_status(&completed_report("https://x/out.mp4"));
        assert!(matches!(applied, StatusApplied::Terminal { .. }));
        assert_eq!(export.status, ExportStatus::Completed);
    }

    #[test]
    fn test_same_status_is_unchanged_and_refreshes_detail() {
        let mut export = acknowledged_export();

        let mut observation = report("PENDING");
        observation.status_detail = Some("queued at position 7".to_string());

        assert_eq!(export.apply_status(&observation), StatusApplied::Unchanged);
        assert_eq!(export.status, ExportStatus::Pending);
        assert_eq!(export.status_detail.as_deref(), Some("queued at position 7"));

        // A detail-less repeat does not erase the previous detail
        assert_eq!(export.apply_status(&report("PENDING")), StatusApplied::Unchanged);
        assert_eq!(export.status_detail.as_deref(), Some("queued at position 7"));
    }

    #[test]
    fn test_regression_is_ignored() {
        let mut export = acknowledged_export();
        export.apply_status(&report("PROCESSING"));

        let applied = export.apply_status(&report("PENDING"));
        assert_eq!(
            applied,
            StatusApplied::Ignored {
                current: ExportStatus::Processing,
            }
        );
        assert_eq!(export.status, ExportStatus::Processing);
    }

    #[test]
    fn test_terminal_accepts_no_further_reports() {
        let mut export = acknowledged_export();
        export.apply_status(&completed_report("https://x/out.mp4"));

        let applied = export.apply_status(&report("PROCESSING"));
        assert_eq!(
            applied,
            StatusApplied::Ignored {
                current: ExportStatus::Completed,
            }
        );
        assert_eq!(export.status, ExportStatus::Completed);

        // mark_failed cannot overwrite a terminal state either
        let applied = export.mark_failed("late failure");
        assert_eq!(
            applied,
            StatusApplied::Ignored {
                current: ExportStatus::Completed,
            }
        );
        assert_eq!(export.status, ExportStatus::Completed);
    }

    #[test]
    fn test_unknown_status_fails_with_token_preserved() {
        let mut export = acknowledged_export();

        let applied = export.apply_status(&report("ARCHIVED"));
        match applied {
            StatusApplied::Terminal {
                outcome: ExportOutcome::Failed { detail, .. },
            } => assert!(detail.contains("ARCHIVED")),
            other => panic!("expected failed terminal, got {other:?}"),
        }
        assert_eq!(export.status, ExportStatus::Failed);
        assert!(export
            .status_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("ARCHIVED")));
    }

    #[test]
    fn test_completed_without_video_fails() {
        let mut export = acknowledged_export();

        let mut observation = report("COMPLETED");
        observation.artifacts = Some(ExportArtifacts {
            subtitle_translated: Some("https://x/out.srt".to_string()),
            ..Default::default()
        });

        let applied = export.apply_status(&observation);
        assert!(matches!(
            applied,
            StatusApplied::Terminal {
                outcome: ExportOutcome::Failed { .. },
            }
        ));
        assert_eq!(export.status, ExportStatus::Failed);
        assert!(export.artifacts.is_none());
    }

    #[test]
    fn test_failed_preserves_server_reason() {
        let mut export = acknowledged_export();

        let mut observation = report("FAILED");
        observation.failure_reason = Some("voice cloning rejected".to_string());

        let applied = export.apply_status(&observation);
        match applied {
            StatusApplied::Terminal {
                outcome: ExportOutcome::Failed { detail, .. },
            } => assert_eq!(detail, "voice cloning rejected"),
            other => panic!("expected failed terminal, got {other:?}"),
        }
        assert_eq!(export.failure_reason.as_deref(), Some("voice cloning rejected"));
    }

    #[test]
    fn test_outcome_snapshot() {
        let mut export = acknowledged_export();
        assert!(export.outcome().is_none());

        export.apply_status(&completed_report("https://x/out.mp4"));
        match export.outcome() {
            Some(ExportOutcome::Completed { artifacts, .. }) => {
                assert!(artifacts.has_primary_video());
            }
            other => panic!("expected completed outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_status_sequence_is_monotonic() {
        // Feed a shuffled mix of reports; observed statuses never regress
        let reports = [
            "PENDING",
            "PROCESSING",
            "PENDING",
            "PROCESSING",
            "COMPLETED",
            "PROCESSING",
            "PENDING",
        ];

        let mut export = acknowledged_export();
        let mut observed = vec![export.status];

        for status in reports {
            let response = if status == "COMPLETED" {
                completed_report("https://x/out.mp4")
            } else {
                report(status)
            };
            export.apply_status(&response);
            observed.push(export.status);
        }

        let rank = |status: ExportStatus| match status {
            ExportStatus::Pending => 0,
            ExportStatus::Processing => 1,
            ExportStatus::Completed | ExportStatus::Failed => 2,
        };
        for pair in observed.windows(2) {
            assert!(rank(pair[0]) <= rank(pair[1]), "regressed: {observed:?}");
        }
        assert_eq!(export.status, ExportStatus::Completed);
    }
}
