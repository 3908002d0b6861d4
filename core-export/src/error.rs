use service_traits::ServiceError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("Unsupported file extension for {file_name}, expected .mp4 or .webm")]
    InvalidFileExtension { file_name: String },

    #[error("Project {project_id} has {count} script(s) with audio out of sync")]
    ScriptsOutOfSync { project_id: String, count: usize },

    #[error("Project {project_id} not found")]
    ProjectNotFound { project_id: String },

    #[error("Script {script_id} not found")]
    ScriptNotFound { script_id: String },

    #[error("Export {export_id} not found")]
    ExportNotFound { export_id: String },

    #[error("Service rejected the request with HTTP {status}: {message}")]
    BadRequest { status: u16, message: String },

    #[error("Authentication failed with HTTP {status}: {message}")]
    AuthFailure { status: u16, message: String },

    #[error("Service unavailable after {attempts} attempt(s): {message}")]
    RemoteUnavailable { attempts: u32, message: String },

    #[error("Server reported unrecognized status: {value}")]
    UnknownStatus { value: String },

    #[error("Export {export_id} completed without a translated video artifact")]
    IncompleteArtifact { export_id: String },

    #[error("Export {export_id} still running after {waited_secs} seconds of polling")]
    PollTimeout { export_id: String, waited_secs: u64 },

    #[error("Invalid status transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Tracking for export {export_id} was cancelled")]
    TrackingCancelled { export_id: String },

    #[error("Orchestrator is shutting down")]
    Shutdown,

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl ExportError {
    /// Classify a service adapter error into the variant the caller acts on
    pub(crate) fn from_service(error: ServiceError, attempts: u32) -> Self {
        match error {
            ServiceError::Http { status, message } if matches!(status, 401 | 403) => {
                ExportError::AuthFailure { status, message }
            }
            ServiceError::Http { status, message } if error_is_transient_status(status) => {
                ExportError::RemoteUnavailable {
                    attempts,
                    message: format!("HTTP {status}: {message}"),
                }
            }
            ServiceError::Http { status, message } => ExportError::BadRequest { status, message },
            ServiceError::Network(message) => ExportError::RemoteUnavailable { attempts, message },
            ServiceError::UnknownToken(value) => ExportError::UnknownStatus { value },
        }
    }
}

fn error_is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub type Result<T> = std::result::Result<T, ExportError>;
