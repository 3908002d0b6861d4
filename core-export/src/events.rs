//! # Event Bus System
//!
//! Event-driven notifications for the translation core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus decouples the poller and orchestrator from whoever wants to
//! observe export progress:
//! - **Event Types**: typed enum hierarchy split by domain (exports, scripts)
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: wrapper for consuming events with filtering
//! - **Subscription Management**: any number of independent subscribers
//!
//! `await_completion` is itself just a subscriber: it filters the stream down
//! to one export id and waits for a terminal event.
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_export::events::{EventBus, TranslationEvent, ScriptEvent};
//!
//! let event_bus = EventBus::new(100);
//! let event = TranslationEvent::Script(ScriptEvent::TextUpdated {
//!     script_id: "scr-1".to_string(),
//! });
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```no_run
//! use core_export::events::{EventBus, RecvError};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match subscriber.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => eprintln!("Missed {} events", n),
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `tokio::sync::broadcast` produces two receive errors:
//!
//! - **`RecvError::Lagged(n)`**: the subscriber was too slow and missed `n`
//!   events. Non-fatal; receiving continues with newer events.
//! - **`RecvError::Closed`**: all senders dropped. Treat as shutdown.
//!
//! Emission to a bus with no subscribers returns an error; emitters that do
//! not care (the poller, mostly) call `.ok()` on the result.

use serde::{Deserialize, Serialize};
use service_traits::{ExportArtifacts, ExportKind, ExportStatus};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall further behind than this receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the type published and received through the event bus. It wraps
/// domain-specific event types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum TranslationEvent {
    /// Export lifecycle events
    Export(ExportEvent),
    /// Script proofreading events
    Script(ScriptEvent),
}

impl TranslationEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            TranslationEvent::Export(e) => e.description(),
            TranslationEvent::Script(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            TranslationEvent::Export(ExportEvent::Failed { .. }) => EventSeverity::Error,
            TranslationEvent::Script(ScriptEvent::AudioRegenerationFailed { .. }) => {
                EventSeverity::Error
            }
            TranslationEvent::Export(ExportEvent::TimedOut { .. }) => EventSeverity::Warning,
            TranslationEvent::Export(ExportEvent::Submitted { .. }) => EventSeverity::Info,
            TranslationEvent::Export(ExportEvent::Completed { .. }) => EventSeverity::Info,
            TranslationEvent::Script(ScriptEvent::AudioRegenerated { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Export Events
// ============================================================================

/// Events covering the lifecycle of export jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ExportEvent {
    /// Export acknowledged by the service and registered for tracking.
    Submitted {
        /// The export job ID.
        export_id: String,
        /// The project being exported.
        project_id: String,
        /// Target language of the render.
        target_language: String,
        /// First render or proofread re-render.
        kind: ExportKind,
    },
    /// A poll applied a forward status transition.
    StatusChanged {
        /// The export job ID.
        export_id: String,
        /// Status before the transition.
        from: ExportStatus,
        /// Status after the transition.
        to: ExportStatus,
    },
    /// Export finished and produced artifacts.
    Completed {
        /// The export job ID.
        export_id: String,
        /// Output file URLs.
        artifacts: ExportArtifacts,
    },
    /// Export failed, server-side or through an unusable server response.
    Failed {
        /// The export job ID.
        export_id: String,
        /// Failure description.
        detail: String,
    },
    /// Export tracked past the maximum total wait; the remote job may still
    /// be running, only local tracking stopped.
    TimedOut {
        /// The export job ID.
        export_id: String,
        /// How long the export was tracked, in seconds.
        waited_secs: u64,
    },
    /// Tracking was withdrawn before a terminal status was observed.
    TrackingCancelled {
        /// The export job ID.
        export_id: String,
    },
}

impl ExportEvent {
    fn description(&self) -> &str {
        match self {
            ExportEvent::Submitted { .. } => "Export submitted",
            ExportEvent::StatusChanged { .. } => "Export status changed",
            ExportEvent::Completed { .. } => "Export completed",
            ExportEvent::Failed { .. } => "Export failed",
            ExportEvent::TimedOut { .. } => "Export polling timed out",
            ExportEvent::TrackingCancelled { .. } => "Export tracking cancelled",
        }
    }

    /// The export id this event concerns.
    pub fn export_id(&self) -> &str {
        match self {
            ExportEvent::Submitted { export_id, .. } => export_id,
            ExportEvent::StatusChanged { export_id, .. } => export_id,
            ExportEvent::Completed { export_id, .. } => export_id,
            ExportEvent::Failed { export_id, .. } => export_id,
            ExportEvent::TimedOut { export_id, .. } => export_id,
            ExportEvent::TrackingCancelled { export_id } => export_id,
        }
    }
}

// ============================================================================
// Script Events
// ============================================================================

/// Events covering script proofreading and audio regeneration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScriptEvent {
    /// Translated text was edited locally; audio is now out of sync.
    TextUpdated {
        /// The script ID.
        script_id: String,
    },
    /// Dubbed audio was regenerated to match the current text.
    AudioRegenerated {
        /// The script ID.
        script_id: String,
    },
    /// Pushing text or regenerating audio failed; audio stays out of sync.
    AudioRegenerationFailed {
        /// The script ID.
        script_id: String,
        /// Human-readable error message.
        message: String,
    },
}

impl ScriptEvent {
    fn description(&self) -> &str {
        match self {
            ScriptEvent::TextUpdated { .. } => "Script text updated",
            ScriptEvent::AudioRegenerated { .. } => "Script audio regenerated",
            ScriptEvent::AudioRegenerationFailed { .. } => "Script audio regeneration failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TranslationEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events buffered per subscriber.
    ///   A subscriber falling further behind receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: TranslationEvent) -> Result<usize, SendError<TranslationEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<TranslationEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&TranslationEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// # Example
///
/// ```rust
/// use core_export::events::{EventBus, EventStream, TranslationEvent};
///
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, TranslationEvent::Export(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<TranslationEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<TranslationEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TranslationEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events, `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<TranslationEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<TranslationEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
