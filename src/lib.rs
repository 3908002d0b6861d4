//! Workspace umbrella crate.
//!
//! Host applications can depend on `vtc-workspace` to pull the whole video
//! translation stack through a single dependency: [`core_export`] carries the
//! orchestrator, status poller, and entity store, while [`service_traits`]
//! carries the wire-level contract a remote service adapter implements.

pub use core_export;
pub use service_traits;
