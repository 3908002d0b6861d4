//! # Entity Store
//!
//! In-memory ownership of all Project, Script, and Export entities.
//!
//! ## Overview
//!
//! The store is the single owner of entity instances; the orchestrator and
//! poller hold only ids and read cloned snapshots. Every entity sits behind
//! its own async mutex inside a sharded map, so writes to one entity never
//! block writes to another, and no two mutations of the same export can
//! interleave. Mutations run as closures under the per-id lock via
//! [`EntityStore::update_export`] / [`EntityStore::update_script`].
//!
//! Lock order is always map lock before entry lock, and update closures are
//! synchronous, so entry locks are never held across awaits.

use crate::export::{Export, ExportId};
use crate::project::{Project, ProjectId, Script, ScriptId};
use crate::{ExportError, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type Shard<K, V> = RwLock<HashMap<K, Arc<Mutex<V>>>>;

/// In-memory entity store with per-id write serialization
#[derive(Debug, Default)]
pub struct EntityStore {
    projects: Shard<ProjectId, Project>,
    scripts: Shard<ScriptId, Script>,
    exports: Shard<ExportId, Export>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Insert or replace a project
    ///
    /// Replacing keeps the existing per-id lock, so updates queued behind it
    /// still apply to the new value.
    pub async fn put_project(&self, project: Project) {
        let mut projects = self.projects.write().await;
        match projects.entry(project.id.clone()) {
            Entry::Occupied(entry) => {
                *entry.get().lock().await = project;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(project)));
            }
        }
    }

    /// Get a snapshot of a project
    pub async fn get_project(&self, id: &ProjectId) -> Result<Project> {
        let entry = {
            let projects = self.projects.read().await;
            projects.get(id).cloned()
        };
        match entry {
            Some(entry) => Ok(entry.lock().await.clone()),
            None => Err(ExportError::ProjectNotFound {
                project_id: id.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------

    /// Insert a script and append it to its project's ordered index
    ///
    /// Re-attaching an already indexed script replaces its content without
    /// duplicating the index entry, preserving presentation order.
    pub async fn attach_script(&self, script: Script) -> Result<()> {
        let project_entry = {
            let projects = self.projects.read().await;
            projects.get(&script.project_id).cloned()
        };
        let Some(project_entry) = project_entry else {
            return Err(ExportError::ProjectNotFound {
                project_id: script.project_id.to_string(),
            });
        };

        // Index membership and script content change under the project lock
        // so readers never see one without the other
        let mut project = project_entry.lock().await;
        {
            let mut scripts = self.scripts.write().await;
            match scripts.entry(script.id.clone()) {
                Entry::Occupied(entry) => {
                    *entry.get().lock().await = script.clone();
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(Mutex::new(script.clone())));
                }
            }
        }
        if !project.script_ids.contains(&script.id) {
            project.script_ids.push(script.id);
        }
        Ok(())
    }

    /// Get a snapshot of a script
    pub async fn get_script(&self, id: &ScriptId) -> Result<Script> {
        let entry = {
            let scripts = self.scripts.read().await;
            scripts.get(id).cloned()
        };
        match entry {
            Some(entry) => Ok(entry.lock().await.clone()),
            None => Err(ExportError::ScriptNotFound {
                script_id: id.to_string(),
            }),
        }
    }

    /// Mutate a script under its per-id lock
    pub async fn update_script<F, R>(&self, id: &ScriptId, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut Script) -> R,
    {
        let entry = {
            let scripts = self.scripts.read().await;
            scripts.get(id).cloned()
        };
        match entry {
            Some(entry) => {
                let mut script = entry.lock().await;
                Ok(mutate(&mut script))
            }
            None => Err(ExportError::ScriptNotFound {
                script_id: id.to_string(),
            }),
        }
    }

    /// Snapshots of a project's scripts in presentation order
    pub async fn scripts_for_project(&self, project_id: &ProjectId) -> Result<Vec<Script>> {
        let project = self.get_project(project_id).await?;
        let mut scripts = Vec::with_capacity(project.script_ids.len());
        for script_id in &project.script_ids {
            scripts.push(self.get_script(script_id).await?);
        }
        Ok(scripts)
    }

    // ------------------------------------------------------------------
    // Exports
    // ------------------------------------------------------------------

    /// Insert or replace an export
    pub async fn put_export(&self, export: Export) {
        let mut exports = self.exports.write().await;
        match exports.entry(export.id.clone()) {
            Entry::Occupied(entry) => {
                *entry.get().lock().await = export;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(export)));
            }
        }
    }

    /// Get a snapshot of an export
    pub async fn get_export(&self, id: &ExportId) -> Result<Export> {
        let entry = {
            let exports = self.exports.read().await;
            exports.get(id).cloned()
        };
        match entry {
            Some(entry) => Ok(entry.lock().await.clone()),
            None => Err(ExportError::ExportNotFound {
                export_id: id.to_string(),
            }),
        }
    }

    /// Mutate an export under its per-id lock
    ///
    /// All status applications go through here, which is what serializes
    /// concurrent poll results for the same export.
    pub async fn update_export<F, R>(&self, id: &ExportId, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut Export) -> R,
    {
        let entry = {
            let exports = self.exports.read().await;
            exports.get(id).cloned()
        };
        match entry {
            Some(entry) => {
                let mut export = entry.lock().await;
                Ok(mutate(&mut export))
            }
            None => Err(ExportError::ExportNotFound {
                export_id: id.to_string(),
            }),
        }
    }

    /// Ids of all exports whose status is not terminal
    pub async fn list_active_exports(&self) -> Vec<ExportId> {
        let entries: Vec<Arc<Mutex<Export>>> = {
            let exports = self.exports.read().await;
            exports.values().cloned().collect()
        };

        let mut active = Vec::new();
        for entry in entries {
            let export = entry.lock().await;
            if !export.status.is_terminal() {
                active.push(export.id.clone());
            }
        }
        active
    }
}

// ============================================================================
// Tests
// ============================================================================
