use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::LoadError;

use super::ProjectHandle;

/// Shared registry of per-project write locks.
///
/// Handles opened through the same registry for the same project folder
/// share one lock, so their renames run one at a time.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, root: &Path) -> Arc<Mutex<()>> {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key).or_default().clone()
    }

    /// Load a project whose handle shares this registry's lock for its root
    pub fn open(&self, path: &Path) -> Result<ProjectHandle, LoadError> {
        let mut handle = ProjectHandle::open(path)?;
        handle.lock = self.lock_for(handle.root());
        Ok(handle)
    }
}
