use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Result, StoreError, Workspace, WorkspaceStore};

/// File holding the name of the workspace used when none is given
const CURRENT_POINTER: &str = ".workspace_config";
const DB_EXTENSION: &str = "db";

/// All workspaces living under one root directory
///
/// Each workspace is `<root>/<name>.db`. The root is passed in explicitly so
/// several registries can coexist in one process (tests do this a lot).
#[derive(Debug, Clone)]
pub struct WorkspaceRegistry {
    root: PathBuf,
}

impl WorkspaceRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn db_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, DB_EXTENSION))
    }

    /// Create a new, empty workspace and make it the current one
    pub fn define(&self, name: &str) -> Result<Workspace> {
        validate_name(name)?;

        let path = self.db_path(name);
        if path.exists() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        std::fs::create_dir_all(&self.root)?;

        let created_at = Utc::now();
        WorkspaceStore::create(&path, name, created_at)?;
        self.set_current(name)?;

        info!("Defined workspace '{}' at {}", name, path.display());

        Ok(Workspace {
            name: name.to_string(),
            path,
            created_at,
        })
    }

    /// Find a workspace by name, or fall back to the current one
    pub fn resolve(&self, name: Option<&str>) -> Result<Workspace> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.current()?.ok_or_else(|| {
                StoreError::NotFound(
                    "no workspace selected, define one with --define-workspace".to_string(),
                )
            })?,
        };

        validate_name(&name).map_err(|_| StoreError::NotFound(name.clone()))?;

        let path = self.db_path(&name);
        if !path.exists() {
            return Err(StoreError::NotFound(name));
        }

        self.load(&name, path)
    }

    /// Every workspace under the root, sorted by name
    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut workspaces = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DB_EXTENSION) {
                continue;
            }

            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            match self.load(&name, path.clone()) {
                Ok(workspace) => workspaces.push(workspace),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        workspaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workspaces)
    }

    pub fn open(&self, workspace: &Workspace) -> Result<WorkspaceStore> {
        WorkspaceStore::open(&workspace.path)
    }

    /// Name stored in the current-workspace pointer, if any
    pub fn current(&self) -> Result<Option<String>> {
        let pointer = self.root.join(CURRENT_POINTER);
        if !pointer.exists() {
            return Ok(None);
        }

        let name = std::fs::read_to_string(pointer)?.trim().to_string();
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    fn set_current(&self, name: &str) -> Result<()> {
        std::fs::write(self.root.join(CURRENT_POINTER), name)?;
        Ok(())
    }

    fn load(&self, name: &str, path: PathBuf) -> Result<Workspace> {
        let store = WorkspaceStore::open(&path)?;

        // Databases created by hand have no metadata row; treat them as
        // created whenever we first see them
        let (name, created_at) = store
            .metadata()?
            .unwrap_or_else(|| (name.to_string(), Utc::now()));

        Ok(Workspace {
            name,
            path,
            created_at,
        })
    }
}

/// Workspace names become file names, so keep them boring
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
