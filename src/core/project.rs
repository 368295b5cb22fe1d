//! Project discovery
//!
//! A project is a directory containing `.eb/`, which holds the SQLite
//! database and the project config.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PROJECT_DIR: &str = ".eb";
const DATABASE_FILE: &str = "eb.db";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not inside an eb project (no .eb directory found from {0})")]
    NotFound(PathBuf),

    #[error("Project already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the project containing the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        Self::discover_from(&std::env::current_dir()?)
    }

    /// Walk up from `start` looking for `.eb/`
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        start
            .ancestors()
            .find(|dir| dir.join(PROJECT_DIR).is_dir())
            .map(|root| Self {
                root: root.to_path_buf(),
            })
            .ok_or_else(|| ProjectError::NotFound(start.to_path_buf()))
    }

    /// Create `.eb/` with an empty config under `root`
    pub fn init(root: &Path) -> Result<Self, ProjectError> {
        let dir = root.join(PROJECT_DIR);
        if dir.is_dir() {
            return Err(ProjectError::AlreadyExists(root.to_path_buf()));
        }
        fs::create_dir_all(&dir)?;
        fs::write(
            dir.join(CONFIG_FILE),
            "# Entity Builder project configuration\n# server_url: http://localhost:3000\n# super_roles: [admin]\n# default_tenant: main\n# user: alice\n",
        )?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn eb_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn database_path(&self) -> PathBuf {
        self.eb_dir().join(DATABASE_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.eb_dir().join(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_and_discover_from_subdir() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        assert!(project.config_path().exists());

        let nested = tmp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let found = Project::discover_from(&nested).unwrap();
        assert_eq!(found.root(), tmp.path());
        assert_eq!(found.database_path(), tmp.path().join(".eb/eb.db"));
    }

    #[test]
    fn test_init_twice_fails() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();
        assert!(matches!(
            Project::init(tmp.path()),
            Err(ProjectError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_discover_outside_project() {
        let tmp = tempdir().unwrap();
        assert!(matches!(
            Project::discover_from(tmp.path()),
            Err(ProjectError::NotFound(_))
        ));
    }
}
