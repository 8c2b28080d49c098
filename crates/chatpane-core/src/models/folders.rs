use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::conversation::{DEFAULT_FOLDER, generate_id};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FolderError {
    #[error("Folder name cannot be empty")]
    EmptyName,

    #[error("Folder already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Folder not found: {id}")]
    NotFound { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
        }
    }
}

/// User folders. Conversations refer to folders by name, so renaming here
/// never touches conversations.
#[derive(Debug, Clone, Default)]
pub struct FolderList {
    folders: Vec<Folder>,
}

impl FolderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The folders a fresh session starts with.
    pub fn with_defaults() -> Self {
        Self {
            folders: vec![
                Folder::new(DEFAULT_FOLDER),
                Folder::new("Personal"),
                Folder::new("Code Reviews"),
            ],
        }
    }

    pub fn all(&self) -> &[Folder] {
        &self.folders
    }

    fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        let lowered = name.to_lowercase();
        self.folders
            .iter()
            .filter(|f| Some(f.id.as_str()) != except_id)
            .any(|f| f.name.to_lowercase() == lowered)
    }

    /// Add a folder; names are unique ignoring case.
    pub fn create(&mut self, name: &str) -> Result<&Folder, FolderError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FolderError::EmptyName);
        }
        if self.name_taken(name, None) {
            return Err(FolderError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.folders.push(Folder::new(name));
        Ok(&self.folders[self.folders.len() - 1])
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<&Folder, FolderError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FolderError::EmptyName);
        }
        if self.name_taken(name, Some(id)) {
            return Err(FolderError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let folder = self
            .folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| FolderError::NotFound { id: id.to_string() })?;
        folder.name = name.to_string();
        Ok(folder)
    }
}
