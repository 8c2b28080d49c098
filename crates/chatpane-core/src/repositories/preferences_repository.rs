use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::conversation_repository::BoxFuture;
use super::error::{RepositoryError, RepositoryResult};
use crate::models::Preferences;

/// Storage for UI preferences.
pub trait PreferencesRepository: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Preferences>>;
    fn save(&self, preferences: Preferences) -> BoxFuture<'static, RepositoryResult<()>>;
}

/// Preferences kept in a JSON object of string keys to string values.
pub struct PreferencesJsonRepository {
    file_path: PathBuf,
}

impl PreferencesJsonRepository {
    /// Repository under the platform config directory
    pub fn new() -> RepositoryResult<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepositoryError::InitializationError {
            message: "Cannot determine config directory".into(),
        })?;

        Ok(Self::at(config_dir.join("chatpane").join("preferences.json")))
    }

    pub fn at(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl PreferencesRepository for PreferencesJsonRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Preferences>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&path).await? {
                debug!(path = %path.display(), "No preferences file, using defaults");
                return Ok(Preferences::default());
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let entries: BTreeMap<String, String> = serde_json::from_str(&contents)?;
            Ok(Preferences::from_entries(&entries))
        })
    }

    fn save(&self, preferences: Preferences) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let json = serde_json::to_string_pretty(&preferences.to_entries())?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, &json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPreferencesRepository {
    stored: Arc<Mutex<Option<Preferences>>>,
}

impl InMemoryPreferencesRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferencesRepository for InMemoryPreferencesRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Preferences>> {
        let stored = self.stored.lock().clone().unwrap_or_default();
        Box::pin(async move { Ok(stored) })
    }

    fn save(&self, preferences: Preferences) -> BoxFuture<'static, RepositoryResult<()>> {
        *self.stored.lock() = Some(preferences);
        Box::pin(async { Ok(()) })
    }
}
