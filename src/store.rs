use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Remembers the last selected style between runs. Persistence is
/// best-effort: failures are logged, never raised.
pub trait SessionStore: Send {
    /// The last saved style name, or an empty string.
    fn load(&self) -> String;
    fn save(&self, style_name: &str);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    last_style: String,
}

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn write(&self, style_name: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&SessionFile {
            last_style: style_name.to_string(),
        })?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> String {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::debug!(path = %self.path.display(), %error, "no saved session");
                return String::new();
            }
        };
        match serde_json::from_str::<SessionFile>(&raw) {
            Ok(file) => file.last_style,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "ignoring unreadable session file");
                String::new()
            }
        }
    }

    fn save(&self, style_name: &str) {
        if let Err(error) = self.write(style_name) {
            tracing::warn!(path = %self.path.display(), %error, "could not save session");
        }
    }
}

/// In-memory store; clones share the saved name.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    last_style: Arc<Mutex<String>>,
}

impl MemorySessionStore {
    pub fn with_last_style(name: impl Into<String>) -> Self {
        Self {
            last_style: Arc::new(Mutex::new(name.into())),
        }
    }

    pub fn last_style(&self) -> String {
        self.load()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> String {
        self.last_style
            .lock()
            .map(|name| name.clone())
            .unwrap_or_default()
    }

    fn save(&self, style_name: &str) {
        if let Ok(mut name) = self.last_style.lock() {
            *name = style_name.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trips_last_style() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));

        assert_eq!(store.load(), "");
        store.save("casual");
        assert_eq!(store.load(), "casual");
        assert_eq!(FileSessionStore::new(dir.path().join("nested/session.json")).load(), "casual");
    }

    #[test]
    fn test_file_store_treats_garbage_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        assert_eq!(FileSessionStore::new(&path).load(), "");
    }

    #[test]
    fn test_file_store_save_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        FileSessionStore::new(blocker.join("session.json")).save("formal");
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemorySessionStore::with_last_style("terse");
        let clone = store.clone();
        clone.save("formal");
        assert_eq!(store.last_style(), "formal");
    }
}
