use crate::error::StartupError;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_STYLES: usize = 10;

/// A named system prompt. The name doubles as the tab label and lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub name: String,
    pub prompt: String,
}

impl Style {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

pub trait StyleLoader {
    /// At most [`MAX_STYLES`] styles, sorted by name. Never empty on success.
    fn load(&self) -> Result<Vec<Style>, StartupError>;
}

/// Loads one style per file in a directory: file stem as name, contents as
/// prompt. Hidden and blank files are skipped.
#[derive(Debug, Clone)]
pub struct DirStyleLoader {
    dir: PathBuf,
}

impl DirStyleLoader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl StyleLoader for DirStyleLoader {
    fn load(&self) -> Result<Vec<Style>, StartupError> {
        let no_styles = || StartupError::NoStylesFound(self.dir.display().to_string());
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Err(no_styles()),
            Err(error) => return Err(error.into()),
        };

        let mut styles = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if name.is_empty() || name.starts_with('.') {
                continue;
            }
            let prompt = match fs::read_to_string(&path) {
                Ok(prompt) => prompt,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable style");
                    continue;
                }
            };
            if prompt.trim().is_empty() {
                continue;
            }
            styles.push(Style::new(name, prompt));
        }

        styles.sort_by(|a, b| a.name.cmp(&b.name));
        styles.dedup_by(|a, b| a.name == b.name);
        if styles.len() > MAX_STYLES {
            tracing::warn!(
                found = styles.len(),
                kept = MAX_STYLES,
                "too many styles; keeping the first alphabetically"
            );
            styles.truncate(MAX_STYLES);
        }
        if styles.is_empty() {
            return Err(no_styles());
        }
        Ok(styles)
    }
}
