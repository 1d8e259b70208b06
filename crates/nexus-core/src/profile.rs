//! Profile store — named YAML configuration profiles under `~/.nexus`.
//!
//! A profile is `~/.nexus/profiles/<name>.yaml`; the currently selected
//! profile name lives in the `~/.nexus/active_profile` marker file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NexusError, Result};

pub const ACTIVE_PROFILE_FILE: &str = "active_profile";
pub const PROFILES_DIR: &str = "profiles";
const PROFILE_EXT: &str = "yaml";

pub struct ProfileStore {
    base_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store rooted at `$HOME/.nexus` (falling back to the current directory
    /// when `$HOME` is unset, e.g. in containers).
    pub fn from_home() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self::new(Path::new(&home).join(".nexus"))
    }

    fn marker_path(&self) -> PathBuf {
        self.base_dir.join(ACTIVE_PROFILE_FILE)
    }

    fn profiles_dir(&self) -> PathBuf {
        self.base_dir.join(PROFILES_DIR)
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.{PROFILE_EXT}"))
    }

    /// Name of the active profile, if a marker exists. The stored value is
    /// trimmed, so a trailing newline in the marker is harmless.
    pub fn active(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.marker_path()) {
            Ok(raw) => {
                let name = raw.trim().to_string();
                Ok(if name.is_empty() { None } else { Some(name) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark `name` as the active profile (trimmed name plus trailing newline).
    pub fn set_active(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NexusError::InvalidInput("profile name is empty".into()));
        }
        fs::create_dir_all(&self.base_dir)?;
        fs::write(self.marker_path(), format!("{name}\n"))?;
        Ok(())
    }

    /// Lexicographically sorted profile names with the `.yaml` extension
    /// stripped. Directories and files with other extensions are ignored.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.profiles_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a profile's YAML document.
    pub fn load(&self, name: &str) -> Result<serde_yaml::Value> {
        let path = self.profile_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NexusError::NotFound(format!("profile '{name}'")));
            }
            Err(e) => return Err(e.into()),
        };
        serde_yaml::from_str(&raw)
            .map_err(|e| NexusError::Corrupt(format!("profile '{name}': {e}")))
    }

    /// Save a profile's YAML document, creating the profiles directory.
    pub fn save(&self, name: &str, value: &serde_yaml::Value) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NexusError::InvalidInput("profile name is empty".into()));
        }
        fs::create_dir_all(self.profiles_dir())?;
        let yaml = serde_yaml::to_string(value)
            .map_err(|e| NexusError::Corrupt(format!("profile '{name}': {e}")))?;
        fs::write(self.profile_path(name), yaml)?;
        Ok(())
    }
}
