//! Named presets stored as JSON files in a directory.

use std::path::{Path, PathBuf};
use tracing::debug;
use crate::core::{ActionQueue, SerializableQueue};
use crate::utils::{EngineError, EngineResult};

const PRESET_EXTENSION: &str = "json";

/// Directory-backed preset persistence.
#[derive(Debug, Clone)]
pub struct PresetStore {
    root: PathBuf,
}

impl PresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> EngineResult<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(EngineError::preset(format!("Invalid preset name: {name:?}")));
        }
        Ok(self.root.join(format!("{name}.{PRESET_EXTENSION}")))
    }

    /// Saves `queue` under `name`, replacing any preset with that name
    pub fn save(&self, name: &str, queue: &ActionQueue) -> EngineResult<PathBuf> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.root)?;
        let mut data = queue.to_serializable();
        data.name = Some(name.to_string());
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| EngineError::preset(format!("Failed to serialize preset: {e}")))?;
        std::fs::write(&path, json)?;
        debug!("Saved preset '{}' with {} actions", name, queue.len());
        Ok(path)
    }

    /// Loads the preset called `name`
    pub fn load(&self, name: &str) -> EngineResult<ActionQueue> {
        load_preset_file(&self.path_for(name)?)
    }

    /// Names of all stored presets, sorted
    pub fn list(&self) -> EngineResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(PRESET_EXTENSION))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> EngineResult<()> {
        std::fs::remove_file(self.path_for(name)?)?;
        Ok(())
    }
}

/// Reads a preset file from an arbitrary path
pub fn load_preset_file(path: &Path) -> EngineResult<ActionQueue> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::preset(format!("Failed to read preset {:?}: {}", path, e)))?;
    let data: SerializableQueue = serde_json::from_str(&content)
        .map_err(|e| EngineError::preset(format!("Failed to parse preset {:?}: {}", path, e)))?;
    Ok(ActionQueue::from_serializable(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Action, ActionKind};

    #[test]
    fn save_list_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path().join("presets"));
        let mut queue = ActionQueue::new();
        queue.push(Action::new(ActionKind::Rotate { degrees: 90 }).unwrap());

        store.save("rotate only", &queue).unwrap();
        assert_eq!(store.list().unwrap(), vec!["rotate only".to_string()]);

        let loaded = store.load("rotate only").unwrap();
        assert_eq!(loaded.name(), Some("rotate only"));
        assert_eq!(loaded.actions(), queue.actions());

        store.delete("rotate only").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn tampered_presets_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"version":1,"actions":[{"kind":{"type":"rotate","degrees":33}}]}"#,
        )
        .unwrap();
        assert!(matches!(load_preset_file(&path), Err(EngineError::Preset(_))));
    }

    #[test]
    fn names_cannot_escape_the_store() {
        let store = PresetStore::new("/tmp/presets");
        assert!(store.load("../etc/passwd").is_err());
    }
}
