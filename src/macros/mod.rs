//! Stored input macros
//!
//! Flat-file store of named, timestamped input-event sequences used for
//! repositioning. One JSON file per macro; timestamps are seconds relative
//! to macro start and must be non-decreasing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One recorded input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEvent {
    /// Seconds since macro start, non-decreasing across the sequence.
    pub timestamp: f64,
    #[serde(flatten)]
    pub kind: MacroEventKind,
}

/// The input primitive a macro event replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MacroEventKind {
    Move { x: i32, y: i32 },
    Click,
    KeyPress { key: char },
    KeyRelease { key: char },
}

/// A complete stored macro with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroFile {
    pub name: String,
    pub created_date: String,
    /// Total length in seconds (timestamp of the last event).
    pub duration: f64,
    pub event_count: usize,
    pub events: Vec<MacroEvent>,
}

impl MacroFile {
    pub fn new(name: impl Into<String>, events: Vec<MacroEvent>) -> Self {
        let duration = events.last().map(|e| e.timestamp).unwrap_or(0.0);
        Self {
            name: name.into(),
            created_date: Utc::now().to_rfc3339(),
            duration,
            event_count: events.len(),
            events,
        }
    }

    fn validate(&self) -> Result<()> {
        let mut last = 0.0f64;
        for (i, event) in self.events.iter().enumerate() {
            anyhow::ensure!(
                event.timestamp >= last,
                "macro '{}': event {i} timestamp {} precedes {}",
                self.name,
                event.timestamp,
                last
            );
            last = event.timestamp;
        }
        Ok(())
    }
}

/// Listing entry for one stored macro.
#[derive(Debug, Clone)]
pub struct MacroSummary {
    pub name: String,
    pub path: PathBuf,
    pub event_count: usize,
    pub duration: f64,
}

/// Directory-backed macro CRUD.
pub struct MacroStore {
    dir: PathBuf,
}

impl MacroStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create macro directory {dir:?}"))?;
        Ok(Self { dir })
    }

    pub fn list(&self) -> Vec<MacroSummary> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(file) = self.load_path(&path) {
                out.push(MacroSummary {
                    name: file.name,
                    path,
                    event_count: file.event_count,
                    duration: file.duration,
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Load a macro by name.
    pub fn load(&self, name: &str) -> Result<MacroFile> {
        self.load_path(&self.path_for(name))
    }

    pub fn load_path(&self, path: &Path) -> Result<MacroFile> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read macro file {path:?}"))?;
        let file: MacroFile =
            serde_json::from_str(&raw).with_context(|| format!("invalid macro file {path:?}"))?;
        file.validate()?;
        debug!("loaded macro '{}' ({} events)", file.name, file.events.len());
        Ok(file)
    }

    pub fn save(&self, file: &MacroFile) -> Result<PathBuf> {
        file.validate()?;
        let path = self.path_for(&file.name);
        let raw = serde_json::to_string_pretty(file)?;
        fs::write(&path, raw).with_context(|| format!("failed to write macro file {path:?}"))?;
        info!("saved macro '{}' to {path:?}", file.name);
        Ok(path)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        fs::remove_file(&path).with_context(|| format!("failed to delete macro {path:?}"))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_tap(ts: f64, key: char) -> Vec<MacroEvent> {
        vec![
            MacroEvent { timestamp: ts, kind: MacroEventKind::KeyPress { key } },
            MacroEvent { timestamp: ts + 0.05, kind: MacroEventKind::KeyRelease { key } },
        ]
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MacroStore::new(dir.path()).unwrap();

        let mut events = key_tap(0.0, 'w');
        events.push(MacroEvent { timestamp: 0.2, kind: MacroEventKind::Move { x: 10, y: 20 } });
        events.push(MacroEvent { timestamp: 0.3, kind: MacroEventKind::Click });
        let file = MacroFile::new("route-back", events.clone());
        store.save(&file).unwrap();

        let loaded = store.load("route-back").unwrap();
        assert_eq!(loaded.name, "route-back");
        assert_eq!(loaded.events, events);
        assert_eq!(loaded.event_count, 4);
        assert!((loaded.duration - 0.3).abs() < 1e-9);
    }

    #[test]
    fn list_names_stored_macros() {
        let dir = tempfile::tempdir().unwrap();
        let store = MacroStore::new(dir.path()).unwrap();
        store.save(&MacroFile::new("b", key_tap(0.0, 'a'))).unwrap();
        store.save(&MacroFile::new("a", key_tap(0.0, 'a'))).unwrap();
        std::fs::write(dir.path().join("junk.txt"), "x").unwrap();

        let names: Vec<String> = store.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn decreasing_timestamps_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MacroStore::new(dir.path()).unwrap();

        let events = vec![
            MacroEvent { timestamp: 1.0, kind: MacroEventKind::Click },
            MacroEvent { timestamp: 0.5, kind: MacroEventKind::Click },
        ];
        assert!(store.save(&MacroFile::new("bad", events)).is_err());
    }

    #[test]
    fn delete_removes_macro() {
        let dir = tempfile::tempdir().unwrap();
        let store = MacroStore::new(dir.path()).unwrap();
        store.save(&MacroFile::new("gone", key_tap(0.0, 'a'))).unwrap();
        store.delete("gone").unwrap();
        assert!(store.load("gone").is_err());
        assert!(store.delete("gone").is_err());
    }

    #[test]
    fn event_json_shape_is_stable() {
        let e = MacroEvent { timestamp: 1.5, kind: MacroEventKind::KeyPress { key: 'a' } };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "keyPress");
        assert_eq!(json["key"], "a");
        assert_eq!(json["timestamp"], 1.5);
    }
}
