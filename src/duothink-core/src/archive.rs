//! Archived debates and the key-value store that holds them.
//!
//! The whole archive lives under one key as a JSON list, newest first, and
//! is rewritten in full on every archive event.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::CoachError;
use crate::message::{Message, MessageSender};

/// Key the archive is stored under.
pub const ARCHIVE_KEY: &str = "duothink_logs";

/// Snapshot of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDebate {
    pub id: String,
    pub topic: String,
    pub date: NaiveDate,
    pub messages: Vec<Message>,
    pub score: i32,
}

impl SavedDebate {
    /// Number of user arguments in the transcript.
    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.is_from_user()).count()
    }

    /// Number of blind-spot alerts in the transcript.
    pub fn blind_spots(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender == MessageSender::SystemAlert)
            .count()
    }
}

/// A string blob store addressed by key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoachError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), CoachError>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoachError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Writes a sibling temp file and renames it over the target, so a
    /// crash mid-write leaves the previous contents intact.
    fn set(&mut self, key: &str, value: &str) -> Result<(), CoachError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let staging = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}

/// In-process store, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoachError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CoachError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The list of archived debates, newest first.
pub struct DebateArchive<S> {
    store: S,
    debates: Vec<SavedDebate>,
}

impl<S: KeyValueStore> DebateArchive<S> {
    /// Read the archive once from the store. A missing key is an empty archive.
    pub fn load(store: S) -> Result<Self, CoachError> {
        let debates = match store.get(ARCHIVE_KEY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        tracing::debug!(count = debates.len(), "loaded debate archive");
        Ok(Self { store, debates })
    }

    /// Prepend a debate and overwrite the stored collection.
    pub fn archive(&mut self, debate: SavedDebate) -> Result<(), CoachError> {
        self.debates.insert(0, debate);
        let raw = serde_json::to_string(&self.debates)?;
        self.store.set(ARCHIVE_KEY, &raw)
    }

    pub fn debates(&self) -> &[SavedDebate] {
        &self.debates
    }

    pub fn get(&self, index: usize) -> Option<&SavedDebate> {
        self.debates.get(index)
    }

    pub fn len(&self) -> usize {
        self.debates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.debates.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BlindSpot, MessageId};
    use pretty_assertions::assert_eq;

    fn debate(id: &str, topic: &str) -> SavedDebate {
        SavedDebate {
            id: id.to_string(),
            topic: topic.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            messages: vec![
                Message::coach(MessageId(1), "Opening"),
                Message::user(MessageId(2), "Claim"),
                Message::blind_spot_alert(MessageId(3), BlindSpot::detected("Slippery Slope", "x")),
                Message::coach(MessageId(4), "Counter"),
            ],
            score: 74,
        }
    }

    #[test]
    fn test_missing_key_is_empty() {
        let archive = DebateArchive::load(MemoryStore::default()).unwrap();
        assert!(archive.is_empty());
    }

    #[test]
    fn test_archive_prepends_and_persists() {
        let mut archive = DebateArchive::load(MemoryStore::default()).unwrap();
        archive.archive(debate("a", "First")).unwrap();
        archive.archive(debate("b", "Second")).unwrap();

        assert_eq!(archive.get(0).map(|d| d.id.as_str()), Some("b"));
        assert_eq!(archive.get(1).map(|d| d.id.as_str()), Some("a"));

        let reloaded = DebateArchive::load(archive.store().clone()).unwrap();
        assert_eq!(reloaded.debates(), archive.debates());
    }

    #[test]
    fn test_stored_format_field_names() {
        let mut archive = DebateArchive::load(MemoryStore::default()).unwrap();
        archive.archive(debate("a", "First")).unwrap();

        let raw = archive.store().get(ARCHIVE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["topic"], "First");
        assert_eq!(value[0]["date"], "2026-03-14");
        assert_eq!(value[0]["score"], 74);
        assert_eq!(value[0]["messages"][2]["blindSpot"]["type"], "Slippery Slope");
    }

    #[test]
    fn test_malformed_archive_is_an_error() {
        let mut store = MemoryStore::default();
        store.set(ARCHIVE_KEY, "[{").unwrap();
        assert!(matches!(
            DebateArchive::load(store),
            Err(CoachError::Serialization(_))
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = DebateArchive::load(FileStore::new(dir.path().join("nested"))).unwrap();
        let original = debate("a", "On disk");
        archive.archive(original.clone()).unwrap();

        let reloaded = DebateArchive::load(FileStore::new(dir.path().join("nested"))).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.debates()[0], original);
    }

    #[test]
    fn test_file_store_overwrite_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        store.set(ARCHIVE_KEY, "[]").unwrap();
        store.set(ARCHIVE_KEY, "[1]").unwrap();

        assert_eq!(store.get(ARCHIVE_KEY).unwrap().as_deref(), Some("[1]"));
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{ARCHIVE_KEY}.json")]);
    }

    #[test]
    fn test_file_store_ignores_interrupted_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        store.set(ARCHIVE_KEY, "[]").unwrap();

        // A crash between staging and rename leaves only a stray temp file.
        fs::write(dir.path().join(format!("{ARCHIVE_KEY}.json.tmp")), "[{").unwrap();
        let archive = DebateArchive::load(store).unwrap();
        assert!(archive.is_empty());
    }

    #[test]
    fn test_debate_counters() {
        let d = debate("a", "Counts");
        assert_eq!(d.user_turns(), 1);
        assert_eq!(d.blind_spots(), 1);
    }
}
