//! Bounded-dataset engine: the full collection lives in memory, mirrored
//! by a write-ahead log plus periodic snapshot, grounded on the teacher's
//! `recovery::wasp` append-log-plus-checkpoint design.
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{StorageEngine, StorageStats, apply_update};
use crate::crypto::{self, EncryptionKey};
use crate::document::{Document, DocumentId, from_canonical_json, to_canonical_json};
use crate::errors::{MinileafError, Result};
use crate::fsutil::{create_secure_append, create_secure_truncate};
use crate::update::UpdateSpec;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WalOpKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalRecord {
    #[serde(rename = "type")]
    kind: WalOpKind,
    timestamp: i64,
    id: DocumentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(rename = "_id")]
    id: DocumentId,
    doc: serde_json::Value,
}

fn now_epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

struct Inner {
    map: BTreeMap<DocumentId, Document>,
    wal_file: File,
}

pub struct WalSnapshotEngine {
    wal_path: PathBuf,
    snapshot_path: PathBuf,
    key: Option<EncryptionKey>,
    sync_on_write: bool,
    wal_max_bytes_before_snapshot: u64,
    wal_bytes: AtomicU64,
    last_snapshot_epoch_ms: RwLock<Option<i64>>,
    inner: RwLock<Inner>,
}

impl WalSnapshotEngine {
    /// Open (and, if necessary, recover) a WAL+snapshot engine rooted at
    /// `wal_path`/`snapshot_path`.
    ///
    /// # Errors
    /// Returns an error if the snapshot or WAL cannot be read, or if a
    /// record fails to decrypt under `key`.
    pub fn open(
        wal_path: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
        key: Option<EncryptionKey>,
        sync_on_write: bool,
        wal_max_bytes_before_snapshot: u64,
    ) -> Result<Self> {
        let wal_path = wal_path.into();
        let snapshot_path = snapshot_path.into();

        let mut map = BTreeMap::new();
        let mut last_snapshot_epoch_ms = None;
        if snapshot_path.exists() {
            last_snapshot_epoch_ms = Some(load_snapshot(&snapshot_path, key.as_ref(), &mut map)?);
        }
        replay_wal(&wal_path, key.as_ref(), &mut map);

        let wal_file = create_secure_append(&wal_path)?;
        let wal_bytes = wal_file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            wal_path,
            snapshot_path,
            key,
            sync_on_write,
            wal_max_bytes_before_snapshot,
            wal_bytes: AtomicU64::new(wal_bytes),
            last_snapshot_epoch_ms: RwLock::new(last_snapshot_epoch_ms),
            inner: RwLock::new(Inner { map, wal_file }),
        })
    }

    fn append_record(&self, inner: &mut Inner, kind: WalOpKind, id: &DocumentId, doc: Option<&Document>) -> Result<()> {
        let record = WalRecord {
            kind,
            timestamp: now_epoch_ms(),
            id: id.clone(),
            document: doc.map(|d| to_canonical_json(&bson::Bson::Document(d.data.clone()))),
        };
        let bytes_written = match &self.key {
            Some(key) => {
                let plaintext = serde_json::to_vec(&record)?;
                let ciphertext = crypto::encrypt(key, &plaintext)?;
                let mut framed = Vec::new();
                crypto::write_framed(&mut framed, &ciphertext)?;
                inner.wal_file.write_all(&framed)?;
                framed.len() as u64
            }
            None => {
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                inner.wal_file.write_all(&line)?;
                line.len() as u64
            }
        };
        if self.sync_on_write {
            inner.wal_file.sync_data()?;
        }
        self.wal_bytes.fetch_add(bytes_written, AtomicOrdering::Relaxed);
        Ok(())
    }

    fn maybe_snapshot(&self, inner: &mut Inner) -> Result<()> {
        if self.wal_bytes.load(AtomicOrdering::Relaxed) < self.wal_max_bytes_before_snapshot {
            return Ok(());
        }
        self.snapshot_locked(inner)
    }

    fn snapshot_locked(&self, inner: &mut Inner) -> Result<()> {
        let entries: Vec<SnapshotEntry> = inner
            .map
            .values()
            .map(|d| SnapshotEntry {
                id: d.id.clone(),
                doc: to_canonical_json(&bson::Bson::Document(d.data.clone())),
            })
            .collect();
        let plaintext = serde_json::to_vec(&entries)?;
        let bytes = match &self.key {
            Some(key) => crypto::encrypt(key, &plaintext)?,
            None => plaintext,
        };
        let tmp_path = self.snapshot_path.with_extension("snapshot.tmp");
        {
            let mut tmp = create_secure_truncate(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.snapshot_path)?;

        let fresh_wal = create_secure_truncate(&self.wal_path)?;
        inner.wal_file = create_secure_append(&self.wal_path)?;
        drop(fresh_wal);
        self.wal_bytes.store(0, AtomicOrdering::Relaxed);
        *self.last_snapshot_epoch_ms.write() = Some(now_epoch_ms());
        Ok(())
    }
}

fn load_snapshot(
    path: &Path,
    key: Option<&EncryptionKey>,
    map: &mut BTreeMap<DocumentId, Document>,
) -> Result<i64> {
    let raw = fs::read(path)?;
    let plaintext = match key {
        Some(key) => crypto::decrypt(key, &raw)?,
        None => raw,
    };
    let entries: Vec<SnapshotEntry> = serde_json::from_slice(&plaintext)?;
    for entry in entries {
        let value = from_canonical_json(&entry.doc)?;
        let bson::Bson::Document(data) = value else {
            return Err(MinileafError::Codec("snapshot entry is not a document".to_string()));
        };
        map.insert(entry.id.clone(), Document::new(entry.id, data));
    }
    Ok(path.metadata().and_then(|m| m.modified()).ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_millis() as i64).unwrap_or(0))
}

fn replay_wal(path: &Path, key: Option<&EncryptionKey>, map: &mut BTreeMap<DocumentId, Document>) {
    let Ok(file) = File::open(path) else { return };

    if let Some(key) = key {
        let mut reader = BufReader::new(file);
        loop {
            match crypto::read_framed(&mut reader) {
                Ok(Some(frame)) => match crypto::decrypt(key, &frame).ok().and_then(|pt| serde_json::from_slice::<WalRecord>(&pt).ok()) {
                    Some(record) => apply_wal_record(map, record),
                    None => log::warn!("skipping unparseable encrypted WAL frame"),
                },
                Ok(None) => break,
                Err(e) => {
                    log::warn!("WAL framing error, stopping replay: {e}");
                    break;
                }
            }
        }
    } else {
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<WalRecord>(&line) {
                Ok(record) => apply_wal_record(map, record),
                Err(e) => {
                    log::warn!("unparseable WAL record, stopping replay: {e}");
                    break;
                }
            }
        }
    }
}

fn apply_wal_record(map: &mut BTreeMap<DocumentId, Document>, record: WalRecord) {
    match record.kind {
        WalOpKind::Insert | WalOpKind::Update => {
            let Some(json) = record.document else { return };
            let Ok(value) = from_canonical_json(&json) else { return };
            let bson::Bson::Document(data) = value else { return };
            map.insert(record.id.clone(), Document::new(record.id, data));
        }
        WalOpKind::Delete => {
            map.remove(&record.id);
        }
    }
}

impl StorageEngine for WalSnapshotEngine {
    fn upsert(&self, doc: Document) -> Result<()> {
        let mut inner = self.inner.write();
        let kind = if inner.map.contains_key(&doc.id) { WalOpKind::Update } else { WalOpKind::Insert };
        self.append_record(&mut inner, kind, &doc.id, Some(&doc))?;
        inner.map.insert(doc.id.clone(), doc);
        self.maybe_snapshot(&mut inner)
    }

    fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.inner.read().map.get(id).cloned())
    }

    fn update_fields(&self, id: &DocumentId, spec: &UpdateSpec) -> Result<bool> {
        let mut inner = self.inner.write();
        let Some(existing) = inner.map.get(id).cloned() else {
            return Ok(false);
        };
        let mut updated = existing;
        apply_update(&mut updated, spec);
        self.append_record(&mut inner, WalOpKind::Update, id, Some(&updated))?;
        inner.map.insert(id.clone(), updated);
        self.maybe_snapshot(&mut inner)?;
        Ok(true)
    }

    fn delete(&self, id: &DocumentId) -> Result<Option<Document>> {
        let mut inner = self.inner.write();
        self.append_record(&mut inner, WalOpKind::Delete, id, None)?;
        let removed = inner.map.remove(id);
        self.maybe_snapshot(&mut inner)?;
        Ok(removed)
    }

    fn find_all(&self) -> Result<Vec<Document>> {
        Ok(self.inner.read().map.values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map.len())
    }

    fn compact(&self) -> Result<()> {
        let mut inner = self.inner.write();
        self.snapshot_locked(&mut inner)
    }

    fn stats(&self) -> Result<StorageStats> {
        let inner = self.inner.read();
        Ok(StorageStats {
            document_count: inner.map.len(),
            bytes_on_disk: fs::metadata(&self.snapshot_path).map(|m| m.len()).unwrap_or(0),
            wal_bytes: self.wal_bytes.load(AtomicOrdering::Relaxed),
            last_snapshot_epoch_ms: *self.last_snapshot_epoch_ms.read(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn paths(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        (dir.path().join("c.wal"), dir.path().join("c.snapshot"))
    }

    #[test]
    fn upsert_survives_reopen_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (wal, snap) = paths(&dir);
        {
            let engine = WalSnapshotEngine::open(&wal, &snap, None, true, u64::MAX).unwrap();
            engine.upsert(Document::new(DocumentId::Int(1), doc! { "x": 1i64 })).unwrap();
        }
        let engine = WalSnapshotEngine::open(&wal, &snap, None, true, u64::MAX).unwrap();
        let got = engine.find_by_id(&DocumentId::Int(1)).unwrap().unwrap();
        assert_eq!(got.data.get("x"), Some(&bson::Bson::Int64(1)));
    }

    #[test]
    fn delete_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (wal, snap) = paths(&dir);
        {
            let engine = WalSnapshotEngine::open(&wal, &snap, None, true, u64::MAX).unwrap();
            engine.upsert(Document::new(DocumentId::Int(1), doc! { "x": 1i64 })).unwrap();
            engine.delete(&DocumentId::Int(1)).unwrap();
        }
        let engine = WalSnapshotEngine::open(&wal, &snap, None, true, u64::MAX).unwrap();
        assert_eq!(engine.find_by_id(&DocumentId::Int(1)).unwrap(), None);
    }

    #[test]
    fn size_triggered_snapshot_truncates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let (wal, snap) = paths(&dir);
        let engine = WalSnapshotEngine::open(&wal, &snap, None, true, 1).unwrap();
        engine.upsert(Document::new(DocumentId::Int(1), doc! { "x": 1i64 })).unwrap();
        assert!(snap.exists());
        assert_eq!(engine.stats().unwrap().wal_bytes, 0);
    }

    #[test]
    fn encrypted_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (wal, snap) = paths(&dir);
        let key = EncryptionKey::generate();
        {
            let engine = WalSnapshotEngine::open(&wal, &snap, Some(key.clone()), true, u64::MAX).unwrap();
            engine.upsert(Document::new(DocumentId::Int(1), doc! { "x": 1i64 })).unwrap();
        }
        let engine = WalSnapshotEngine::open(&wal, &snap, Some(key), true, u64::MAX).unwrap();
        assert!(engine.find_by_id(&DocumentId::Int(1)).unwrap().is_some());
    }
}
