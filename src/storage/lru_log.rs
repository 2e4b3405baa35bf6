//! Large-dataset engine: an append-only data file is the authoritative
//! store, RAM holds only an id -> offset map plus an LRU cache of
//! materialized documents, grounded on the teacher's `cache::core::Cache`
//! (LRU eviction) composed with a position-addressed log reader.
use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use super::{StorageEngine, StorageStats};
use crate::crypto::{self, EncryptionKey};
use crate::document::{Document, DocumentId, IdKind, from_canonical_json, to_canonical_json};
use crate::errors::{MinileafError, Result};
use crate::fsutil::{create_secure, create_secure_truncate, pread_exact};
use crate::update::UpdateSpec;

const ID_LEN_CAP: u32 = 10_000;
const DOC_LEN_CAP: u32 = 100 * 1024 * 1024;
const DELETION_MARKER: &[u8] = b"{}";

fn encode_id(id: &DocumentId) -> Vec<u8> {
    let tag: u8 = match id.kind() {
        IdKind::ObjectId => 0,
        IdKind::Uuid => 1,
        IdKind::Text => 2,
        IdKind::Int => 3,
    };
    let text = id.to_text();
    let mut out = Vec::with_capacity(1 + text.len());
    out.push(tag);
    out.extend_from_slice(text.as_bytes());
    out
}

fn decode_id(bytes: &[u8]) -> Option<DocumentId> {
    let (&tag, rest) = bytes.split_first()?;
    let kind = match tag {
        0 => IdKind::ObjectId,
        1 => IdKind::Uuid,
        2 => IdKind::Text,
        3 => IdKind::Int,
        _ => return None,
    };
    let text = std::str::from_utf8(rest).ok()?;
    DocumentId::parse_text(kind, text).ok()
}

fn build_inner_blob(id: &DocumentId, doc_bytes: &[u8]) -> Vec<u8> {
    let id_bytes = encode_id(id);
    let mut out = Vec::with_capacity(8 + id_bytes.len() + doc_bytes.len());
    out.extend_from_slice(&(id_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&id_bytes);
    out.extend_from_slice(&(doc_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(doc_bytes);
    out
}

fn encode_record(key: Option<&EncryptionKey>, id: &DocumentId, doc_bytes: &[u8]) -> Result<Vec<u8>> {
    let inner = build_inner_blob(id, doc_bytes);
    match key {
        None => Ok(inner),
        Some(key) => {
            let ciphertext = crypto::encrypt(key, &inner)?;
            let mut framed = Vec::with_capacity(4 + ciphertext.len());
            framed.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
            framed.extend_from_slice(&ciphertext);
            Ok(framed)
        }
    }
}

/// Decoded record plus its total on-disk length, so a sequential scan
/// can advance past it.
type Decoded = (DocumentId, Vec<u8>, u64);

fn decode_plain_at(file: &File, offset: u64) -> Option<Decoded> {
    let mut len_buf = [0u8; 4];
    pread_exact(file, offset, &mut len_buf).ok()?;
    let id_len = u32::from_be_bytes(len_buf);
    if id_len > ID_LEN_CAP {
        return None;
    }
    let mut id_buf = vec![0u8; id_len as usize];
    pread_exact(file, offset + 4, &mut id_buf).ok()?;
    let id = decode_id(&id_buf)?;

    let mut doc_len_buf = [0u8; 4];
    pread_exact(file, offset + 4 + u64::from(id_len), &mut doc_len_buf).ok()?;
    let doc_len = u32::from_be_bytes(doc_len_buf);
    if doc_len > DOC_LEN_CAP {
        return None;
    }
    let mut doc_buf = vec![0u8; doc_len as usize];
    pread_exact(file, offset + 4 + u64::from(id_len) + 4, &mut doc_buf).ok()?;

    let record_len = 4 + u64::from(id_len) + 4 + u64::from(doc_len);
    Some((id, doc_buf, record_len))
}

fn decode_encrypted_at(file: &File, key: &EncryptionKey, offset: u64) -> Option<Decoded> {
    let mut len_buf = [0u8; 4];
    pread_exact(file, offset, &mut len_buf).ok()?;
    let total_len = u32::from_be_bytes(len_buf);
    if total_len > ID_LEN_CAP + DOC_LEN_CAP + 100 {
        return None;
    }
    let mut ciphertext = vec![0u8; total_len as usize];
    pread_exact(file, offset + 4, &mut ciphertext).ok()?;
    let inner = crypto::decrypt(key, &ciphertext).ok()?;
    if inner.len() < 4 {
        return None;
    }
    let id_len = u32::from_be_bytes(inner[0..4].try_into().ok()?);
    if id_len > ID_LEN_CAP {
        return None;
    }
    let id_end = 4 + id_len as usize;
    if inner.len() < id_end + 4 {
        return None;
    }
    let id = decode_id(&inner[4..id_end])?;
    let doc_len = u32::from_be_bytes(inner[id_end..id_end + 4].try_into().ok()?);
    if doc_len > DOC_LEN_CAP {
        return None;
    }
    let doc_start = id_end + 4;
    let doc_end = doc_start + doc_len as usize;
    if inner.len() != doc_end {
        return None;
    }
    let record_len = 4 + u64::from(total_len);
    Some((id, inner[doc_start..doc_end].to_vec(), record_len))
}

fn decode_at(file: &File, key: Option<&EncryptionKey>, offset: u64) -> Option<Decoded> {
    match key {
        None => decode_plain_at(file, offset),
        Some(k) => decode_encrypted_at(file, k, offset),
    }
}

fn rebuild_index(file: &File, key: Option<&EncryptionKey>) -> Result<HashMap<DocumentId, u64>> {
    let len = file.metadata()?.len();
    let mut live_offsets = HashMap::new();
    let mut offset = 0u64;
    while offset < len {
        let Some((id, doc_bytes, record_len)) = decode_at(file, key, offset) else { break };
        if doc_bytes.as_slice() == DELETION_MARKER {
            live_offsets.remove(&id);
        } else {
            live_offsets.insert(id, offset);
        }
        offset += record_len;
    }
    Ok(live_offsets)
}

struct WriteState {
    file: File,
    live_offsets: HashMap<DocumentId, u64>,
}

pub struct LruLogEngine {
    path: PathBuf,
    read_file: RwLock<File>,
    key: Option<EncryptionKey>,
    sync_on_write: bool,
    write: Mutex<WriteState>,
    cache: Mutex<LruCache<DocumentId, Document>>,
}

impl LruLogEngine {
    /// # Errors
    /// Returns an error if the data file cannot be opened or scanned.
    pub fn open(
        path: impl Into<PathBuf>,
        key: Option<EncryptionKey>,
        sync_on_write: bool,
        cache_size: usize,
    ) -> Result<Self> {
        let path = path.into();
        let file = create_secure(&path)?;
        let live_offsets = rebuild_index(&file, key.as_ref())?;
        let read_file = create_secure(&path)?;
        let cap = NonZeroUsize::new(cache_size.max(1)).expect("max(1) is never zero");
        Ok(Self {
            path,
            read_file: RwLock::new(read_file),
            key,
            sync_on_write,
            write: Mutex::new(WriteState { file, live_offsets }),
            cache: Mutex::new(LruCache::new(cap)),
        })
    }

    fn doc_bytes(doc: &Document) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&to_canonical_json(&bson::Bson::Document(doc.data.clone())))?)
    }

    fn decode_doc(id: &DocumentId, doc_bytes: &[u8]) -> Result<Document> {
        let json: serde_json::Value = serde_json::from_slice(doc_bytes)?;
        let value = from_canonical_json(&json)?;
        let bson::Bson::Document(data) = value else {
            return Err(MinileafError::Codec("corrupt document record".to_string()));
        };
        Ok(Document::new(id.clone(), data))
    }
}

impl StorageEngine for LruLogEngine {
    fn upsert(&self, doc: Document) -> Result<()> {
        let doc_bytes = Self::doc_bytes(&doc)?;
        let record = encode_record(self.key.as_ref(), &doc.id, &doc_bytes)?;
        let mut write = self.write.lock();
        let offset = write.file.seek(SeekFrom::End(0))?;
        write.file.write_all(&record)?;
        if self.sync_on_write {
            write.file.sync_data()?;
        }
        write.live_offsets.insert(doc.id.clone(), offset);
        drop(write);
        self.cache.lock().put(doc.id.clone(), doc);
        Ok(())
    }

    fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>> {
        if let Some(doc) = self.cache.lock().get(id) {
            return Ok(Some(doc.clone()));
        }
        let offset = match self.write.lock().live_offsets.get(id).copied() {
            Some(o) => o,
            None => return Ok(None),
        };
        let read_file = self.read_file.read();
        let decoded = decode_at(&read_file, self.key.as_ref(), offset);
        drop(read_file);
        let Some((_, doc_bytes, _)) = decoded else {
            let mut write = self.write.lock();
            if write.live_offsets.get(id).copied() == Some(offset) {
                write.live_offsets.remove(id);
            }
            log::warn!("corrupted record for id {id} at offset {offset}, dropped from index");
            return Ok(None);
        };
        if doc_bytes.as_slice() == DELETION_MARKER {
            return Ok(None);
        }
        let doc = Self::decode_doc(id, &doc_bytes)?;
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.get(id) {
            return Ok(Some(existing.clone()));
        }
        cache.put(id.clone(), doc.clone());
        Ok(Some(doc))
    }

    fn update_fields(&self, id: &DocumentId, spec: &UpdateSpec) -> Result<bool> {
        let Some(mut doc) = self.find_by_id(id)? else {
            return Ok(false);
        };
        super::apply_update(&mut doc, spec);
        self.upsert(doc)?;
        Ok(true)
    }

    fn delete(&self, id: &DocumentId) -> Result<Option<Document>> {
        let existing = self.find_by_id(id)?;
        let record = encode_record(self.key.as_ref(), id, DELETION_MARKER)?;
        let mut write = self.write.lock();
        write.file.seek(SeekFrom::End(0))?;
        write.file.write_all(&record)?;
        if self.sync_on_write {
            write.file.sync_data()?;
        }
        write.live_offsets.remove(id);
        drop(write);
        self.cache.lock().pop(id);
        Ok(existing)
    }

    fn find_all(&self) -> Result<Vec<Document>> {
        let mut ids: Vec<DocumentId> = self.write.lock().live_offsets.keys().cloned().collect();
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.find_by_id(&id)? {
                out.push(doc);
            }
        }
        Ok(out)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.write.lock().live_offsets.len())
    }

    fn compact(&self) -> Result<()> {
        let mut write = self.write.lock();
        let mut ids: Vec<DocumentId> = write.live_offsets.keys().cloned().collect();
        ids.sort();

        let tmp_path = self.path.with_extension("data.tmp");
        let mut tmp = create_secure_truncate(&tmp_path)?;
        let mut new_offsets = HashMap::with_capacity(ids.len());
        let mut cursor = 0u64;
        {
            let read_file = self.read_file.read();
            for id in &ids {
                let offset = write.live_offsets[id];
                let Some((_, doc_bytes, _)) = decode_at(&read_file, self.key.as_ref(), offset) else {
                    continue;
                };
                if doc_bytes.as_slice() == DELETION_MARKER {
                    continue;
                }
                let record = encode_record(self.key.as_ref(), id, &doc_bytes)?;
                tmp.write_all(&record)?;
                new_offsets.insert(id.clone(), cursor);
                cursor += record.len() as u64;
            }
        }
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, &self.path)?;

        write.file = create_secure(&self.path)?;
        write.live_offsets = new_offsets;
        *self.read_file.write() = create_secure(&self.path)?;
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let write = self.write.lock();
        Ok(StorageStats {
            document_count: write.live_offsets.len(),
            bytes_on_disk: write.file.metadata()?.len(),
            wal_bytes: 0,
            last_snapshot_epoch_ms: None,
        })
    }
}
