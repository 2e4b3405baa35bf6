//! Stream documents from one storage engine into another in fixed-size
//! batches, preserving ids and values. No direct teacher analogue; follows
//! the batched-streaming idiom the teacher's import/export pipelines use.
use super::StorageEngine;
use crate::errors::Result;

const DEFAULT_BATCH_SIZE: usize = 512;

/// Copy every document from `source` into `dest`, `batch_size` at a time.
/// Returns the number of documents migrated.
///
/// # Errors
/// Returns an error if reading from `source` or writing to `dest` fails.
/// A failure partway through leaves `dest` holding whatever batches
/// already completed.
pub fn migrate(source: &dyn StorageEngine, dest: &dyn StorageEngine, batch_size: usize) -> Result<usize> {
    let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
    let mut migrated = 0;
    let mut skip = 0;
    loop {
        let batch = source.find_page(skip, batch_size)?;
        if batch.is_empty() {
            break;
        }
        let batch_len = batch.len();
        for doc in batch {
            dest.upsert(doc)?;
        }
        migrated += batch_len;
        skip += batch_len;
        if batch_len < batch_size {
            break;
        }
    }
    Ok(migrated)
}
