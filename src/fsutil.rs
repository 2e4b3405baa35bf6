use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Normalize a data directory path: make it absolute relative to the
/// process's current directory.
#[must_use]
pub fn normalize_data_dir(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
    }
}

/// Path to a collection's primary data file under `data_dir/collections/`.
#[must_use]
pub fn collection_path(data_dir: &Path, name: &str, extension: &str) -> PathBuf {
    data_dir.join("collections").join(format!("{name}.{extension}"))
}

/// Apply `configure` to a fresh `OpenOptions`, then open `path` with
/// restrictive permissions where supported (0o600 on Unix; the default
/// ACLs on other platforms, since there is no portable equivalent).
fn open_secure(path: &Path, configure: impl FnOnce(&mut OpenOptions) -> &mut OpenOptions) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    configure(&mut opts);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

/// Open (creating if absent) a file for random-access read/write without
/// truncating existing content. Used for a storage engine's main data
/// file, which is read and written throughout its lifetime.
///
/// # Errors
/// Returns an error if the file cannot be created/opened.
pub fn create_secure(path: &Path) -> io::Result<File> {
    open_secure(path, |o| o.read(true).write(true).create(true).truncate(false))
}

/// Create (truncating if present) a file for one-shot sequential writes.
/// Used for snapshot/compaction temp files that are written once, synced,
/// and renamed into place.
///
/// # Errors
/// Returns an error if the file cannot be created.
pub fn create_secure_truncate(path: &Path) -> io::Result<File> {
    open_secure(path, |o| o.write(true).create(true).truncate(true))
}

/// Open (creating if absent) a file for append-only writes. Used for a
/// write-ahead log, whose records are only ever appended.
///
/// # Errors
/// Returns an error if the file cannot be created/opened.
pub fn create_secure_append(path: &Path) -> io::Result<File> {
    open_secure(path, |o| o.append(true).create(true))
}

/// Read exactly `buf.len()` bytes starting at `offset`, safe to call from
/// multiple readers concurrently with writers appending to the same file.
///
/// # Errors
/// Returns an error on a short read (including EOF) or I/O failure.
pub fn pread_exact(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(buf, offset)
    }
    #[cfg(not(unix))]
    {
        use std::io::{Read, Seek, SeekFrom};
        // No portable pread on this platform; callers already serialize
        // readers against writers via the engine's locks in this build.
        let mut f = file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)
    }
}
