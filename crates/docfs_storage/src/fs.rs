//! Asynchronous filesystem helpers.
//!
//! Thin wrappers over `tokio::fs` that add the retry policy for renames,
//! tolerate already-missing entries on removal and give deterministic
//! directory listings.

use crate::error::{StorageError, StorageResult};
use crate::retry::{retry, RetryPolicy};
use crate::staging::CONSISTENT_PREFIX;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File or directory name.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Lists a directory, sorted by name.
///
/// Entries whose names are not valid UTF-8 are skipped.
pub async fn list_dir(path: &Path) -> StorageResult<Vec<DirEntry>> {
    let mut reader = fs::read_dir(path).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.file_type().await?.is_dir();
        entries.push(DirEntry {
            name,
            path: entry.path(),
            is_dir,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Returns true if something exists at `path`.
pub async fn exists(path: &Path) -> StorageResult<bool> {
    Ok(fs::try_exists(path).await?)
}

/// Returns the modification time of `path`, or `None` if it does not exist.
pub async fn modified(path: &Path) -> StorageResult<Option<SystemTime>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Renames `from` to `to`, retrying transient failures.
///
/// A missing source is not retried.
pub async fn rename(from: &Path, to: &Path, policy: &RetryPolicy) -> StorageResult<()> {
    let attempts = std::sync::atomic::AtomicU32::new(0);

    let result = retry(policy, || {
        attempts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        async move {
            match fs::rename(from, to).await {
                Ok(()) => Ok(Ok(())),
                // Retrying cannot make a missing source appear.
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Err(e)),
                Err(e) => Err(e),
            }
        }
    })
    .await;

    let failure = match result {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) | Err(e) => e,
    };

    Err(StorageError::RenameFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        attempts: attempts.into_inner(),
        source: failure,
    })
}

/// Removes a file or a directory tree. Missing entries are not an error.
pub async fn remove_path(path: &Path) -> StorageResult<()> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Appends `line` plus a newline to `path`, creating the file if needed,
/// and syncs the data to disk.
///
/// A torn last line left by a crash is terminated first, so the new line
/// never joins it.
pub async fn append_line(path: &Path, line: &str) -> StorageResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await?;

    let mut data = Vec::with_capacity(line.len() + 2);
    if file.metadata().await?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(io::SeekFrom::End(-1)).await?;
        file.read_exact(&mut last).await?;
        if last[0] != b'\n' {
            data.push(b'\n');
        }
    }
    data.extend_from_slice(line.as_bytes());
    data.push(b'\n');

    file.write_all(&data).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Writes `contents` to `path` and syncs it.
pub async fn write_file(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Returns the path used while `path` is being rewritten: the same name with
/// the consistent marker prefix, in the same directory.
#[must_use]
pub fn rewrite_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{CONSISTENT_PREFIX}{name}"))
}

/// Replaces the file at `path` with `contents`.
///
/// The new contents are written to a `~`-prefixed sibling first and then
/// renamed over the target, so readers observe either the old or the new
/// file in full. A leftover sibling after a crash is never valid data.
pub async fn replace_file(path: &Path, contents: &[u8], policy: &RetryPolicy) -> StorageResult<()> {
    let temp = rewrite_path(path);
    write_file(&temp, contents).await?;
    rename(&temp, path, policy).await?;
    if let Some(parent) = path.parent() {
        sync_directory(parent).await?;
    }
    Ok(())
}

/// Moves every subdirectory of `from` that does not already exist in `to`.
///
/// Marker-named subdirectories are left behind. Returns the number of
/// directories moved.
pub async fn move_subdirectories(
    from: &Path,
    to: &Path,
    policy: &RetryPolicy,
) -> StorageResult<usize> {
    if !exists(from).await? {
        return Ok(0);
    }

    let mut moved = 0;
    for entry in list_dir(from).await? {
        if !entry.is_dir || entry.name.starts_with(CONSISTENT_PREFIX) {
            continue;
        }
        let target = to.join(&entry.name);
        if exists(&target).await? {
            continue;
        }
        rename(&entry.path, &target, policy).await?;
        moved += 1;
    }
    Ok(moved)
}

/// Syncs a directory so that entry creations, renames and removals are
/// durable.
///
/// On Windows, directory fsync is not supported; NTFS journaling provides
/// the metadata durability instead.
#[cfg(unix)]
pub async fn sync_directory(path: &Path) -> StorageResult<()> {
    let dir = fs::File::open(path).await?;
    dir.sync_all().await?;
    Ok(())
}

/// Syncs a directory (no-op on this platform).
#[cfg(not(unix))]
pub async fn sync_directory(_path: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn list_dir_is_sorted() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("b"), b"").await.unwrap();
        fs::create_dir(temp.path().join("a")).await.unwrap();
        fs::write(temp.path().join("c"), b"").await.unwrap();

        let entries = list_dir(temp.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(entries[0].is_dir);
        assert!(!entries[1].is_dir);
    }

    #[tokio::test]
    async fn remove_path_tolerates_missing() {
        let temp = tempdir().unwrap();
        remove_path(&temp.path().join("missing")).await.unwrap();

        let dir = temp.path().join("tree");
        fs::create_dir_all(dir.join("nested")).await.unwrap();
        fs::write(dir.join("nested").join("f"), b"x").await.unwrap();
        remove_path(&dir).await.unwrap();
        assert!(!exists(&dir).await.unwrap());
    }

    #[tokio::test]
    async fn append_line_appends() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log");
        append_line(&path, "one").await.unwrap();
        append_line(&path, "two").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn append_line_terminates_a_torn_tail() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log");
        fs::write(&path, b"one\n{\"torn").await.unwrap();

        append_line(&path, "two").await.unwrap();

        let contents = fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "one\n{\"torn\ntwo\n");
        assert_eq!(contents.lines().last(), Some("two"));
    }

    #[tokio::test]
    async fn replace_file_swaps_contents() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings");
        fs::write(&path, b"old").await.unwrap();

        replace_file(&path, b"new", &RetryPolicy::default()).await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"new");
        assert!(!exists(&temp.path().join("~settings")).await.unwrap());
    }

    #[tokio::test]
    async fn rename_missing_source_fails_fast() {
        let temp = tempdir().unwrap();
        let err = rename(
            &temp.path().join("nope"),
            &temp.path().join("other"),
            &RetryPolicy::new(5),
        )
        .await
        .unwrap_err();

        match err {
            StorageError::RenameFailed { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert!(StorageError::RenameFailed {
            from: PathBuf::new(),
            to: PathBuf::new(),
            attempts: 1,
            source: io::Error::from(io::ErrorKind::NotFound),
        }
        .is_not_found());
    }

    #[tokio::test]
    async fn move_subdirectories_skips_existing_and_markers() {
        let temp = tempdir().unwrap();
        let from = temp.path().join("from");
        let to = temp.path().join("to");
        fs::create_dir_all(from.join("a")).await.unwrap();
        fs::create_dir_all(from.join("b")).await.unwrap();
        fs::create_dir_all(from.join("~~c")).await.unwrap();
        fs::write(from.join("config.json"), b"{}").await.unwrap();
        fs::create_dir_all(to.join("b")).await.unwrap();

        let moved = move_subdirectories(&from, &to, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(moved, 1);
        assert!(exists(&to.join("a")).await.unwrap());
        assert!(exists(&from.join("b")).await.unwrap());
        assert!(exists(&from.join("~~c")).await.unwrap());
        assert!(!exists(&to.join("config.json")).await.unwrap());
    }
}
