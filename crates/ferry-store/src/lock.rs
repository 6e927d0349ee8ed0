use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// Exclusive per-destination lock. Released when dropped.
///
/// Two `migrate` runs against the same destination must not overlap.
pub struct DestinationLock {
    _file: File,
}

impl DestinationLock {
    /// Try to acquire the lock (non-blocking).
    pub fn acquire(lock_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|e| anyhow::anyhow!("cannot open lock file {}: {}", lock_path.display(), e))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "destination is locked by another ferry process ({})",
                lock_path.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}

/// Blocking exclusive lock guard.
pub struct LockGuard {
    _file: File,
}

/// Acquire an exclusive file lock, waiting for other holders.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { _file: file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("locks").join("dest.lock");

        let lock = DestinationLock::acquire(&path).unwrap();
        assert!(DestinationLock::acquire(&path).is_err());
        drop(lock);
        let _again = DestinationLock::acquire(&path).unwrap();
    }

    #[test]
    fn lock_file_acquires_and_drops() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.lock");
        let guard = lock_file(&path).unwrap();
        assert!(path.exists());
        drop(guard);
    }
}
