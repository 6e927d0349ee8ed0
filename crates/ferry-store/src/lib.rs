mod lock;
mod paths;

pub use lock::{lock_file, DestinationLock, LockGuard};
pub use paths::StorePaths;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Deterministic id for a path or URL.
/// store_id = blake3(normalized input) → hex string (first 32 chars).
pub fn store_id(input: &str) -> String {
    let hash = blake3::hash(input.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Id for a local path: canonicalized, forward slashes.
pub fn path_id(p: &Path) -> String {
    store_id(&normalize_path(p))
}

fn normalize_path(p: &Path) -> String {
    let abs = p
        .canonicalize()
        .unwrap_or_else(|_| p.to_path_buf())
        .to_string_lossy()
        .to_string();
    #[cfg(windows)]
    let abs = abs.to_lowercase();
    abs.replace('\\', "/")
}

/// Return the per-user store root: `<data dir>/ferry/`
/// (falls back to `~/.ferry/`).
pub fn store_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("ferry")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".ferry")
    } else {
        PathBuf::from(".ferry-store")
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}
