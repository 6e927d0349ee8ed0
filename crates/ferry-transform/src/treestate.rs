use ferry_core::glob::to_slash;
use ferry_core::hash::{fingerprint, sha256_hex};
use ferry_core::{FerryError, Glob, Result};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lazily-built snapshot of the files under a checkout: relative path to
/// content digest. Symlinks are recorded by target, not followed.
///
/// A snapshot is never refreshed in place; call [`TreeState::rebuild`] to
/// get a new one once the tree may have changed.
#[derive(Debug, Clone)]
pub struct TreeState {
    root: PathBuf,
    snapshot: OnceCell<BTreeMap<String, String>>,
}

impl TreeState {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshot: OnceCell::new(),
        }
    }

    /// A fresh, not yet computed state over the same root.
    pub fn rebuild(&self) -> Self {
        Self::new(self.root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> Result<&BTreeMap<String, String>> {
        if let Some(snapshot) = self.snapshot.get() {
            return Ok(snapshot);
        }
        let snapshot = snapshot(&self.root)?;
        Ok(self.snapshot.get_or_init(|| snapshot))
    }

    /// Relative paths selected by `glob`, sorted.
    pub fn find(&self, glob: &Glob) -> Result<Vec<String>> {
        Ok(self
            .files()?
            .keys()
            .filter(|p| glob.matches(p))
            .cloned()
            .collect())
    }

    /// Single digest over paths and contents.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(fingerprint(
            self.files()?.iter().map(|(p, d)| (p.as_str(), d.as_str())),
        ))
    }
}

fn snapshot(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| FerryError::Io(e.into()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map(to_slash)
            .unwrap_or_default();
        let digest = if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            sha256_hex(format!("link:{}", target.display()).as_bytes())
        } else {
            sha256_hex(&fs::read(entry.path())?)
        };
        files.insert(rel, digest);
    }
    Ok(files)
}

/// Paths whose digests differ between two snapshots, sorted.
pub fn diff(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> Vec<String> {
    let mut out: Vec<String> = a
        .iter()
        .filter(|(p, d)| b.get(*p) != Some(*d))
        .map(|(p, _)| p.clone())
        .collect();
    out.extend(b.keys().filter(|p| !a.contains_key(*p)).cloned());
    out.sort();
    out
}
