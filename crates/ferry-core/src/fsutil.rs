//! Filesystem helpers shared by origins, destinations and the engine.

use crate::error::{FerryError, Result};
use crate::glob::{to_slash, Glob};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Remove everything inside `dir`, creating it if missing.
pub fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if fs::symlink_metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Relative paths of files (and symlinks) under `root` selected by `glob`.
/// Directories named in `skip_dirs` are not descended into.
pub fn list_files(root: &Path, glob: &Glob, skip_dirs: &[&str]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && skip_dirs.iter().any(|s| e.file_name() == *s))
        });
    for entry in walker {
        let entry = entry.map_err(|e| FerryError::Io(e.into()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).map(to_slash).unwrap_or_default();
        if glob.matches(&rel) {
            out.push(rel);
        }
    }
    Ok(out)
}

/// Copy the files of `from` selected by `glob` into `to`. Symlinks are
/// copied as symlinks. Returns the number of entries copied.
pub fn copy_tree(from: &Path, to: &Path, glob: &Glob) -> Result<usize> {
    let files = list_files(from, glob, &[])?;
    for rel in &files {
        copy_entry(&from.join(rel), &to.join(rel))?;
    }
    Ok(files.len())
}

fn copy_entry(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(dest).is_ok() {
        fs::remove_file(dest)?;
    }
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        #[cfg(unix)]
        std::os::unix::fs::symlink(fs::read_link(src)?, dest)?;
        #[cfg(not(unix))]
        fs::copy(src, dest)?;
    } else {
        fs::copy(src, dest)?;
    }
    Ok(())
}

/// Delete files under `root` selected by `glob`, then prune directories
/// left empty. Returns the number of files deleted.
pub fn delete_matching(root: &Path, glob: &Glob, skip_dirs: &[&str]) -> Result<usize> {
    let files = list_files(root, glob, skip_dirs)?;
    for rel in &files {
        fs::remove_file(root.join(rel))?;
    }
    prune_empty_dirs(root, skip_dirs)?;
    Ok(files.len())
}

/// Delete files under `root` that `glob` does not select, then prune
/// directories left empty. Returns the number of files deleted.
pub fn retain_matching(root: &Path, glob: &Glob) -> Result<usize> {
    let all = list_files(root, &Glob::all_files(), &[])?;
    let mut deleted = 0;
    for rel in all.iter().filter(|rel| !glob.matches(rel)) {
        fs::remove_file(root.join(rel))?;
        deleted += 1;
    }
    prune_empty_dirs(root, &[])?;
    Ok(deleted)
}

/// Remove empty directories below `root` (never `root` itself).
pub fn prune_empty_dirs(root: &Path, skip_dirs: &[&str]) -> Result<()> {
    let mut dirs: Vec<_> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !skip_dirs.iter().any(|s| e.file_name() == *s))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    // Deepest first so parents see their children removed.
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        if fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, rel).unwrap();
    }

    #[test]
    fn copy_respects_glob() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        for f in ["foo/file1", "foo/file2", "file3", "file4"] {
            write(src.path(), f);
        }
        let glob = Glob::new(["foo/*1", "file4"], None).unwrap();
        assert_eq!(copy_tree(src.path(), dst.path(), &glob).unwrap(), 2);
        assert_eq!(
            list_files(dst.path(), &Glob::all_files(), &[]).unwrap(),
            vec!["file4", "foo/file1"]
        );
    }

    #[test]
    fn delete_matching_prunes_and_skips() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "keep/readme");
        write(tmp.path(), "src/a/b.rs");
        write(tmp.path(), ".git/config");
        let glob = Glob::new(["src/**", "**/config"], None).unwrap();
        assert_eq!(delete_matching(tmp.path(), &glob, &[".git"]).unwrap(), 1);
        assert!(!tmp.path().join("src").exists());
        assert!(tmp.path().join(".git/config").exists());
        assert!(tmp.path().join("keep/readme").exists());
    }

    #[test]
    fn retain_matching_drops_unselected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/lib.rs");
        write(tmp.path(), "internal/secret.txt");
        let glob = Glob::new(["src/**"], None).unwrap();
        assert_eq!(retain_matching(tmp.path(), &glob).unwrap(), 1);
        assert!(!tmp.path().join("internal").exists());
        assert!(tmp.path().join("src/lib.rs").exists());
    }

    #[test]
    fn clear_dir_empties_or_creates() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a/b");
        write(tmp.path(), "c");
        clear_dir(tmp.path()).unwrap();
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        let fresh = tmp.path().join("new");
        clear_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
    }
}
