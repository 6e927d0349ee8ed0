use crate::transformation::Transformation;
use crate::work::TransformWork;
use ferry_core::glob::check_normalized_relative;
use ferry_core::{Console, FerryError, Result};
use std::fs;
use std::path::Path;

/// Moves a file or directory inside the checkout. An empty `before` moves
/// the whole tree under `after`; an empty `after` moves `before`'s
/// contents to the root.
#[derive(Debug, Clone)]
pub struct Move {
    before: String,
    after: String,
}

impl Move {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Result<Self> {
        let before = before.into();
        let after = after.into();
        if before == after {
            return Err(FerryError::validation(format!(
                "Moving from the same folder to the same folder is a noop: '{before}'"
            )));
        }
        for path in [&before, &after] {
            if !path.is_empty() {
                check_normalized_relative(path)?;
            }
        }
        if !before.is_empty() && !after.is_empty() && is_nested(&before, &after) {
            return Err(FerryError::validation(format!(
                "Cannot move '{before}' to '{after}': one path contains the other"
            )));
        }
        Ok(Self { before, after })
    }
}

fn is_nested(a: &str, b: &str) -> bool {
    b.starts_with(&format!("{a}/")) || a.starts_with(&format!("{b}/"))
}

impl Transformation for Move {
    fn transform<'a>(
        &self,
        work: TransformWork<'a>,
        console: &dyn Console,
    ) -> Result<TransformWork<'a>> {
        let root = work.checkout_dir();
        let src = work.checkout_path(&self.before)?;
        let dest = work.checkout_path(&self.after)?;

        if fs::symlink_metadata(&src).is_err() {
            let msg = format!(
                "Error moving '{}'. It doesn't exist in the workdir",
                self.before
            );
            if work.ignore_noop() {
                console.warn(&msg);
                return Ok(work);
            }
            return Err(FerryError::VoidOperation(msg));
        }

        if self.before.is_empty() {
            let keep = self.after.split('/').next().unwrap_or_default();
            let staging = root.join(format!(".ferry-move-{}", std::process::id()));
            fs::create_dir_all(&staging)?;
            for entry in fs::read_dir(root)? {
                let entry = entry?;
                if entry.file_name() == keep || entry.path() == staging {
                    continue;
                }
                fs::rename(entry.path(), staging.join(entry.file_name()))?;
            }
            move_into(&staging, &dest)?;
            fs::remove_dir(&staging)?;
        } else if self.after.is_empty() {
            move_into(&src, root)?;
            fs::remove_dir(&src)?;
        } else {
            if fs::symlink_metadata(&dest).is_ok() {
                return Err(FerryError::validation(format!(
                    "Cannot move file to '{}' because it already exists",
                    self.after
                )));
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&src, &dest)?;
        }
        remove_empty_parents(root, &src)?;
        Ok(work)
    }

    /// A move to the root cannot be undone: the reverse would also sweep up
    /// root entries that were never under `before`.
    fn reverse(&self) -> Result<Box<dyn Transformation>> {
        if self.after.is_empty() {
            return Err(FerryError::NonReversible(format!(
                "Moving '{}' to the root is not reversible",
                self.before
            )));
        }
        Ok(Box::new(Move {
            before: self.after.clone(),
            after: self.before.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("Moving {}", self.before)
    }
}

/// Move every entry of directory `from` into directory `to`.
fn move_into(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if fs::symlink_metadata(&target).is_ok() {
            return Err(FerryError::validation(format!(
                "Cannot move file to '{}' because it already exists",
                target.display()
            )));
        }
        fs::rename(entry.path(), target)?;
    }
    Ok(())
}

fn remove_empty_parents(root: &Path, moved: &Path) -> Result<()> {
    let mut dir = moved.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        let empty = match fs::read_dir(d) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if !empty {
            break;
        }
        fs::remove_dir(d)?;
        dir = d.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treestate::TreeState;
    use crate::work::Metadata;
    use ferry_core::{Author, Revision, TestingConsole};

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    fn apply(t: &dyn Transformation, root: &Path, ignore_noop: bool) -> Result<()> {
        let rev = Revision::new("r1");
        let work = TransformWork::new(
            root,
            Metadata::new("msg", Author::new("A", "a@x")),
            &[],
            &rev,
            ignore_noop,
        );
        t.transform(work, &TestingConsole::new()).map(|_| ())
    }

    fn files(root: &Path) -> Vec<String> {
        TreeState::new(root).files().unwrap().keys().cloned().collect()
    }

    #[test]
    fn moves_file_and_cleans_empty_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "old/dir/a.txt", "a");
        apply(&Move::new("old/dir/a.txt", "new/a.txt").unwrap(), tmp.path(), false).unwrap();
        assert_eq!(files(tmp.path()), vec!["new/a.txt"]);
        assert!(!tmp.path().join("old").exists());
    }

    #[test]
    fn move_root_into_subdir_and_back() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.txt", "a");
        write(tmp.path(), "src/b.rs", "b");
        let before = TreeState::new(tmp.path()).fingerprint().unwrap();

        let t = Move::new("", "third_party/lib").unwrap();
        apply(&t, tmp.path(), false).unwrap();
        assert_eq!(
            files(tmp.path()),
            vec!["third_party/lib/a.txt", "third_party/lib/src/b.rs"]
        );

        apply(t.reverse().unwrap().as_ref(), tmp.path(), false).unwrap();
        assert_eq!(TreeState::new(tmp.path()).fingerprint().unwrap(), before);
    }

    #[test]
    fn move_to_root_is_not_reversible() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b", "b");
        write(tmp.path(), "dir/a", "a");

        let t = Move::new("dir", "").unwrap();
        apply(&t, tmp.path(), false).unwrap();
        assert_eq!(files(tmp.path()), vec!["a", "b"]);
        assert!(matches!(t.reverse().unwrap_err(), FerryError::NonReversible(m) if m.contains("'dir'")));
    }

    #[test]
    fn missing_source_is_void_unless_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let t = Move::new("missing", "dest").unwrap();
        let err = apply(&t, tmp.path(), false).unwrap_err();
        assert!(matches!(err, FerryError::VoidOperation(_)));
        apply(&t, tmp.path(), true).unwrap();
    }

    #[test]
    fn refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a", "1");
        write(tmp.path(), "b", "2");
        assert!(apply(&Move::new("a", "b").unwrap(), tmp.path(), false).is_err());
    }

    #[test]
    fn construction_checks() {
        assert!(Move::new("a", "a").is_err());
        assert!(Move::new("a", "a/b").is_err());
        assert!(Move::new("../a", "b").is_err());
        assert!(Move::new("ab", "a").is_ok());
    }
}
