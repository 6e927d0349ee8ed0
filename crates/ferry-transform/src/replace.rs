use crate::transformation::Transformation;
use crate::work::TransformWork;
use ferry_core::{Console, FerryError, Glob, Result};
use regex::{NoExpand, Regex};
use std::fs;
use tracing::debug;

/// Text replacement inside the files selected by `paths`.
///
/// `before` is matched literally unless `regex` is set. Regex replacements
/// expand `$1`-style groups in `after` and cannot be reversed.
#[derive(Debug, Clone)]
pub struct Replace {
    before: String,
    after: String,
    paths: Glob,
    regex: bool,
    pattern: Regex,
}

impl Replace {
    pub fn new(before: impl Into<String>, after: impl Into<String>, paths: Glob, regex: bool) -> Result<Self> {
        let before = before.into();
        if before.is_empty() {
            return Err(FerryError::validation("'before' must not be empty"));
        }
        let source = if regex { before.clone() } else { regex::escape(&before) };
        let pattern = Regex::new(&source)
            .map_err(|e| FerryError::validation(format!("invalid regex '{before}': {e}")))?;
        Ok(Self {
            before,
            after: after.into(),
            paths,
            regex,
            pattern,
        })
    }

    fn apply(&self, content: &str) -> Option<String> {
        if !self.pattern.is_match(content) {
            return None;
        }
        let replaced = if self.regex {
            self.pattern.replace_all(content, self.after.as_str())
        } else {
            self.pattern.replace_all(content, NoExpand(self.after.as_str()))
        };
        Some(replaced.into_owned())
    }
}

impl Transformation for Replace {
    fn transform<'a>(
        &self,
        work: TransformWork<'a>,
        console: &dyn Console,
    ) -> Result<TransformWork<'a>> {
        let mut changed = 0;
        for rel in work.tree_state().find(&self.paths)? {
            let path = work.checkout_path(&rel)?;
            if fs::symlink_metadata(&path)?.file_type().is_symlink() {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                debug!(path = %rel, "skipping non-UTF-8 file");
                continue;
            };
            if let Some(updated) = self.apply(&content) {
                fs::write(&path, updated)?;
                changed += 1;
            }
        }
        if changed == 0 {
            let msg = format!(
                "Transformation '{}' was a no-op because it didn't change any of the matching files",
                self.describe()
            );
            if work.ignore_noop() {
                console.warn(&msg);
            } else {
                return Err(FerryError::VoidOperation(msg));
            }
        }
        Ok(work)
    }

    fn reverse(&self) -> Result<Box<dyn Transformation>> {
        if self.regex {
            return Err(FerryError::NonReversible(format!(
                "regex replace '{}' cannot be reversed",
                self.before
            )));
        }
        if self.after.is_empty() {
            return Err(FerryError::NonReversible(format!(
                "replace of '{}' with an empty string cannot be reversed",
                self.before
            )));
        }
        Ok(Box::new(Replace::new(
            self.after.clone(),
            self.before.clone(),
            self.paths.clone(),
            false,
        )?))
    }

    fn describe(&self) -> String {
        format!("Replace {}", self.before)
    }
}
