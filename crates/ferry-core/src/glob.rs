//! Include/exclude path selectors.
//!
//! A [`Glob`] is an ordered list of include patterns plus an optional
//! nested exclude glob. A relative path is selected when it matches any
//! include and does not match the exclude. `*` never crosses a `/`, `**`
//! does.

use crate::error::{FerryError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

const META_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', '\\'];

#[derive(Debug, Clone)]
pub struct Glob {
    include: Vec<String>,
    exclude: Option<Box<Glob>>,
    set: GlobSet,
}

impl Glob {
    /// Build a glob. Every include must be a non-empty, normalized relative
    /// path pattern.
    pub fn new<I, S>(include: I, exclude: Option<Glob>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let include: Vec<String> = include.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &include {
            check_normalized_relative(pattern)?;
            let compiled = GlobBuilder::new(&expand_leading_recursive(pattern))
                .literal_separator(true)
                .build()
                .map_err(|e| FerryError::validation(format!("invalid glob '{pattern}': {e}")))?;
            builder.add(compiled);
        }
        let set = builder
            .build()
            .map_err(|e| FerryError::validation(format!("invalid glob: {e}")))?;
        Ok(Self {
            include,
            exclude: exclude.map(Box::new),
            set,
        })
    }

    /// Selects every file (`**`).
    pub fn all_files() -> Self {
        Self::from_static(&["**"])
    }

    /// Selects nothing.
    pub fn none() -> Self {
        Self::from_static(&[])
    }

    fn from_static(patterns: &[&str]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            if let Ok(g) = GlobBuilder::new(p).literal_separator(true).build() {
                builder.add(g);
            }
        }
        Self {
            include: patterns.iter().map(|p| p.to_string()).collect(),
            exclude: None,
            set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    pub fn includes(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> Option<&Glob> {
        self.exclude.as_deref()
    }

    /// Does the `/`-separated relative path belong to the selection?
    pub fn matches(&self, relative: &str) -> bool {
        let relative = relative.trim_start_matches("./");
        self.set.is_match(relative)
            && !self.exclude.as_ref().is_some_and(|e| e.matches(relative))
    }

    /// Bind the glob to a root directory so absolute paths can be tested.
    pub fn relative_to<'a>(&'a self, root: &'a Path) -> PathMatcher<'a> {
        PathMatcher { glob: self, root }
    }

    /// Shallowest literal directories that can contain selected files.
    ///
    /// `""` means the whole tree has to be walked.
    pub fn roots(&self) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        for pattern in &self.include {
            let segments: Vec<&str> = pattern.split('/').collect();
            let mut literal = Vec::new();
            for seg in &segments[..segments.len() - 1] {
                if seg.contains(META_CHARS) {
                    break;
                }
                literal.push(*seg);
            }
            candidates.insert(literal.join("/"));
        }
        if candidates.contains("") {
            return BTreeSet::from([String::new()]);
        }
        let mut roots = BTreeSet::new();
        for root in &candidates {
            let nested = candidates
                .iter()
                .any(|other| other != root && root.starts_with(&format!("{other}/")));
            if !nested {
                roots.insert(root.clone());
            }
        }
        roots
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.include == other.include && self.exclude == other.exclude
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "glob(include = {}", quoted_list(&self.include))?;
        if let Some(exclude) = &self.exclude {
            write!(f, ", exclude = {}", quoted_list(&exclude.include))?;
        }
        f.write_str(")")
    }
}

fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("\"{i}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

/// A glob bound to a root directory.
pub struct PathMatcher<'a> {
    glob: &'a Glob,
    root: &'a Path,
}

impl PathMatcher<'_> {
    /// False for paths outside the root.
    pub fn matches(&self, path: &Path) -> bool {
        match path.strip_prefix(self.root) {
            Ok(rel) => self.glob.matches(&to_slash(rel)),
            Err(_) => false,
        }
    }
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject empty, absolute and non-normalized paths.
pub fn check_normalized_relative(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(FerryError::validation("unexpected empty string in glob list"));
    }
    if path.starts_with('/') {
        return Err(FerryError::validation(format!(
            "'{path}' is not a relative path"
        )));
    }
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." || seg == ".." {
            return Err(FerryError::validation(format!(
                "'{path}' is not a normalized path"
            )));
        }
    }
    Ok(())
}

/// `**.java` means "any .java file at any depth".
fn expand_leading_recursive(pattern: &str) -> String {
    match pattern.strip_prefix("**") {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => format!("**/*{rest}"),
        _ => pattern.to_string(),
    }
}
