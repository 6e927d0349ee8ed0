use crate::error::{FerryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A change author. Canonical form is `Name <email>`.
///
/// Equality only looks at the email, which is what authoring policies
/// use to identify people.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Parse `Name <email>`. The email may be empty (`Name <>`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || {
            FerryError::validation(format!(
                "Author '{s}' doesn't match the expected format 'name <mail@example.com>'"
            ))
        };
        let open = s.find('<').ok_or_else(invalid)?;
        if !s.ends_with('>') || s[open + 1..].contains('<') {
            return Err(invalid());
        }
        let name = s[..open].trim();
        let email = s[open + 1..s.len() - 1].trim();
        if name.is_empty() || email.contains('>') {
            return Err(invalid());
        }
        Ok(Self::new(name, email))
    }
}

impl PartialEq for Author {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
    }
}

impl Eq for Author {}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

impl FromStr for Author {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        Author::parse(s)
    }
}

// ── Authoring ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoringMode {
    /// Always use the default author.
    Overwrite,
    /// Keep the origin author.
    PassThru,
    /// Keep the origin author only when listed; default otherwise.
    Allowlist,
}

/// Decides which author ends up on destination changes.
#[derive(Debug, Clone)]
pub struct Authoring {
    default_author: Author,
    mode: AuthoringMode,
    allowlist: BTreeSet<String>,
}

impl Authoring {
    pub fn overwrite(default_author: Author) -> Self {
        Self {
            default_author,
            mode: AuthoringMode::Overwrite,
            allowlist: BTreeSet::new(),
        }
    }

    pub fn pass_thru(default_author: Author) -> Self {
        Self {
            default_author,
            mode: AuthoringMode::PassThru,
            allowlist: BTreeSet::new(),
        }
    }

    /// Allow-list mode. The list must be non-empty and duplicate-free.
    pub fn allowlisted(default_author: Author, entries: &[String]) -> Result<Self> {
        if entries.is_empty() {
            return Err(FerryError::validation(
                "'allowlisted' function requires a non-empty 'allowlist' field. \
                 For default mapping, use 'overwrite(...)' mode instead.",
            ));
        }
        let mut allowlist = BTreeSet::new();
        for entry in entries {
            if !allowlist.insert(entry.clone()) {
                return Err(FerryError::validation(format!(
                    "Duplicated allowlist entry '{entry}'"
                )));
            }
        }
        Ok(Self {
            default_author,
            mode: AuthoringMode::Allowlist,
            allowlist,
        })
    }

    pub fn default_author(&self) -> &Author {
        &self.default_author
    }

    pub fn mode(&self) -> AuthoringMode {
        self.mode
    }

    pub fn allowlist(&self) -> impl Iterator<Item = &str> {
        self.allowlist.iter().map(String::as_str)
    }

    /// Whether the origin author identified by `email` is kept.
    pub fn use_author(&self, email: &str) -> bool {
        match self.mode {
            AuthoringMode::Overwrite => false,
            AuthoringMode::PassThru => true,
            AuthoringMode::Allowlist => self.allowlist.contains(email),
        }
    }

    /// The author a destination change gets for an origin `author`.
    pub fn resolve(&self, author: &Author) -> Author {
        if self.use_author(&author.email) {
            author.clone()
        } else {
            self.default_author.clone()
        }
    }
}
