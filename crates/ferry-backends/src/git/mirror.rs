use super::repository::GitRepo;
use ferry_core::{Console, FerryError, Result};
use ferry_store::StorePaths;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// `origin[:destination]` ref pattern pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refspec {
    pub origin: String,
    pub destination: String,
}

impl Refspec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (origin, destination) = match spec.split_once(':') {
            Some((o, d)) => (o, d),
            None => (spec, spec),
        };
        if origin.is_empty() || destination.is_empty() || origin.starts_with('+') {
            return Err(FerryError::validation(format!("Invalid refspec '{spec}'")));
        }
        if origin.contains('*') != destination.contains('*') {
            return Err(FerryError::validation(format!(
                "Wildcard only used in one side of the refspec '{spec}'"
            )));
        }
        Ok(Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
        })
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.destination)
    }
}

/// Copies refs verbatim from one repository to another.
#[derive(Debug, Clone)]
pub struct GitMirror {
    name: String,
    origin: String,
    destination: String,
    refspecs: Vec<Refspec>,
    prune: bool,
    dry_run: bool,
    cache_dir: PathBuf,
    cache_lock: PathBuf,
}

impl GitMirror {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        refspecs: Vec<Refspec>,
        prune: bool,
        store: &StorePaths,
    ) -> Result<Self> {
        let origin = origin.into();
        if refspecs.is_empty() {
            return Err(FerryError::validation("At least one refspec is required"));
        }
        Ok(Self {
            name: name.into(),
            cache_dir: store.repo_cache(&origin),
            cache_lock: store.repo_cache_lock(&origin),
            origin,
            destination: destination.into(),
            refspecs,
            prune,
            dry_run: false,
        })
    }

    /// Fetch as usual but only simulate the push.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn describe(&self) -> String {
        format!("git.mirror(origin = {}, destination = {})", self.origin, self.destination)
    }

    /// Fetch into the local cache, then force-push to the destination.
    pub fn run(&self, console: &dyn Console) -> Result<()> {
        let _guard = ferry_store::lock_file(&self.cache_lock)
            .map_err(|e| FerryError::repo(format!("cannot lock git cache: {e:#}")))?;
        let repo = GitRepo::init_bare(&self.cache_dir)?;

        let fetch: Vec<String> = self
            .refspecs
            .iter()
            .map(|r| format!("+{}:{}", r.origin, r.origin))
            .collect();
        let fetch: Vec<&str> = fetch.iter().map(String::as_str).collect();
        console.progress(&format!("Git Mirror: Fetching {}", self.origin));
        info!(origin = %self.origin, "fetching mirror origin");
        if !repo.fetch(&self.origin, &fetch)? {
            return Err(FerryError::repo(format!(
                "None of the refspecs matched in '{}'",
                self.origin
            )));
        }

        let push: Vec<String> = self
            .refspecs
            .iter()
            .map(|r| format!("+{}:{}", r.origin, r.destination))
            .collect();
        let mut args = vec!["push", "-q"];
        if self.prune {
            args.push("--prune");
        }
        if self.dry_run {
            args.push("--dry-run");
        }
        args.push(&self.destination);
        args.extend(push.iter().map(String::as_str));

        console.progress(&format!("Git Mirror: Pushing to {}", self.destination));
        repo.simple_command(&args)?;
        Ok(())
    }
}
