use crate::build::build_config;
use crate::options::Options;
use crate::parser::{load_config_file, parse_config};
use ferry_backends::folder::DEFAULT_FOLDER_AUTHOR;
use ferry_core::glob::{check_normalized_relative, to_slash};
use ferry_core::{Author, Authoring, Console, FerryError, Glob, Origin, Result, Revision};
use ferry_workflow::{Config, ConfigLoader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

fn to_validation(e: anyhow::Error) -> FerryError {
    FerryError::validation(format!("{e:#}"))
}

/// Loads the configuration from a local file.
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    path: PathBuf,
    options: Options,
}

impl FileConfigLoader {
    pub fn new(path: impl Into<PathBuf>, options: Options) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl ConfigLoader for FileConfigLoader {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self, console: &dyn Console) -> Result<Config> {
        console.progress(&format!("Loading config {}", self.location()));
        let file = load_config_file(&self.path).map_err(to_validation)?;
        build_config(&file, &self.location(), &self.path, &self.options)
    }

    /// A local file has no history; every revision sees the same content.
    fn load_for_revision(&self, console: &dyn Console, _revision: &Revision) -> Result<Config> {
        self.load(console)
    }
}

/// Loads the configuration stored in the origin itself, at the revision
/// being migrated.
pub struct OriginConfigLoader {
    origin: Arc<dyn Origin>,
    /// Path of the configuration file inside the origin tree.
    path_in_origin: String,
    local: FileConfigLoader,
}

impl OriginConfigLoader {
    /// `local` supplies the startup configuration and the build options.
    pub fn new(
        origin: Arc<dyn Origin>,
        path_in_origin: impl Into<String>,
        local: FileConfigLoader,
    ) -> Result<Self> {
        let path_in_origin = path_in_origin.into();
        check_normalized_relative(&path_in_origin)?;
        Ok(Self {
            origin,
            path_in_origin,
            local,
        })
    }

    pub fn path_in_origin(&self) -> &str {
        &self.path_in_origin
    }
}

impl ConfigLoader for OriginConfigLoader {
    fn location(&self) -> String {
        format!("{}:{}", self.origin.describe(), self.path_in_origin)
    }

    fn load(&self, console: &dyn Console) -> Result<Config> {
        self.local.load(console)
    }

    fn load_for_revision(&self, console: &dyn Console, revision: &Revision) -> Result<Config> {
        let location = format!("{}@{}", self.location(), revision);
        console.progress(&format!("Loading config {location}"));
        info!(config = %location, "loading configuration from origin");

        let glob = Glob::new([self.path_in_origin.clone()], None)?;
        let authoring = Authoring::overwrite(Author::parse(DEFAULT_FOLDER_AUTHOR)?);
        let reader = self.origin.new_reader(&glob, &authoring)?;
        let tmp = tempfile::tempdir()?;
        reader.checkout(revision, tmp.path())?;

        let path = tmp.path().join(&self.path_in_origin);
        let content = std::fs::read_to_string(&path).map_err(|_| {
            FerryError::validation(format!(
                "Cannot find '{}' in the origin at revision {revision}",
                self.path_in_origin
            ))
        })?;
        let file = parse_config(&content)
            .map_err(|e| to_validation(e.context(format!("parsing {location}"))))?;
        build_config(&file, &location, self.local.path(), self.local.options())
    }
}

/// Path of `config` relative to `root`, with forward slashes.
pub fn relative_config_path(config: &Path, root: &Path) -> Result<String> {
    let config = config.canonicalize()?;
    let root = root.canonicalize()?;
    let rel = config.strip_prefix(&root).map_err(|_| {
        FerryError::validation(format!(
            "Configuration '{}' is not inside the config root '{}'",
            config.display(),
            root.display()
        ))
    })?;
    Ok(to_slash(rel))
}
