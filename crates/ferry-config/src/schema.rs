use ferry_core::AuthoringMode;
use ferry_workflow::WorkflowMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A configuration file: the migrations it defines.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,
    #[serde(default)]
    pub mirrors: Vec<MirrorSpec>,
}

impl ConfigFile {
    /// Names of every migration, workflows first.
    pub fn migration_names(&self) -> impl Iterator<Item = &str> {
        self.workflows
            .iter()
            .map(|w| w.name.as_str())
            .chain(self.mirrors.iter().map(|m| m.name.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    #[serde(default = "default_workflow_name")]
    pub name: String,
    pub origin: OriginSpec,
    pub destination: DestinationSpec,
    pub authoring: AuthoringSpec,
    #[serde(default)]
    pub origin_files: Option<GlobSpec>,
    #[serde(default)]
    pub destination_files: Option<GlobSpec>,
    #[serde(default)]
    pub mode: WorkflowMode,
    #[serde(default)]
    pub transformations: Vec<TransformSpec>,
    #[serde(default)]
    pub ask_for_confirmation: bool,
    #[serde(default)]
    pub check_reversible: bool,
    #[serde(default)]
    pub ignore_noop: bool,
    #[serde(default)]
    pub allow_empty_diff: bool,
}

/// Where changes are read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OriginSpec {
    Git {
        url: String,
        #[serde(default, rename = "ref")]
        reference: Option<String>,
        #[serde(default = "default_true")]
        first_parent: bool,
    },
    Folder {
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        materialize_outside_symlinks: bool,
    },
}

/// Where migrated changes are written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DestinationSpec {
    Git {
        url: String,
        #[serde(default = "default_branch")]
        fetch: String,
        /// Defaults to `fetch`.
        #[serde(default)]
        push: Option<String>,
    },
    Folder {
        #[serde(default)]
        path: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AuthoringSpec {
    /// Default author, `Name <email>`.
    pub default: String,
    #[serde(default = "default_authoring_mode")]
    pub mode: AuthoringMode,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

/// File selector. Either a plain list of include patterns or a mapping
/// with `include` and `exclude` lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GlobSpec {
    List(Vec<String>),
    Split {
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

/// One step of the transformation pipeline.
///
/// In YAML, steps can be written in short format (`move: {before: a, after: b}`)
/// or tagged format (`{ type: move, before: a, after: b }`).
/// Short format is normalized to tagged during parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    Move {
        before: String,
        after: String,
    },
    Replace {
        before: String,
        after: String,
        #[serde(default)]
        paths: Option<GlobSpec>,
        #[serde(default)]
        regex: bool,
    },
    MapAuthor {
        map: BTreeMap<String, String>,
        #[serde(default)]
        reversible: bool,
        #[serde(default)]
        fail_if_not_found: bool,
        #[serde(default)]
        fail_if_not_found_in_reverse: bool,
    },
}

impl TransformSpec {
    /// Human-readable type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            TransformSpec::Move { .. } => "move",
            TransformSpec::Replace { .. } => "replace",
            TransformSpec::MapAuthor { .. } => "map_author",
        }
    }
}

/// A git mirror: refs copied verbatim between two repositories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MirrorSpec {
    pub name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default = "default_refspecs")]
    pub refspecs: Vec<String>,
    #[serde(default)]
    pub prune: bool,
}

pub const TRANSFORM_TYPES: &[&str] = &["move", "replace", "map_author"];
pub const ORIGIN_TYPES: &[&str] = &["git", "folder"];
pub const DESTINATION_TYPES: &[&str] = &["git", "folder"];

fn default_workflow_name() -> String {
    "default".into()
}

fn default_true() -> bool {
    true
}

fn default_branch() -> String {
    "master".into()
}

fn default_authoring_mode() -> AuthoringMode {
    AuthoringMode::Overwrite
}

fn default_refspecs() -> Vec<String> {
    vec!["refs/heads/*".into()]
}
