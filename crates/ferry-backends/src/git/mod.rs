//! Git origin, destination and mirror, driven through the `git` CLI.

mod destination;
mod mirror;
mod origin;
mod repository;

pub use destination::GitDestination;
pub use mirror::{GitMirror, Refspec};
pub use origin::{GitOrigin, GIT_ORIGIN_REV_ID};
pub use repository::{GitOutput, GitRepo};

/// Command-line knobs for git destinations.
#[derive(Debug, Clone, Default)]
pub struct GitOptions {
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    /// The fetch ref does not exist yet; push the first commit anyway.
    pub first_commit: bool,
}
