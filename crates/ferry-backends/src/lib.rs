//! Origins and destinations: local folders, git repositories and
//! in-memory doubles for tests.

pub mod folder;
pub mod git;
pub mod testing;

pub use folder::{FolderDestination, FolderOrigin, FOLDER_ORIGIN_REV_ID};
pub use git::{GitDestination, GitMirror, GitOptions, GitOrigin, GitRepo, Refspec, GIT_ORIGIN_REV_ID};
