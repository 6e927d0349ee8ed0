//! Plain directories as origin and destination.

use ferry_core::fsutil::{clear_dir, copy_tree, delete_matching, list_files};
use ferry_core::hash::sha256_hex;
use ferry_core::{
    Author, Authoring, Change, ChangesResponse, Console, Destination, DestinationEffect,
    EffectKind, FerryError, Glob, Origin, Reader, Result, Revision, TransformResult, VisitResult,
    Writer, WriterContext, WriterResult, WriterState,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const FOLDER_ORIGIN_REV_ID: &str = "FolderOrigin-RevId";
pub const DEFAULT_FOLDER_AUTHOR: &str = "Ferry <noreply@ferry.invalid>";
pub const DEFAULT_FOLDER_MESSAGE: &str = "Ferry code migration";

// ── Origin ──

/// Origin whose single revision is a directory passed on the command line.
#[derive(Debug, Clone)]
pub struct FolderOrigin {
    author: Author,
    message: String,
    cwd: PathBuf,
    materialize_outside_symlinks: bool,
}

impl FolderOrigin {
    pub fn new(author: Author, message: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            author,
            message: message.into(),
            cwd,
            materialize_outside_symlinks: false,
        }
    }

    /// Copy the target content of symlinks leaving the folder instead of
    /// failing the checkout.
    pub fn with_materialize_outside_symlinks(mut self, materialize: bool) -> Self {
        self.materialize_outside_symlinks = materialize;
        self
    }
}

impl Origin for FolderOrigin {
    fn resolve(&self, reference: Option<&str>) -> Result<Revision> {
        let reference = reference.filter(|r| !r.is_empty()).ok_or_else(|| {
            FerryError::CannotResolveRevision(
                "A path is expected as reference in the command line. Invoke ferry as: \
                 ferry migrate <config> <workflow> <source_path>"
                    .into(),
            )
        })?;
        let path = self.cwd.join(reference);
        if !path.is_dir() {
            return Err(FerryError::CannotResolveRevision(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let path = path.canonicalize()?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        Ok(Revision::new(path.to_string_lossy())
            .with_context_ref(reference)
            .with_timestamp(now))
    }

    fn new_reader(&self, origin_files: &Glob, authoring: &Authoring) -> Result<Box<dyn Reader>> {
        Ok(Box::new(FolderReader {
            origin: self.clone(),
            files: origin_files.clone(),
            author: authoring.resolve(&self.author),
        }))
    }

    fn label_name(&self) -> &str {
        FOLDER_ORIGIN_REV_ID
    }

    fn describe(&self) -> String {
        "folder.origin".to_string()
    }
}

struct FolderReader {
    origin: FolderOrigin,
    files: Glob,
    author: Author,
}

impl FolderReader {
    fn copy_symlink(&self, root: &Path, src: &Path, dest: &Path, rel: &str) -> Result<()> {
        let inside = src.canonicalize().map(|t| t.starts_with(root)).unwrap_or(false);
        if inside {
            #[cfg(unix)]
            std::os::unix::fs::symlink(fs::read_link(src)?, dest)?;
            #[cfg(not(unix))]
            fs::copy(src, dest)?;
            return Ok(());
        }
        if !self.origin.materialize_outside_symlinks {
            return Err(FerryError::validation(format!(
                "Cannot copy '{rel}': it is a symlink to a path outside of the folder"
            )));
        }
        debug!(file = rel, "materializing symlink target");
        fs::copy(src, dest)?;
        Ok(())
    }
}

impl Reader for FolderReader {
    fn checkout(&self, revision: &Revision, workdir: &Path) -> Result<()> {
        let root = PathBuf::from(revision.as_str()).canonicalize()?;
        clear_dir(workdir)?;
        let files = list_files(&root, &self.files, &[])?;
        info!(root = %root.display(), files = files.len(), "checking out folder");
        for rel in &files {
            let src = root.join(rel);
            let dest = workdir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            if fs::symlink_metadata(&src)?.file_type().is_symlink() {
                self.copy_symlink(&root, &src, &dest, rel)?;
            } else {
                fs::copy(&src, &dest)?;
            }
        }
        Ok(())
    }

    fn changes(&self, _from: Option<&Revision>, to: &Revision) -> Result<ChangesResponse> {
        Ok(ChangesResponse::for_changes(vec![self.change(to)?]))
    }

    fn change(&self, revision: &Revision) -> Result<Change> {
        let timestamp = revision
            .timestamp()
            .unwrap_or_else(|| time::OffsetDateTime::now_utc().unix_timestamp());
        Ok(Change::new(
            revision.clone(),
            self.author.clone(),
            self.origin.message.clone(),
            timestamp,
        ))
    }

    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut dyn FnMut(&Change) -> VisitResult,
    ) -> Result<()> {
        visitor(&self.change(start)?);
        Ok(())
    }
}

// ── Destination ──

/// Writes the migrated tree into a local directory.
#[derive(Debug, Clone)]
pub struct FolderDestination {
    folder: PathBuf,
    allow_empty_diff: bool,
}

impl FolderDestination {
    pub fn new(folder: PathBuf) -> Self {
        Self {
            folder,
            allow_empty_diff: false,
        }
    }

    pub fn with_allow_empty_diff(mut self, allow: bool) -> Self {
        self.allow_empty_diff = allow;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl Destination for FolderDestination {
    fn new_writer(&self, ctx: WriterContext) -> Result<Box<dyn Writer>> {
        Ok(Box::new(FolderWriter {
            destination: self.clone(),
            dry_run: ctx.dry_run,
            state: ctx.previous_state.unwrap_or_default(),
        }))
    }

    fn previous_ref(&self, _label_name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn label_name_when_origin(&self) -> &str {
        FOLDER_ORIGIN_REV_ID
    }

    fn describe(&self) -> String {
        format!("folder.destination({})", self.folder.display())
    }
}

struct FolderWriter {
    destination: FolderDestination,
    dry_run: bool,
    state: WriterState,
}

/// Path to content digest; symlinks hash their target.
fn snapshot(root: &Path, glob: &Glob) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for rel in list_files(root, glob, &[])? {
        let path = root.join(&rel);
        let digest = if fs::symlink_metadata(&path)?.file_type().is_symlink() {
            sha256_hex(fs::read_link(&path)?.to_string_lossy().as_bytes())
        } else {
            sha256_hex(&fs::read(&path)?)
        };
        out.insert(rel, digest);
    }
    Ok(out)
}

impl Writer for FolderWriter {
    fn write(&mut self, result: &TransformResult, console: &dyn Console) -> Result<WriterResult> {
        self.state.check_not_written(&result.origin_ref)?;
        let folder = &self.destination.folder;
        fs::create_dir_all(folder)?;
        let glob = &result.destination_files;

        let before = snapshot(folder, glob)?;
        let after = snapshot(&result.path, glob)?;
        if before == after && !self.destination.allow_empty_diff {
            return Err(FerryError::empty_change(format!(
                "Folder '{}' already contains the migrated files",
                folder.display()
            )));
        }

        let kind = if before.is_empty() {
            EffectKind::Created
        } else {
            EffectKind::Updated
        };
        if self.dry_run {
            console.info(&format!(
                "FolderDestination: dry run, not writing into {}",
                folder.display()
            ));
        } else {
            console.progress(&format!("FolderDestination: Writing into {}", folder.display()));
            delete_matching(folder, glob, &[])?;
            copy_tree(&result.path, folder, glob)?;
        }
        self.state.record(&result.origin_ref);
        Ok(WriterResult::with_effect(
            DestinationEffect::new(
                kind,
                format!("{} file(s) written into {}", after.len(), folder.display()),
                &result.origin_ref,
            )
            .with_destination_ref(folder.to_string_lossy()),
        ))
    }

    fn state(&self) -> WriterState {
        self.state.clone()
    }
}
