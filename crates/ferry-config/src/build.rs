//! Turns a parsed [`ConfigFile`] into runnable migrations.

use crate::options::Options;
use crate::schema::{
    AuthoringSpec, ConfigFile, DestinationSpec, GlobSpec, MirrorSpec, OriginSpec, TransformSpec,
    WorkflowSpec,
};
use ferry_backends::folder::{DEFAULT_FOLDER_AUTHOR, DEFAULT_FOLDER_MESSAGE};
use ferry_backends::{FolderDestination, FolderOrigin, GitDestination, GitMirror, GitOrigin, Refspec};
use ferry_core::{
    Author, Authoring, AuthoringMode, Destination, FerryError, Glob, Origin, Result,
};
use ferry_transform::{MapAuthor, Move, Replace, Sequence, Transformation};
use ferry_workflow::{Config, Migration, Workflow};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Build every migration of `file`.
///
/// `config_path` identifies the configuration in the store (work and scratch
/// directories); `location` is how messages refer to it.
pub fn build_config(
    file: &ConfigFile,
    location: &str,
    config_path: &Path,
    options: &Options,
) -> Result<Config> {
    let mut config = Config::new(location);
    for spec in &file.workflows {
        let workflow = build_workflow(spec, config_path, options)?;
        config.add(Migration::Workflow(workflow))?;
    }
    for spec in &file.mirrors {
        config.add(Migration::Mirror(build_mirror(spec, options)?))?;
    }
    debug!(location, migrations = file.workflows.len() + file.mirrors.len(), "configuration built");
    Ok(config)
}

pub fn build_workflow(spec: &WorkflowSpec, config_path: &Path, options: &Options) -> Result<Workflow> {
    let field = |name: &'static str| {
        let workflow = spec.name.clone();
        move |e: FerryError| match e {
            FerryError::Validation(msg) => {
                FerryError::Validation(format!("workflow '{workflow}', {name}: {msg}"))
            }
            other => other,
        }
    };

    let origin = build_origin(&spec.origin, options).map_err(field("origin"))?;
    let destination = build_destination(spec, config_path, options).map_err(field("destination"))?;
    let authoring = build_authoring(&spec.authoring).map_err(field("authoring"))?;

    let mut steps = Vec::with_capacity(spec.transformations.len());
    for step in &spec.transformations {
        steps.push(build_transformation(step).map_err(field(step.type_name()))?);
    }

    let mut workflow = Workflow::new(&spec.name, origin, destination, authoring)
        .with_transformation(Sequence::create(steps))
        .with_origin_files(build_glob(spec.origin_files.as_ref()).map_err(field("origin_files"))?)
        .with_destination_files(
            build_glob(spec.destination_files.as_ref()).map_err(field("destination_files"))?,
        )
        .with_mode(spec.mode)
        .with_ask_for_confirmation(spec.ask_for_confirmation)
        .with_ignore_noop(spec.ignore_noop)
        .with_options(options.workflow.clone());
    if spec.check_reversible {
        workflow = workflow.with_reversible_check()?;
    }
    Ok(workflow)
}

fn build_origin(spec: &OriginSpec, options: &Options) -> Result<Arc<dyn Origin>> {
    let origin: Arc<dyn Origin> = match spec {
        OriginSpec::Git {
            url,
            reference,
            first_parent,
        } => Arc::new(
            GitOrigin::new(url.as_str(), reference.clone(), &options.general.store)
                .with_first_parent(*first_parent),
        ),
        OriginSpec::Folder {
            author,
            message,
            materialize_outside_symlinks,
        } => {
            let author = Author::parse(author.as_deref().unwrap_or(DEFAULT_FOLDER_AUTHOR))?;
            Arc::new(
                FolderOrigin::new(
                    author,
                    message.as_deref().unwrap_or(DEFAULT_FOLDER_MESSAGE),
                    options.general.cwd.clone(),
                )
                .with_materialize_outside_symlinks(
                    *materialize_outside_symlinks || options.folder.materialize_outside_symlinks,
                ),
            )
        }
    };
    Ok(origin)
}

fn build_destination(
    spec: &WorkflowSpec,
    config_path: &Path,
    options: &Options,
) -> Result<Arc<dyn Destination>> {
    match &spec.destination {
        DestinationSpec::Git { url, fetch, push } => {
            let scratch_root = match &options.general.work_dir {
                Some(dir) => dir.join("scratch"),
                None => options.general.store.scratch_dir(config_path, &spec.name),
            };
            Ok(Arc::new(
                GitDestination::new(
                    url.as_str(),
                    fetch.as_str(),
                    push.as_deref().unwrap_or(fetch),
                    scratch_root,
                    options.git.clone(),
                )
                .with_allow_empty_diff(spec.allow_empty_diff),
            ))
        }
        DestinationSpec::Folder { path } => {
            let folder = options
                .folder
                .folder_dir
                .clone()
                .or_else(|| path.as_deref().map(|p| options.resolve_path(p)))
                .ok_or_else(|| {
                    FerryError::validation(
                        "a folder destination needs a 'path' or the --folder-dir flag",
                    )
                })?;
            Ok(Arc::new(
                FolderDestination::new(folder).with_allow_empty_diff(spec.allow_empty_diff),
            ))
        }
    }
}

fn build_authoring(spec: &AuthoringSpec) -> Result<Authoring> {
    let default = Author::parse(&spec.default)?;
    match spec.mode {
        AuthoringMode::Allowlist => Authoring::allowlisted(default, &spec.allowlist),
        mode if !spec.allowlist.is_empty() => Err(FerryError::validation(format!(
            "'allowlist' is only valid with mode 'allowlist', not '{}'",
            mode_name(mode)
        ))),
        AuthoringMode::PassThru => Ok(Authoring::pass_thru(default)),
        AuthoringMode::Overwrite => Ok(Authoring::overwrite(default)),
    }
}

fn mode_name(mode: AuthoringMode) -> &'static str {
    match mode {
        AuthoringMode::Overwrite => "overwrite",
        AuthoringMode::PassThru => "pass_thru",
        AuthoringMode::Allowlist => "allowlist",
    }
}

fn build_transformation(spec: &TransformSpec) -> Result<Box<dyn Transformation>> {
    let step: Box<dyn Transformation> = match spec {
        TransformSpec::Move { before, after } => Box::new(Move::new(before.as_str(), after.as_str())?),
        TransformSpec::Replace {
            before,
            after,
            paths,
            regex,
        } => Box::new(Replace::new(
            before.as_str(),
            after.as_str(),
            build_glob(paths.as_ref())?,
            *regex,
        )?),
        TransformSpec::MapAuthor {
            map,
            reversible,
            fail_if_not_found,
            fail_if_not_found_in_reverse,
        } => Box::new(MapAuthor::new(
            map.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            *reversible,
            *fail_if_not_found,
            *fail_if_not_found_in_reverse,
        )?),
    };
    Ok(step)
}

/// Absent selectors select every file.
pub fn build_glob(spec: Option<&GlobSpec>) -> Result<Glob> {
    match spec {
        None => Ok(Glob::all_files()),
        Some(GlobSpec::List(include)) => Glob::new(include.iter().cloned(), None),
        Some(GlobSpec::Split { include, exclude }) => {
            let exclude = if exclude.is_empty() {
                None
            } else {
                Some(Glob::new(exclude.iter().cloned(), None)?)
            };
            Glob::new(include.iter().cloned(), exclude)
        }
    }
}

fn build_mirror(spec: &MirrorSpec, options: &Options) -> Result<GitMirror> {
    let refspecs = spec
        .refspecs
        .iter()
        .map(|r| Refspec::parse(r))
        .collect::<Result<Vec<_>>>()?;
    Ok(GitMirror::new(
        spec.name.as_str(),
        spec.origin.as_str(),
        spec.destination.as_str(),
        refspecs,
        spec.prune,
        &options.general.store,
    )?
    .with_dry_run(options.workflow.dry_run))
}
