//! Resolution of the input argument into load tasks.
//!
//! The input is a directory, a glob pattern or a single file. Directories are walked
//! recursively and keep their layout below the destination prefix; glob matches and single
//! files are stored by file name.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use globset::GlobBuilder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::task::LoadTask;

const GLOB_META_CHARS: &[char] = &['*', '?', '[', '{'];

fn has_glob_meta(component: &str) -> bool {
    component.contains(GLOB_META_CHARS)
}

/// Joins path components with `/`, whatever the platform separator.
fn to_destination_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Prefixes `relative` with the destination directory, if any.
fn join_destination(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Normalizes the destination directory: `/`-separated, without leading or trailing `/`.
fn normalize_prefix(dest_path: Option<&str>) -> String {
    dest_path
        .map(|path| {
            path.split(['/', '\\'])
                .filter(|part| !part.is_empty() && *part != ".")
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn file_name_destination(prefix: &str, path: &Path) -> LoadResult<String> {
    let Some(file_name) = path.file_name() else {
        bail!(
            ErrorKind::InvalidInput,
            "Input path has no file name",
            path.display()
        );
    };

    Ok(join_destination(prefix, &file_name.to_string_lossy()))
}

fn collect_directory(root: &Path, prefix: &str) -> LoadResult<Vec<LoadTask>> {
    let mut tasks = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        // Every walked entry lives below `root`.
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let destination = join_destination(prefix, &to_destination_path(relative));
        tasks.push(LoadTask::new(entry.path(), destination));
    }

    Ok(tasks)
}

/// Splits a glob into the directory to walk and the walk depth the pattern needs.
///
/// The depth is `None` when the pattern contains `**`.
fn glob_walk_root(pattern: &str) -> (PathBuf, Option<usize>) {
    let path = Path::new(pattern);
    let mut root = PathBuf::new();
    let mut components = path.components().peekable();

    while let Some(component) = components.peek() {
        if has_glob_meta(&component.as_os_str().to_string_lossy()) {
            break;
        }
        root.push(component.as_os_str());
        components.next();
    }

    let remaining: Vec<String> = components
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    let depth = if remaining.iter().any(|part| part.contains("**")) {
        None
    } else {
        Some(remaining.len())
    };

    (root, depth)
}

fn collect_glob(pattern: &str, prefix: &str) -> LoadResult<Vec<LoadTask>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let (root, depth) = glob_walk_root(pattern);
    let implicit_root = root.as_os_str().is_empty();
    let walk_root = if implicit_root {
        PathBuf::from(".")
    } else {
        root
    };

    debug!(pattern, root = %walk_root.display(), ?depth, "expanding glob");

    let mut walker = WalkDir::new(&walk_root).follow_links(true).sort_by_file_name();
    if let Some(depth) = depth {
        walker = walker.max_depth(depth);
    }

    let mut tasks = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // A pattern whose literal directory does not exist simply matches nothing.
            Err(err) if err.depth() == 0 && err.io_error().is_some() => break,
            Err(err) => return Err(err.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }

        // Relative patterns are matched without the `./` the walk adds.
        let candidate = if implicit_root {
            entry.path().strip_prefix(".").unwrap_or(entry.path())
        } else {
            entry.path()
        };
        if matcher.is_match(candidate) {
            let destination = file_name_destination(prefix, entry.path())?;
            tasks.push(LoadTask::new(candidate, destination));
        }
    }

    Ok(tasks)
}

/// Rejects task sets in which two sources map to the same destination.
fn check_unique_destinations(tasks: &[LoadTask]) -> LoadResult<()> {
    let mut sources_by_destination: BTreeMap<&str, Vec<&Path>> = BTreeMap::new();
    for task in tasks {
        sources_by_destination
            .entry(task.destination.as_str())
            .or_default()
            .push(task.source.as_path());
    }

    let duplicates: Vec<String> = sources_by_destination
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(destination, sources)| {
            let sources: Vec<String> = sources
                .iter()
                .map(|source| source.display().to_string())
                .collect();
            format!("{destination} <- {}", sources.join(", "))
        })
        .collect();

    if !duplicates.is_empty() {
        bail!(
            ErrorKind::InvalidInput,
            "Several input files map to the same destination",
            duplicates.join("\n")
        );
    }

    Ok(())
}

/// Resolves `input` into load tasks stored below `dest_path`.
///
/// - A directory is walked recursively; each regular file keeps its path relative to the
///   directory.
/// - A pattern containing `*`, `?`, `[` or `{` is expanded; `*` does not cross `/` while
///   `**` does. Matches are stored by file name.
/// - Anything else must be a regular file, stored by file name.
///
/// Tasks are sorted by source path. Fails with [`ErrorKind::InvalidInput`] when nothing matches
/// or when two files would be stored under the same destination.
pub fn collect_tasks(input: &str, dest_path: Option<&str>) -> LoadResult<Vec<LoadTask>> {
    let prefix = normalize_prefix(dest_path);
    let input_path = Path::new(input);

    let mut tasks = if input_path.is_dir() {
        collect_directory(input_path, &prefix)?
    } else if has_glob_meta(input) {
        collect_glob(input, &prefix)?
    } else if input_path.is_file() {
        vec![LoadTask::new(input_path, file_name_destination(&prefix, input_path)?)]
    } else {
        bail!(ErrorKind::InvalidInput, "Input file does not exist", input);
    };

    if tasks.is_empty() {
        bail!(ErrorKind::InvalidInput, "No files matched the input", input);
    }

    tasks.sort_by(|a, b| a.source.cmp(&b.source));
    check_unique_destinations(&tasks)?;

    info!(input, files = tasks.len(), dest_path = %prefix, "collected input files");

    Ok(tasks)
}
