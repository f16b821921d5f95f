//! Discovery of documentable units.
//!
//! Discovery walks the input roots breadth first, one directory level per
//! round, for at most `max_depth` rounds. A directory that is itself a unit
//! is loaded whole; otherwise its immediate subdirectories are classified and
//! the ones that are not units become the next round's frontier. Directories
//! carrying a project manifest (`setup.py`, `pyproject.toml`) are reported as
//! a named [`PackageGroup`] and not descended further.

use std::path::{Path, PathBuf};

use pdocs_reflect::{expand_path, ImportFailure, LoadOptions, Reflector, Unit};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::SkipSet;

/// Files marking a directory as the root of a project.
pub const MANIFEST_MARKERS: &[&str] = &["setup.py", "pyproject.toml"];

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No root at some level was an existing directory and nothing was found.
    #[error("The directories {} do not exist.", .entries.join(", "))]
    NotFound {
        /// Every entry of the failing level that was not a directory.
        entries: Vec<String>,
    },

    /// Directories were scanned but none held a unit.
    #[error("No modules or packages were found in {} (searched {rounds} level(s))", .roots.join(", "))]
    Empty {
        /// The roots discovery started from.
        roots: Vec<String>,
        /// Number of rounds performed.
        rounds: usize,
    },

    /// A candidate failed to resolve and errors are not skipped.
    #[error(transparent)]
    Import(#[from] ImportFailure),
}

/// A project directory and the units found directly inside it.
#[derive(Debug)]
pub struct PackageGroup {
    /// Terminal component of the project directory.
    pub name: String,
    /// Units in discovery order.
    pub members: Vec<Unit>,
}

/// Outcome of a successful discovery.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Project directories with their units.
    pub packages: Vec<PackageGroup>,
    /// Units that do not belong to a project directory.
    pub free_modules: Vec<Unit>,
}

impl DiscoveryResult {
    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.free_modules.is_empty()
    }

    /// Names of all units, package members first.
    pub fn unit_names(&self) -> Vec<&str> {
        self.packages
            .iter()
            .flat_map(|p| p.members.iter())
            .chain(&self.free_modules)
            .map(Unit::name)
            .collect()
    }

    /// All units, package members first, then free modules.
    pub fn into_units(self) -> Vec<Unit> {
        self.packages
            .into_iter()
            .flat_map(|p| p.members)
            .chain(self.free_modules)
            .collect()
    }
}

/// Result of classifying one directory.
#[derive(Debug, Default)]
pub struct DirectoryScan {
    /// Units found: the directory itself, or its unit subdirectories.
    pub units: Vec<Unit>,
    /// Whether the directory carries a project manifest.
    pub is_project: bool,
    /// Subdirectories that are not units, in enumeration order.
    pub subdirs: Vec<PathBuf>,
}

/// Whether `path` is a unit: it resolves to an object with a backing file.
pub fn is_unit(reflector: &dyn Reflector, path: &Path) -> Result<bool, ImportFailure> {
    let target = path.to_string_lossy();
    Ok(reflector.resolve(&target)?.has_backing_file())
}

/// Whether `dir` contains a project manifest.
pub fn has_manifest(dir: &Path) -> bool {
    MANIFEST_MARKERS.iter().any(|m| dir.join(m).is_file())
}

/// Classify one directory.
///
/// With `skip_errors` set in `load`, candidates that fail to resolve or load
/// are logged and left out; otherwise the first failure is returned.
pub fn check_directory(
    reflector: &dyn Reflector,
    dir: &Path,
    skip: &SkipSet,
    load: &LoadOptions,
) -> Result<DirectoryScan, ImportFailure> {
    let mut scan = DirectoryScan {
        is_project: has_manifest(dir),
        ..DirectoryScan::default()
    };

    match classify(reflector, dir, load)? {
        Some(Classified::Unit(unit)) => {
            scan.units.push(unit);
            return Ok(scan);
        }
        Some(Classified::Container) => {}
        None => return Ok(scan),
    }

    for sub in subdirectories(dir, skip) {
        match classify(reflector, &sub, load)? {
            Some(Classified::Unit(unit)) => scan.units.push(unit),
            Some(Classified::Container) => scan.subdirs.push(sub),
            None => {}
        }
    }

    Ok(scan)
}

enum Classified {
    Unit(Unit),
    Container,
}

/// Resolve and, for units, load `path`. `None` means the candidate failed and
/// was skipped.
fn classify(
    reflector: &dyn Reflector,
    path: &Path,
    load: &LoadOptions,
) -> Result<Option<Classified>, ImportFailure> {
    let outcome = is_unit(reflector, path).and_then(|unit| {
        if unit {
            reflector
                .load(&path.to_string_lossy(), load)
                .map(Classified::Unit)
        } else {
            Ok(Classified::Container)
        }
    });
    match outcome {
        Ok(classified) => Ok(Some(classified)),
        Err(e) if load.skip_errors => {
            tracing::warn!("Skipping {} due to error: {}", path.display(), e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Immediate subdirectories of `dir` not excluded by `skip`.
fn subdirectories(dir: &Path, skip: &SkipSet) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| !skip.excludes(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect()
}

/// Discover units under `roots`, searching at most `max_depth` levels.
///
/// A level fails with [`DiscoveryError::NotFound`] when some of its entries
/// are not directories and nothing at all has been produced so far, neither
/// units nor subdirectories to expand. After the last round an empty result
/// fails with [`DiscoveryError::Empty`].
pub fn discover(
    reflector: &dyn Reflector,
    roots: &[String],
    max_depth: usize,
    skip: &SkipSet,
    load: &LoadOptions,
) -> Result<DiscoveryResult, DiscoveryError> {
    let mut result = DiscoveryResult::default();
    let mut frontier: Vec<String> = roots.to_vec();

    for round in 1..=max_depth {
        let mut next = Vec::new();
        let mut errors = Vec::new();

        for entry in &frontier {
            let dir = expand_path(entry);
            if !dir.is_dir() {
                errors.push(entry.clone());
                continue;
            }
            tracing::debug!("Scanning {} (level {})", dir.display(), round);

            let scan = check_directory(reflector, &dir, skip, load)?;
            if scan.is_project {
                result.packages.push(PackageGroup {
                    name: file_name(&dir),
                    members: scan.units,
                });
            } else {
                result.free_modules.extend(scan.units);
                next.extend(
                    scan.subdirs
                        .into_iter()
                        .map(|p| p.to_string_lossy().into_owned()),
                );
            }
        }

        if !errors.is_empty() && result.is_empty() && next.is_empty() {
            return Err(DiscoveryError::NotFound { entries: errors });
        }
        frontier = next;
    }

    if result.is_empty() {
        return Err(DiscoveryError::Empty {
            roots: roots.to_vec(),
            rounds: max_depth,
        });
    }

    tracing::info!(
        "Found {} package(s) and {} module(s)",
        result.packages.len(),
        result.free_modules.len()
    );
    Ok(result)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
