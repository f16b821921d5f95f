//! Reflection layer for pdocs.
//!
//! This crate turns a filesystem path (or a dotted module name) into a tree
//! of documentation objects. It is the only part of pdocs that knows what a
//! Python package looks like on disk; everything downstream works on the
//! [`model`] arena.
//!
//! # Architecture
//!
//! - [`model`]: Arena of documentation objects addressed by [`DocId`]
//! - [`python`]: Static scanner for Python sources ([`SourceReflector`])
//!
//! # Usage
//!
//! ```ignore
//! use pdocs_reflect::{LoadOptions, Reflector, SourceReflector};
//!
//! let reflector = SourceReflector::new(vec![std::env::current_dir()?]);
//! if reflector.resolve("mypkg")?.has_backing_file() {
//!     let unit = reflector.load("mypkg", &LoadOptions::default())?;
//!     println!("{}", unit.module().name());
//! }
//! ```

#![warn(missing_docs)]

pub mod model;
pub mod python;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use model::{DocArena, DocId, DocKind, DocObject, ModuleRef, ObjRef, Unit};
pub use python::SourceReflector;

/// A candidate could not be resolved into any documentable form.
#[derive(Debug, Error)]
pub enum ImportFailure {
    /// Neither a path on disk nor a module reachable from the search paths.
    #[error("no module named '{0}'")]
    NotFound(String),

    /// The path exists but is not something that can be imported.
    #[error("{0} is not a module or package")]
    NotImportable(PathBuf),

    /// The source exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The source could not be scanned.
    #[error("{path}:{line}: {message}")]
    Syntax {
        /// File containing the error.
        path: PathBuf,
        /// 1-based line where the offending construct starts.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

/// What the reflection layer knows about a candidate without loading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The single source file backing the candidate, if there is one.
    ///
    /// Namespace containers (directories without `__init__.py`) have none.
    pub backing_file: Option<PathBuf>,
    /// Whether the candidate can own submodules.
    pub is_package_like: bool,
}

impl Resolution {
    /// Whether the candidate resolves to an object with a known origin file.
    pub fn has_backing_file(&self) -> bool {
        self.backing_file.is_some()
    }
}

/// Options applied while loading a unit.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Keep only objects matching one of these strings. Empty keeps everything.
    pub filters: Vec<String>,
    /// Downgrade submodules that fail to load to a warning.
    pub skip_errors: bool,
    /// Load only the root module, without its submodules.
    pub shallow: bool,
}

impl LoadOptions {
    /// Build options from a comma separated filter string.
    pub fn with_filter(mut self, filter: Option<&str>) -> Self {
        self.filters = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| f.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        self
    }

    /// Set the skip-errors policy.
    pub fn skip_errors(mut self, skip: bool) -> Self {
        self.skip_errors = skip;
        self
    }

    /// Stop at the root module.
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }
}

/// The capability the rest of pdocs needs from a reflection backend.
///
/// A `target` is either a filesystem path or a dotted module name.
/// Implementations must not cache between calls: every call observes the
/// current state of the sources.
pub trait Reflector: Send + Sync {
    /// Classify `target` without building documentation objects.
    fn resolve(&self, target: &str) -> Result<Resolution, ImportFailure>;

    /// Load `target` and all of its submodules.
    fn load(&self, target: &str, options: &LoadOptions) -> Result<Unit, ImportFailure>;
}

/// Expand a leading `~` and make `path` absolute against the current directory.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}

/// Terminal component of `path` as an owned string.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
