//! Static reflection of Python source trees.
//!
//! [`SourceReflector`] maps targets onto the filesystem the way the Python
//! import system would (regular packages first, then plain modules, then
//! namespace directories) and scans the sources with [`scan`]. Nothing is
//! cached: every call reads the files again.

mod scan;

use std::path::{Path, PathBuf};

use crate::model::{DocArena, DocId, DocKind, Unit};
use crate::{expand_path, file_name, ImportFailure, LoadOptions, Reflector, Resolution};

/// Name of the file that turns a directory into a regular package.
pub const PACKAGE_INIT: &str = "__init__.py";

/// Where a target lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    /// A directory; `init` is its `__init__.py` when present.
    Package { dir: PathBuf, init: Option<PathBuf> },
    /// A single `.py` file.
    Module(PathBuf),
}

impl Location {
    fn of_path(path: &Path) -> Result<Self, ImportFailure> {
        if path.is_dir() {
            let init = path.join(PACKAGE_INIT);
            Ok(Location::Package {
                dir: path.to_path_buf(),
                init: init.is_file().then_some(init),
            })
        } else if path.is_file() && path.extension().is_some_and(|ext| ext == "py") {
            Ok(Location::Module(path.to_path_buf()))
        } else {
            Err(ImportFailure::NotImportable(path.to_path_buf()))
        }
    }

    fn backing_file(&self) -> Option<&Path> {
        match self {
            Location::Package { init, .. } => init.as_deref(),
            Location::Module(file) => Some(file),
        }
    }
}

/// Reflector over Python sources on disk.
#[derive(Debug, Clone, Default)]
pub struct SourceReflector {
    search_paths: Vec<PathBuf>,
}

impl SourceReflector {
    /// Create a reflector resolving dotted names against `search_paths`, in order.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// The directories dotted names are resolved against.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Map a target to its module name and location.
    fn locate(&self, target: &str) -> Result<(String, Location), ImportFailure> {
        let as_path = expand_path(target);
        if as_path.exists() {
            let location = Location::of_path(&as_path)?;
            let name = match &location {
                Location::Module(file) => file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                Location::Package { dir, .. } => file_name(dir),
            };
            return Ok((name, location));
        }

        let parts: Vec<&str> = target.split('.').collect();
        if parts.iter().any(|p| !is_identifier(p)) {
            return Err(ImportFailure::NotFound(target.to_string()));
        }
        let relative: PathBuf = parts.iter().collect();

        for root in &self.search_paths {
            let dir = root.join(&relative);
            let init = dir.join(PACKAGE_INIT);
            if init.is_file() {
                return Ok((
                    target.to_string(),
                    Location::Package {
                        dir,
                        init: Some(init),
                    },
                ));
            }
            let file = dir.with_extension("py");
            if file.is_file() {
                return Ok((target.to_string(), Location::Module(file)));
            }
        }
        for root in &self.search_paths {
            let dir = root.join(&relative);
            if dir.is_dir() {
                return Ok((target.to_string(), Location::Package { dir, init: None }));
            }
        }

        Err(ImportFailure::NotFound(target.to_string()))
    }

    fn load_into(
        &self,
        arena: &mut DocArena,
        name: &str,
        location: &Location,
        parent: Option<DocId>,
        options: &LoadOptions,
    ) -> Result<DocId, ImportFailure> {
        let is_package = matches!(location, Location::Package { .. });
        let backing = location.backing_file().map(Path::to_path_buf);
        let id = arena.alloc_module(name, parent, backing.clone(), is_package);

        if let Some(file) = &backing {
            let source = read_source(file)?;
            scan::scan_module(arena, id, &source).map_err(|e| ImportFailure::Syntax {
                path: file.clone(),
                line: e.line,
                message: e.message,
            })?;
        }

        if let Location::Package { dir, .. } = location {
            if options.shallow {
                return Ok(id);
            }
            for (child_name, child) in submodule_locations(dir)? {
                let dotted = format!("{name}.{child_name}");
                let mark = arena.len();
                match self.load_into(arena, &dotted, &child, Some(id), options) {
                    Ok(_) => {}
                    Err(e) if options.skip_errors => {
                        tracing::warn!("Skipping {} due to error: {}", dotted, e);
                        arena.truncate(mark);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(id)
    }
}

impl Reflector for SourceReflector {
    fn resolve(&self, target: &str) -> Result<Resolution, ImportFailure> {
        let (_, location) = self.locate(target)?;
        if let Some(file) = location.backing_file() {
            let source = read_source(file)?;
            scan::logical_lines(&source).map_err(|e| ImportFailure::Syntax {
                path: file.to_path_buf(),
                line: e.line,
                message: e.message,
            })?;
        }
        Ok(Resolution {
            backing_file: location.backing_file().map(Path::to_path_buf),
            is_package_like: matches!(location, Location::Package { .. }),
        })
    }

    fn load(&self, target: &str, options: &LoadOptions) -> Result<Unit, ImportFailure> {
        let (name, location) = self.locate(target)?;
        tracing::debug!("Loading {} from {:?}", name, location);

        let mut arena = DocArena::new();
        let root = self.load_into(&mut arena, &name, &location, None, options)?;

        if !options.filters.is_empty() {
            let filters = options.filters.clone();
            arena.retain_members(root, &move |arena, id| passes_filter(arena, id, &filters));
        }

        Ok(Unit::new(arena, root))
    }
}

/// An object passes when a filter occurs in its qualified name, or when it is
/// a class owning a member named exactly like a filter.
fn passes_filter(arena: &DocArena, id: DocId, filters: &[String]) -> bool {
    let obj = arena.get(id);
    filters.iter().any(|f| {
        obj.refname.contains(f.as_str())
            || (obj.kind == DocKind::Class && arena.member_named(id, f).is_some())
    })
}

fn read_source(file: &Path) -> Result<String, ImportFailure> {
    std::fs::read_to_string(file).map_err(|source| ImportFailure::Io {
        path: file.to_path_buf(),
        source,
    })
}

/// Public submodules of a package directory, ordered by name.
fn submodule_locations(dir: &Path) -> Result<Vec<(String, Location)>, ImportFailure> {
    let entries = std::fs::read_dir(dir).map_err(|source| ImportFailure::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = file_name(&path);
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            let init = path.join(PACKAGE_INIT);
            if init.is_file() && is_identifier(&name) {
                found.push((
                    name,
                    Location::Package {
                        dir: path,
                        init: Some(init),
                    },
                ));
            }
        } else if let Some(stem) = name.strip_suffix(".py") {
            if is_identifier(stem) {
                found.push((stem.to_string(), Location::Module(path)));
            }
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let root = tmp.path();
        write(root, "pkg/__init__.py", "\"\"\"The package.\"\"\"\n");
        write(root, "pkg/alpha.py", "def run():\n    \"\"\"Run it.\"\"\"\n");
        write(root, "pkg/_private.py", "def hidden():\n    pass\n");
        write(root, "pkg/inner/__init__.py", "class Thing:\n    def go(self):\n        pass\n");
        write(root, "pkg/broken.py", "x = \"\"\"never closed\n");
        write(root, "ns/loose.py", "VALUE = 1\n");
        tmp
    }

    #[test]
    fn resolves_packages_modules_and_namespaces() {
        let tmp = fixture();
        let reflector = SourceReflector::new(vec![tmp.path().to_path_buf()]);

        let pkg = reflector.resolve("pkg").unwrap();
        assert!(pkg.has_backing_file());
        assert!(pkg.is_package_like);

        let module = reflector.resolve("pkg.alpha").unwrap();
        assert!(module.has_backing_file());
        assert!(!module.is_package_like);

        let ns = reflector.resolve(tmp.path().join("ns").to_str().unwrap()).unwrap();
        assert!(!ns.has_backing_file());
        assert!(ns.is_package_like);

        assert!(matches!(
            reflector.resolve("pkg.missing"),
            Err(ImportFailure::NotFound(_))
        ));
        assert!(matches!(
            reflector.resolve("pkg.broken"),
            Err(ImportFailure::Syntax { line: 1, .. })
        ));
    }

    #[test]
    fn broken_submodule_fails_the_load_unless_skipped() {
        let tmp = fixture();
        let reflector = SourceReflector::new(vec![tmp.path().to_path_buf()]);

        assert!(reflector.load("pkg", &LoadOptions::default()).is_err());

        let unit = reflector
            .load("pkg", &LoadOptions::default().skip_errors(true))
            .unwrap();
        let subs: Vec<_> = unit.module().submodules().map(|m| m.name().to_string()).collect();
        assert_eq!(subs, vec!["pkg.alpha", "pkg.inner"]);
        assert_eq!(unit.module().docstring(), "The package.");
        assert!(unit.is_package());
    }

    #[test]
    fn shallow_load_ignores_submodules() {
        let tmp = fixture();
        let reflector = SourceReflector::new(vec![tmp.path().to_path_buf()]);

        let unit = reflector
            .load("pkg", &LoadOptions::default().shallow(true))
            .unwrap();
        assert_eq!(unit.module().docstring(), "The package.");
        assert_eq!(unit.module().submodules().count(), 0);
    }

    #[test]
    fn path_targets_are_named_after_their_last_component() {
        let tmp = fixture();
        let reflector = SourceReflector::default();
        let path = tmp.path().join("pkg").join("alpha.py");
        let unit = reflector
            .load(path.to_str().unwrap(), &LoadOptions::default())
            .unwrap();
        assert_eq!(unit.name(), "alpha");
        assert!(!unit.is_package());
    }

    #[test]
    fn filters_prune_non_matching_members() {
        let tmp = fixture();
        let reflector = SourceReflector::new(vec![tmp.path().to_path_buf()]);
        let options = LoadOptions::default()
            .skip_errors(true)
            .with_filter(Some("go"));
        let unit = reflector.load("pkg", &options).unwrap();

        let inner = unit
            .module()
            .submodules()
            .find(|m| m.name() == "pkg.inner")
            .unwrap();
        let classes: Vec<_> = inner.members_of(DocKind::Class).map(|c| c.name()).collect();
        assert_eq!(classes, vec!["Thing"]);

        let alpha = unit
            .module()
            .submodules()
            .find(|m| m.name() == "pkg.alpha")
            .unwrap();
        assert_eq!(alpha.obj().members().count(), 0);
    }
}
