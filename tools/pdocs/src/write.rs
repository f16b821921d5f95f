//! Output writer.
//!
//! Every module of a unit is written to a path mirroring its dotted name
//! under the output directory. Existing output is never overwritten unless
//! forced, and a file whose content fails to render or write is removed
//! before the error propagates.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use pdocs_reflect::ModuleRef;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::render::{Render, RenderError};
use crate::url::{module_url, MODULE_SUFFIX};

/// Writer errors.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Target already exists and `--force` is not set.
    #[error("File '{}' already exists. Delete it, or run with --force", .0.display())]
    Collision(PathBuf),

    /// Filesystem failure.
    #[error("cannot write {}: {source}", path.display())]
    Io {
        /// Path being created or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Page content failed to render.
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// HTML pages.
    Html,
    /// Markdown text.
    Markdown,
}

impl Extension {
    /// File suffix including the dot.
    pub fn suffix(self) -> &'static str {
        match self {
            Extension::Html => ".html",
            Extension::Markdown => ".md",
        }
    }
}

/// Target path of `module` under `output_dir`.
pub fn module_path(output_dir: &Path, module: ModuleRef<'_>, ext: Extension) -> PathBuf {
    let url = module_url(module);
    let url = match url.strip_suffix(MODULE_SUFFIX) {
        Some(stem) => format!("{}{}", stem, ext.suffix()),
        None => url,
    };
    let mut path = output_dir.to_path_buf();
    path.extend(url.split('/'));
    path
}

/// Writes rendered modules below an output directory.
pub struct OutputWriter<'a> {
    output_dir: PathBuf,
    force: bool,
    renderer: &'a dyn Render,
    planned: FxHashSet<PathBuf>,
    written: Vec<PathBuf>,
}

impl<'a> OutputWriter<'a> {
    /// Create a writer.
    pub fn new(output_dir: impl Into<PathBuf>, force: bool, renderer: &'a dyn Render) -> Self {
        Self {
            output_dir: output_dir.into(),
            force,
            renderer,
            planned: FxHashSet::default(),
            written: Vec::new(),
        }
    }

    /// The output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The renderer pages are produced with.
    pub fn renderer(&self) -> &'a dyn Render {
        self.renderer
    }

    /// Paths written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Fail if the output for `module` already exists, or was already
    /// claimed by an earlier module checked with this writer.
    ///
    /// Checks the module's own target and, for packages, the directory that
    /// will hold its members. Does nothing when forced.
    pub fn quit_if_exists(&mut self, module: ModuleRef<'_>, ext: Extension) -> Result<(), WriteError> {
        if self.force {
            return Ok(());
        }

        let target = module_path(&self.output_dir, module, ext);
        let mut paths = vec![target.clone()];
        if module.is_package() {
            if let Some(dir) = target.parent() {
                paths.push(dir.to_path_buf());
            }
        }

        if let Some(existing) = paths
            .iter()
            .find(|p| self.planned.contains(*p) || p.symlink_metadata().is_ok())
        {
            return Err(WriteError::Collision(existing.clone()));
        }
        self.planned.extend(paths);
        Ok(())
    }

    /// Write `module` and, depth first, all of its submodules.
    pub fn write_recursive(&mut self, module: ModuleRef<'_>, ext: Extension) -> Result<(), WriteError> {
        let path = module_path(&self.output_dir, module, ext);
        let renderer = self.renderer;
        self.write_file_with(&path, |file| {
            let content = match ext {
                Extension::Html => renderer.module_html(module)?,
                Extension::Markdown => renderer.module_text(module)?,
            };
            file.write_all(content.as_bytes())
                .map_err(|source| WriteError::Io {
                    path: path.clone(),
                    source,
                })
        })?;

        for sub in module.submodules() {
            self.write_recursive(sub, ext)?;
        }
        Ok(())
    }

    /// Create `path`, fill it with `fill` and report it on stdout.
    ///
    /// Missing parent directories are created. When `fill` fails the file is
    /// removed and the error returned.
    pub fn write_file_with<F>(&mut self, path: &Path, fill: F) -> Result<(), WriteError>
    where
        F: FnOnce(&mut File) -> Result<(), WriteError>,
    {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|source| WriteError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut file = File::create(path).map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if let Err(e) = fill(&mut file) {
            drop(file);
            if let Err(rm) = std::fs::remove_file(path) {
                tracing::debug!("Could not remove partial file {}: {}", path.display(), rm);
            }
            return Err(e);
        }

        println!("{}", path.display());
        self.written.push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{IndexEntry, RenderConfig, Renderer};
    use pdocs_reflect::{DocArena, Unit};
    use std::io::Write;
    use tempfile::TempDir;

    fn package() -> Unit {
        let mut arena = DocArena::new();
        let root = arena.alloc_module("pkg", None, None, true);
        let sub = arena.alloc_module("pkg.sub", Some(root), None, false);
        arena.alloc_module("pkg.index", Some(root), None, false);
        arena.alloc_module("pkg.sub.leaf", Some(sub), None, false);
        Unit::new(arena, root)
    }

    fn renderer() -> Renderer {
        Renderer::new(RenderConfig::default(), None).unwrap()
    }

    /// Renders HTML fine but fails for the module named `fail_on`.
    struct Failing {
        fail_on: &'static str,
    }

    impl Render for Failing {
        fn module_html(&self, module: ModuleRef<'_>) -> Result<String, RenderError> {
            if module.name() == self.fail_on {
                return Err(RenderError::Template(tera::Error::msg("boom")));
            }
            Ok(format!("<h1>{}</h1>", module.name()))
        }
        fn module_text(&self, module: ModuleRef<'_>) -> Result<String, RenderError> {
            Ok(module.name().to_string())
        }
        fn index_html(&self, _: &[IndexEntry]) -> Result<String, RenderError> {
            Ok(String::new())
        }
        fn search_html(&self, _: ModuleRef<'_>) -> Result<String, RenderError> {
            Ok(String::new())
        }
        fn pdf_text(&self, _: &[ModuleRef<'_>]) -> Result<String, RenderError> {
            Ok(String::new())
        }
    }

    #[test]
    fn paths_mirror_the_namespace() {
        let unit = package();
        let out = Path::new("/out");
        let module = unit.module();
        assert_eq!(module_path(out, module, Extension::Html), Path::new("/out/pkg/index.html"));
        assert_eq!(module_path(out, module, Extension::Markdown), Path::new("/out/pkg/index.md"));

        let subs: Vec<_> = module.submodules().collect();
        assert_eq!(module_path(out, subs[0], Extension::Markdown), Path::new("/out/pkg/sub.md"));
        assert_eq!(module_path(out, subs[1], Extension::Html), Path::new("/out/pkg/index.m.html"));
    }

    #[test]
    fn writes_the_whole_tree_depth_first() {
        let tmp = TempDir::new().unwrap();
        let unit = package();
        let renderer = renderer();
        let mut writer = OutputWriter::new(tmp.path(), false, &renderer);

        writer.quit_if_exists(unit.module(), Extension::Html).unwrap();
        writer.write_recursive(unit.module(), Extension::Html).unwrap();

        let written: Vec<_> = writer
            .written()
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            written,
            vec![
                PathBuf::from("pkg/index.html"),
                PathBuf::from("pkg/sub.html"),
                PathBuf::from("pkg/sub/leaf.html"),
                PathBuf::from("pkg/index.m.html"),
            ]
        );
    }

    #[test]
    fn second_run_collides_and_leaves_output_untouched() {
        let tmp = TempDir::new().unwrap();
        let unit = package();
        let renderer = renderer();

        let mut first = OutputWriter::new(tmp.path(), false, &renderer);
        first.write_recursive(unit.module(), Extension::Html).unwrap();
        let target = tmp.path().join("pkg/index.html");
        let before = std::fs::read(&target).unwrap();

        let mut second = OutputWriter::new(tmp.path(), false, &renderer);
        match second.quit_if_exists(unit.module(), Extension::Html) {
            Err(WriteError::Collision(path)) => assert_eq!(path, target),
            other => panic!("expected a collision, got {other:?}"),
        }
        assert_eq!(std::fs::read(&target).unwrap(), before);
    }

    #[test]
    fn package_directory_alone_is_a_collision() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("pkg")).unwrap();
        let unit = package();
        let renderer = renderer();
        let mut writer = OutputWriter::new(tmp.path(), false, &renderer);
        assert!(matches!(
            writer.quit_if_exists(unit.module(), Extension::Html),
            Err(WriteError::Collision(p)) if p == tmp.path().join("pkg")
        ));
    }

    #[test]
    fn units_claiming_the_same_target_collide() {
        let tmp = TempDir::new().unwrap();
        let first = package();
        let second = package();
        let renderer = renderer();

        let mut writer = OutputWriter::new(tmp.path(), false, &renderer);
        writer.quit_if_exists(first.module(), Extension::Html).unwrap();
        assert!(matches!(
            writer.quit_if_exists(second.module(), Extension::Html),
            Err(WriteError::Collision(p)) if p == tmp.path().join("pkg/index.html")
        ));

        let mut forced = OutputWriter::new(tmp.path(), true, &renderer);
        forced.quit_if_exists(first.module(), Extension::Html).unwrap();
        forced.quit_if_exists(second.module(), Extension::Html).unwrap();
    }

    #[test]
    fn forced_rewrite_overwrites() {
        let tmp = TempDir::new().unwrap();
        let unit = package();
        let target = tmp.path().join("pkg/index.md");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "stale content that is longer than the new one").unwrap();

        let renderer = Failing { fail_on: "" };
        let mut writer = OutputWriter::new(tmp.path(), true, &renderer);
        writer.quit_if_exists(unit.module(), Extension::Markdown).unwrap();
        writer.write_recursive(unit.module(), Extension::Markdown).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "pkg");
    }

    #[test]
    fn failed_render_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let unit = package();
        let renderer = Failing { fail_on: "pkg.sub.leaf" };
        let mut writer = OutputWriter::new(tmp.path(), false, &renderer);

        let err = writer.write_recursive(unit.module(), Extension::Html).unwrap_err();
        assert!(matches!(err, WriteError::Render(_)));
        assert!(tmp.path().join("pkg/sub.html").is_file());
        assert!(!tmp.path().join("pkg/sub/leaf.html").exists());
        assert!(!tmp.path().join("pkg/index.m.html").exists());
    }

    #[test]
    fn failed_fill_removes_the_file() {
        let tmp = TempDir::new().unwrap();
        let renderer = renderer();
        let mut writer = OutputWriter::new(tmp.path(), false, &renderer);
        let path = tmp.path().join("nested/dir/index.js");

        let err = writer
            .write_file_with(&path, |file| {
                file.write_all(b"URLS=[").unwrap();
                Err(WriteError::Io {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                })
            })
            .unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
        assert!(!path.exists());
        assert!(writer.written().is_empty());
    }
}
