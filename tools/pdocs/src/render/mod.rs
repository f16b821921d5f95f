//! Documentation rendering.
//!
//! This module renders documentation objects to the output formats:
//! - HTML pages through tera templates
//! - Markdown text (single modules, or one PDF-ready document)

pub mod html;
pub mod markdown;

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use pdocs_reflect::ModuleRef;
use serde::Serialize;
use serde_json::{Map, Value};
use tera::Tera;
use thiserror::Error;

use crate::config::TemplateConfig;

/// Rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to compile or render.
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// A template override could not be read.
    #[error("cannot read template {}: {source}", path.display())]
    Io {
        /// Template file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderConfig {
    /// Prefix for cross-document links; relative links when `None`.
    pub link_prefix: Option<String>,
    /// Link identifiers outside the current unit through `<name>.ext`.
    pub external_links: bool,
    /// Emit a link to the search page.
    pub search: bool,
    /// Show definition lines next to members.
    pub show_source: bool,
    /// Pages poll the live server and reload when their source changes.
    pub live_reload: bool,
    /// Every template override, exposed to templates as `config`.
    pub options: Map<String, Value>,
}

impl RenderConfig {
    /// Derive the render configuration from template overrides.
    pub fn from_template_config(config: &TemplateConfig) -> Self {
        Self {
            link_prefix: config.link_prefix().map(str::to_string),
            external_links: config.external_links(),
            search: config.lunr_search().is_some(),
            show_source: config
                .get("show_source_code")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            live_reload: config.http_server(),
            options: config.as_map().clone(),
        }
    }
}

/// Cache validator of a source file: its modification time in seconds.
///
/// Pages served live embed it and the server compares it on `HEAD`.
pub fn file_validator(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs_f64().to_string())
}

/// One row of the live server's index page.
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    /// Dotted module name.
    pub name: String,
    /// First paragraph of the module docstring.
    pub brief: String,
    /// Link to the module page.
    pub href: String,
}

/// The templating capability pdocs needs.
pub trait Render: Send + Sync {
    /// HTML page of one module.
    fn module_html(&self, module: ModuleRef<'_>) -> Result<String, RenderError>;

    /// Markdown text of one module.
    fn module_text(&self, module: ModuleRef<'_>) -> Result<String, RenderError>;

    /// HTML index page listing top-level modules.
    fn index_html(&self, entries: &[IndexEntry]) -> Result<String, RenderError>;

    /// HTML search page for a top-level module.
    fn search_html(&self, module: ModuleRef<'_>) -> Result<String, RenderError>;

    /// One Markdown document covering `modules`, in order.
    fn pdf_text(&self, modules: &[ModuleRef<'_>]) -> Result<String, RenderError>;
}

/// The built-in renderer: tera for HTML, hand-written Markdown for text.
pub struct Renderer {
    tera: Tera,
    config: RenderConfig,
}

impl Renderer {
    /// Create a renderer, letting templates in `template_dir` replace the
    /// built-in ones of the same name.
    pub fn new(config: RenderConfig, template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Self {
            tera: html::create_templates(template_dir)?,
            config,
        })
    }
}

impl Render for Renderer {
    fn module_html(&self, module: ModuleRef<'_>) -> Result<String, RenderError> {
        html::render_module(&self.tera, module, &self.config)
    }

    fn module_text(&self, module: ModuleRef<'_>) -> Result<String, RenderError> {
        Ok(markdown::render_module(module))
    }

    fn index_html(&self, entries: &[IndexEntry]) -> Result<String, RenderError> {
        html::render_index(&self.tera, entries, &self.config)
    }

    fn search_html(&self, module: ModuleRef<'_>) -> Result<String, RenderError> {
        html::render_search(&self.tera, module, &self.config)
    }

    fn pdf_text(&self, modules: &[ModuleRef<'_>]) -> Result<String, RenderError> {
        Ok(markdown::render_pdf(modules))
    }
}

/// First paragraph of a docstring, on one line.
pub fn brief(docstring: &str) -> String {
    docstring
        .split("\n\n")
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
