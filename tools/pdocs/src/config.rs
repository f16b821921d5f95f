//! Run configuration.
//!
//! [`Options`] is built once from the command line and handed by reference
//! to every component that needs it. Nothing in pdocs reads configuration
//! from global state.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use pdocs_reflect::{expand_path, LoadOptions};
use serde_json::{Map, Value};
use thiserror::Error;

/// Host used when `--http` leaves it empty.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when `--http` leaves it empty.
pub const DEFAULT_PORT: u16 = 8080;

/// Directory-name fragments never descended into during discovery.
pub const SKIP_FRAGMENTS: &[&str] = &["venv", "docs", "egg-info", "build", "dist", "virtualenv"];

/// Leading characters of directory names never descended into.
pub const SKIP_PREFIXES: &[char] = &['.', '_'];

/// Default output directory for `--html` and `--http`.
pub const DEFAULT_OUTPUT_DIR: &str = "html";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--http` value without a colon or with a bad port.
    #[error("'{0}' doesn't match '[HOST]:[PORT]'. Specify `--http :` to use default hostname and port.")]
    InvalidHttp(String),

    /// `-c` value that is not `KEY=VALUE`.
    #[error("Error evaluating --config statement \"{0}\". Expected KEY=VALUE.")]
    InvalidOverride(String),

    /// `--template-dir` does not name a directory.
    #[error("Template dir '{}' is not a directory", .0.display())]
    TemplateDir(PathBuf),
}

/// Address of the live server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAddr {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl std::fmt::Display for HttpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a `[HOST]:[PORT]` string.
pub fn parse_http_addr(s: &str) -> Result<HttpAddr, ConfigError> {
    let (host, port) = s
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidHttp(s.to_string()))?;
    let host = if host.is_empty() { DEFAULT_HOST } else { host };
    let port = if port.is_empty() {
        DEFAULT_PORT
    } else {
        port.parse()
            .map_err(|_| ConfigError::InvalidHttp(s.to_string()))?
    };
    Ok(HttpAddr {
        host: host.to_string(),
        port,
    })
}

/// Parse a `KEY=VALUE` template override.
///
/// The value is read as JSON; Python spellings of the literals (`True`,
/// `False`, `None`) are accepted, and anything else is kept as a string.
pub fn parse_config_override(s: &str) -> Result<(String, Value), ConfigError> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(s.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidOverride(s.to_string()));
    }
    let raw = raw.trim();
    let value = match raw {
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        "None" => Value::Null,
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    };
    Ok((key.to_string(), value))
}

/// Coerce a raw `--depth` value to a positive search depth.
pub fn coerce_depth(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return 1;
    };
    match raw.trim().parse::<usize>() {
        Ok(depth) if depth > 0 => depth,
        _ => {
            tracing::info!("Search depth is set to 1 level");
            1
        }
    }
}

/// Template options shared by every rendered page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateConfig(Map<String, Value>);

impl TemplateConfig {
    /// Build from parsed `-c` overrides; later keys win.
    pub fn from_overrides(overrides: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self(overrides.into_iter().collect())
    }

    /// Set one option.
    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Look up one option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All options.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Prefix prepended to every cross-document link, if any.
    pub fn link_prefix(&self) -> Option<&str> {
        self.get("link_prefix").and_then(Value::as_str)
    }

    /// Whether unresolved identifiers link to `<name>.ext`.
    pub fn external_links(&self) -> bool {
        self.get("external_links")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether pages are served by the live server.
    pub fn http_server(&self) -> bool {
        self.get("http_server")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The search index configuration, when search is enabled.
    pub fn lunr_search(&self) -> Option<&Value> {
        self.get("lunr_search").filter(|v| !v.is_null())
    }

    /// Whether docstrings go into the search index.
    pub fn index_docstrings(&self) -> bool {
        self.lunr_search()
            .and_then(|v| v.get("index_docstrings"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

/// Directory exclusion rules for discovery.
#[derive(Debug, Clone)]
pub struct SkipSet {
    fragments: Vec<String>,
    prefixes: Vec<char>,
}

impl SkipSet {
    /// Default rules plus `ignore` plus the output directory name.
    pub fn new(ignore: &[String], output_dir: Option<&Path>) -> Self {
        let mut fragments: Vec<String> = SKIP_FRAGMENTS.iter().map(|s| s.to_string()).collect();
        fragments.extend(ignore.iter().filter(|s| !s.is_empty()).cloned());
        if let Some(name) = output_dir.and_then(Path::file_name) {
            fragments.push(name.to_string_lossy().into_owned());
        }
        Self {
            fragments,
            prefixes: SKIP_PREFIXES.to_vec(),
        }
    }

    /// Whether a directory named `name` is excluded.
    pub fn excludes(&self, name: &str) -> bool {
        name.chars().next().is_some_and(|c| self.prefixes.contains(&c))
            || self.fragments.iter().any(|f| name.contains(f.as_str()))
    }
}

impl Default for SkipSet {
    fn default() -> Self {
        Self::new(&[], None)
    }
}

/// Everything a run needs to know, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Options {
    /// Module names or paths to document.
    pub modules: Vec<String>,
    /// Discovery depth.
    pub depth: usize,
    /// Extra directory-name fragments to skip.
    pub ignore: Vec<String>,
    /// Overwrite existing output.
    pub force: bool,
    /// Where generated files go.
    pub output_dir: Option<PathBuf>,
    /// Generate HTML files.
    pub html: bool,
    /// Print one PDF-ready Markdown document.
    pub pdf: bool,
    /// Serve documentation live on this address.
    pub http: Option<HttpAddr>,
    /// Downgrade import failures to warnings.
    pub skip_errors: bool,
    /// Comma separated identifier filter.
    pub filter: Option<String>,
    /// Template overrides.
    pub template_config: TemplateConfig,
    /// Directory with templates overriding the built-in ones.
    pub template_dir: Option<PathBuf>,
    /// Keep the index page in argument order.
    pub unsorted: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            depth: 1,
            ignore: Vec::new(),
            force: false,
            output_dir: None,
            html: false,
            pdf: false,
            http: None,
            skip_errors: false,
            filter: None,
            template_config: TemplateConfig::default(),
            template_dir: None,
            unsorted: false,
        }
    }
}

impl Options {
    /// Apply defaults that depend on other options and validate paths.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        if (self.html || self.http.is_some()) && self.output_dir.is_none() {
            self.output_dir = Some(PathBuf::from(DEFAULT_OUTPUT_DIR));
        }
        if self.http.is_some() {
            self.template_config
                .set("link_prefix", Value::String("/".to_string()));
            self.template_config.set("external_links", Value::Bool(true));
            self.template_config.set("http_server", Value::Bool(true));
        }
        if let Some(dir) = &self.template_dir {
            if !dir.is_dir() {
                return Err(ConfigError::TemplateDir(dir.clone()));
            }
        }
        Ok(self)
    }

    /// Exclusion rules for this run.
    pub fn skip_set(&self) -> SkipSet {
        SkipSet::new(&self.ignore, self.output_dir.as_deref())
    }

    /// Reflection options for this run.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::default()
            .with_filter(self.filter.as_deref())
            .skip_errors(self.skip_errors)
    }

    /// Directories dotted module names are resolved against.
    ///
    /// The working directory comes first, then every module argument that
    /// exists on disk (so its children resolve by name) and its parent.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = IndexSet::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(cwd);
        }
        for module in &self.modules {
            let path = expand_path(module);
            if path.is_dir() {
                paths.insert(path.clone());
            }
            if path.exists() {
                if let Some(parent) = path.parent() {
                    paths.insert(parent.to_path_buf());
                }
            }
        }
        paths.into_iter().collect()
    }
}
