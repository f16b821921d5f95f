//! pdocs: API documentation for Python packages.
//!
//! Generates HTML or Markdown documentation from Python sources, prints a
//! PDF-ready Markdown document, or serves documentation live over HTTP.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pdocs::config::{coerce_depth, parse_config_override, parse_http_addr, HttpAddr, TemplateConfig};
use pdocs::{Options, WriteError};
use serde_json::Value;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pdocs")]
#[command(author, version, about = "API documentation generator for Python packages", long_about = None)]
struct Cli {
    /// Python module names, or paths to modules, packages and project directories
    #[arg(value_name = "MODULE", required = true)]
    modules: Vec<String>,

    /// Number of directory levels to search for modules
    #[arg(short, long)]
    depth: Option<String>,

    /// Directory names to ignore, besides the default ones
    #[arg(short, long, value_name = "NAME", num_args = 1..)]
    ignore: Vec<String>,

    /// Overwrite existing generated files
    #[arg(short, long)]
    force: bool,

    /// Directory for generated files (default: ./html for --html and --http)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Generate HTML files
    #[arg(long, conflicts_with = "pdf")]
    html: bool,

    /// Print one PDF-ready Markdown document to standard output
    #[arg(long)]
    pdf: bool,

    /// Serve documentation live; use `:` for localhost:8080
    #[arg(long, value_name = "HOST:PORT", value_parser = http_addr)]
    http: Option<HttpAddr>,

    /// Warn about unimportable modules instead of failing
    #[arg(long)]
    skip_errors: bool,

    /// Comma separated strings; only identifiers containing one are shown
    #[arg(long, value_name = "STRING")]
    filter: Option<String>,

    /// Override a template option (repeatable)
    #[arg(short, long = "config", value_name = "KEY=VALUE", value_parser = config_override)]
    config: Vec<(String, Value)>,

    /// Directory with templates overriding the built-in ones
    #[arg(long, value_name = "DIR")]
    template_dir: Option<PathBuf>,

    /// Keep the live server's index in argument order
    #[arg(long)]
    unsorted: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn http_addr(s: &str) -> Result<HttpAddr, String> {
    parse_http_addr(s).map_err(|e| e.to_string())
}

fn config_override(s: &str) -> Result<(String, Value), String> {
    parse_config_override(s).map_err(|e| e.to_string())
}

impl Cli {
    fn into_options(self) -> Options {
        Options {
            depth: coerce_depth(self.depth.as_deref()),
            modules: self.modules,
            ignore: self.ignore,
            force: self.force,
            output_dir: self.output_dir,
            html: self.html,
            pdf: self.pdf,
            http: self.http,
            skip_errors: self.skip_errors,
            filter: self.filter,
            template_config: TemplateConfig::from_overrides(self.config),
            template_dir: self.template_dir,
            unsorted: self.unsorted,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; standard output carries the documentation itself
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = cli.into_options().finalize()?;

    match pdocs::build::run(options) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => match e.downcast_ref::<WriteError>() {
            Some(collision @ WriteError::Collision(_)) => {
                eprintln!("{collision}");
                Ok(ExitCode::from(1))
            }
            _ => Err(e),
        },
    }
}
