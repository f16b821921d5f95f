//! Documentation build driver.
//!
//! This module wires the pieces together for one run:
//! 1. Discover the units named on the command line
//! 2. Render them in the selected output mode
//! 3. Write files, or print to standard output
//!
//! In `--http` mode nothing is discovered up front; the live server loads
//! units per request instead.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use pdocs_reflect::{ModuleRef, Reflector, SourceReflector, Unit};

use crate::config::{Options, DEFAULT_OUTPUT_DIR};
use crate::discover::discover;
use crate::render::{Render, RenderConfig, Renderer};
use crate::search::write_search_assets;
use crate::serve;
use crate::write::{Extension, OutputWriter, WriteError};

/// How discovered units are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One Markdown document on standard output, for PDF converters.
    Pdf,
    /// HTML files below the output directory.
    Html,
    /// Markdown files below the output directory.
    Markdown,
    /// Markdown text of each unit on standard output.
    Text,
}

impl OutputMode {
    /// The mode selected by `options`.
    pub fn of(options: &Options) -> Self {
        if options.pdf {
            OutputMode::Pdf
        } else if options.html {
            OutputMode::Html
        } else if options.output_dir.is_some() {
            OutputMode::Markdown
        } else {
            OutputMode::Text
        }
    }
}

const PDF_INSTRUCTIONS: &str = r#"
PDF-ready markdown written to standard output.
                              ^^^^^^^^^^^^^^^
Convert this file to PDF using e.g. Pandoc:

    pandoc --metadata=title:"MyProject Documentation"               \
           --from=markdown+abbreviations+tex_math_single_backslash  \
           --pdf-engine=xelatex --variable=mainfont:"DejaVu Sans"   \
           --toc --toc-depth=4 --output=pdf.pdf  pdf.md

or using Python-Markdown and Chrome/Chromium/WkHtmlToPDF:

    markdown_py --extension=meta         \
                --extension=abbr         \
                --extension=attr_list    \
                --extension=def_list     \
                --extension=fenced_code  \
                --extension=footnotes    \
                --extension=tables       \
                --extension=admonition   \
                --extension=smarty       \
                --extension=toc          \
                pdf.md > pdf.html

    chromium --headless --disable-gpu --print-to-pdf=pdf.pdf pdf.html

    wkhtmltopdf --encoding utf8 -s A4 --print-media-type pdf.html pdf.pdf

or similar, at your own discretion."#;

/// Run pdocs with finalized `options`.
pub fn run(options: Options) -> Result<()> {
    let reflector = SourceReflector::new(options.search_paths());
    let renderer = Renderer::new(
        RenderConfig::from_template_config(&options.template_config),
        options.template_dir.as_deref(),
    )?;

    if options.http.is_some() {
        return serve::run(options, Arc::new(reflector), Arc::new(renderer));
    }

    let mut stdout = std::io::stdout().lock();
    generate(&options, &reflector, &renderer, &mut stdout)
}

/// Discover the units of `options` and emit them in the selected mode.
///
/// Text and PDF output go to `out`; file modes report every written path on
/// standard output.
pub fn generate(
    options: &Options,
    reflector: &dyn Reflector,
    renderer: &dyn Render,
    out: &mut dyn Write,
) -> Result<()> {
    let units = discover(
        reflector,
        &options.modules,
        options.depth,
        &options.skip_set(),
        &options.load_options(),
    )?
    .into_units();
    tracing::debug!("Discovered {} unit(s)", units.len());

    match OutputMode::of(options) {
        OutputMode::Pdf => {
            let mut modules = Vec::new();
            for unit in &units {
                flatten(unit.module(), &mut modules);
            }
            out.write_all(renderer.pdf_text(&modules)?.as_bytes())?;
            out.flush()?;
            eprintln!("{PDF_INSTRUCTIONS}");
        }
        OutputMode::Html => {
            write_units(options, &units, Extension::Html, renderer)?;
        }
        OutputMode::Markdown => {
            write_units(options, &units, Extension::Markdown, renderer)?;
        }
        OutputMode::Text => {
            for (i, unit) in units.iter().enumerate() {
                out.write_all(renderer.module_text(unit.module())?.as_bytes())?;
                // Two blank lines between units
                let separator = if i + 1 < units.len() { "\n\n\n" } else { "\n" };
                out.write_all(separator.as_bytes())?;
            }
            out.flush()?;
        }
    }

    Ok(())
}

/// `module` and all of its submodules, depth first.
fn flatten<'a>(module: ModuleRef<'a>, modules: &mut Vec<ModuleRef<'a>>) {
    modules.push(module);
    for sub in module.submodules() {
        flatten(sub, modules);
    }
}

/// Write every unit below the output directory.
///
/// All targets are checked for collisions before the first file is written.
fn write_units(
    options: &Options,
    units: &[Unit],
    ext: Extension,
    renderer: &dyn Render,
) -> Result<(), WriteError> {
    let output_dir = options
        .output_dir
        .as_deref()
        .unwrap_or(Path::new(DEFAULT_OUTPUT_DIR));
    let mut writer = OutputWriter::new(output_dir, options.force, renderer);

    for unit in units {
        writer.quit_if_exists(unit.module(), ext)?;
    }

    let search = ext == Extension::Html && options.template_config.lunr_search().is_some();
    for unit in units {
        writer.write_recursive(unit.module(), ext)?;
        if search {
            write_search_assets(&mut writer, unit, options.template_config.index_docstrings())?;
        }
    }

    tracing::info!(
        "Documentation written to {} ({} files)",
        output_dir.display(),
        writer.written().len()
    );
    Ok(())
}
