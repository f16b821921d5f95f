//! HTML documentation renderer.
//!
//! Pages are rendered with tera. The built-in templates are compiled into
//! the binary; a template directory can replace any of them by name.

use std::path::Path;

use pdocs_reflect::{DocKind, ModuleRef, ObjRef};
use serde_json::{json, Value};
use tera::{Context, Tera};

use super::{brief, file_validator, IndexEntry, RenderConfig, RenderError};
use crate::url::{self, EXTERNAL_SUFFIX};

/// Names of the templates pdocs renders with.
pub const TEMPLATE_NAMES: &[&str] = &["base.html", "index.html", "module.html", "search.html"];

fn builtin_template(name: &str) -> &'static str {
    match name {
        "base.html" => include_str!("../../templates/base.html"),
        "index.html" => include_str!("../../templates/index.html"),
        "module.html" => include_str!("../../templates/module.html"),
        "search.html" => include_str!("../../templates/search.html"),
        _ => "",
    }
}

/// Compile the templates, preferring files found in `template_dir`.
pub fn create_templates(template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut sources = Vec::with_capacity(TEMPLATE_NAMES.len());
    for name in TEMPLATE_NAMES {
        let custom = template_dir.map(|dir| dir.join(name)).filter(|p| p.is_file());
        let source = match custom {
            Some(path) => {
                tracing::debug!("Using template override {}", path.display());
                std::fs::read_to_string(&path).map_err(|source| RenderError::Io { path, source })?
            }
            None => builtin_template(name).to_string(),
        };
        sources.push((*name, source));
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(sources)?;
    Ok(tera)
}

fn base_context(config: &RenderConfig) -> Context {
    let mut context = Context::new();
    context.insert("config", &config.options);
    context.insert("link_prefix", &config.link_prefix.as_deref().unwrap_or(""));
    context
}

/// Render the page of one module.
pub fn render_module(
    tera: &Tera,
    module: ModuleRef<'_>,
    config: &RenderConfig,
) -> Result<String, RenderError> {
    let here = url::module_url(module);
    let href = |target: ModuleRef<'_>| {
        url::link(&here, &url::module_url(target), config.link_prefix.as_deref())
    };

    let submodules: Vec<Value> = module
        .submodules()
        .map(|sub| {
            json!({
                "name": sub.name(),
                "href": href(sub),
                "brief": brief(sub.docstring()),
            })
        })
        .collect();

    let supermodule = module.supermodule().map(|sup| {
        json!({
            "name": sup.name(),
            "href": href(sup),
        })
    });

    let classes: Vec<Value> = module
        .members_of(DocKind::Class)
        .map(|class| render_class(class, module, config))
        .collect();
    let functions: Vec<Value> = module.members_of(DocKind::Function).map(render_member).collect();
    let variables: Vec<Value> = module.members_of(DocKind::Variable).map(render_member).collect();

    let search_href = config.search.then(|| {
        let top = module.top();
        let search_url = if top.is_package() {
            format!("{}/search.html", top.name())
        } else {
            "search.html".to_string()
        };
        url::link(&here, &search_url, config.link_prefix.as_deref())
    });

    let module_data = json!({
        "name": module.name(),
        "kind": if module.is_package() { "Package" } else { "Module" },
        "doc": module.docstring(),
        "source_file": module.source_file().map(|p| p.display().to_string()),
        "supermodule": supermodule,
        "submodules": submodules,
        "variables": variables,
        "functions": functions,
        "classes": classes,
    });

    let validator = if config.live_reload {
        module.source_file().and_then(file_validator)
    } else {
        None
    };

    let mut context = base_context(config);
    context.insert("module", &module_data);
    context.insert("validator", &validator);
    context.insert("show_source", &config.show_source);
    context.insert("search_href", &search_href);

    Ok(tera.render("module.html", &context)?)
}

fn render_member(obj: ObjRef<'_>) -> Value {
    json!({
        "name": obj.name(),
        "refname": obj.refname(),
        "signature": obj.signature(),
        "doc": obj.docstring(),
        "line": obj.line(),
    })
}

fn render_class(class: ObjRef<'_>, module: ModuleRef<'_>, config: &RenderConfig) -> Value {
    let bases: Vec<Value> = class
        .bases()
        .iter()
        .map(|base| {
            json!({
                "name": base,
                "href": base_href(base, module, config),
            })
        })
        .collect();

    let methods: Vec<Value> = class
        .members()
        .filter(|m| m.kind() == DocKind::Function)
        .map(render_member)
        .collect();
    let class_variables: Vec<Value> = class
        .members()
        .filter(|m| m.kind() == DocKind::Variable)
        .map(render_member)
        .collect();
    let inner_classes: Vec<Value> = class
        .members()
        .filter(|m| m.kind() == DocKind::Class)
        .map(render_member)
        .collect();

    json!({
        "name": class.name(),
        "refname": class.refname(),
        "doc": class.docstring(),
        "line": class.line(),
        "bases": bases,
        "methods": methods,
        "class_variables": class_variables,
        "inner_classes": inner_classes,
    })
}

/// Link target of a base class: an anchor when it is defined in the same
/// module, an external probe when external links are on.
fn base_href(base: &str, module: ModuleRef<'_>, config: &RenderConfig) -> Option<String> {
    if let Some(local) = module.members_of(DocKind::Class).find(|c| c.name() == base) {
        return Some(format!("#{}", local.refname()));
    }
    (config.external_links && url::is_dotted_name(base)).then(|| {
        format!(
            "{}{}{}",
            config.link_prefix.as_deref().unwrap_or(""),
            base,
            EXTERNAL_SUFFIX
        )
    })
}

/// Render the index page of the live server.
pub fn render_index(
    tera: &Tera,
    entries: &[IndexEntry],
    config: &RenderConfig,
) -> Result<String, RenderError> {
    let mut context = base_context(config);
    context.insert("modules", entries);
    Ok(tera.render("index.html", &context)?)
}

/// Render the search page of a top-level module.
pub fn render_search(
    tera: &Tera,
    module: ModuleRef<'_>,
    config: &RenderConfig,
) -> Result<String, RenderError> {
    let mut context = base_context(config);
    context.insert("module", &json!({ "name": module.name() }));
    Ok(tera.render("search.html", &context)?)
}
