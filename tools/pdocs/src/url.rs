//! Canonical document URLs.
//!
//! A module `a.b` lives at `a/b.html`; a package `a` at `a/index.html`. A
//! submodule literally named `index` would collide with its package's page,
//! so it gets `a/index.m.html` instead.

use pdocs_reflect::ModuleRef;

/// Suffix of package pages.
pub const PACKAGE_SUFFIX: &str = "/index.html";

/// Suffix of pages for submodules named `index`.
pub const INDEX_MODULE_SUFFIX: &str = ".m.html";

/// Suffix of module pages.
pub const MODULE_SUFFIX: &str = ".html";

/// Suffix of external-link probes served by the live server.
pub const EXTERNAL_SUFFIX: &str = ".ext";

/// URL of a module page relative to the documentation root.
pub fn module_url(module: ModuleRef<'_>) -> String {
    url_for(module.name(), module.is_package())
}

/// URL of the page for the dotted name `name`.
pub fn url_for(name: &str, is_package: bool) -> String {
    let url = name.replace('.', "/");
    if is_package {
        url + PACKAGE_SUFFIX
    } else if url.ends_with("/index") {
        url + INDEX_MODULE_SUFFIX
    } else {
        url + MODULE_SUFFIX
    }
}

/// Dotted module name addressed by a request path.
pub fn import_path_from_request(path: &str) -> String {
    let path = path.split('#').next().unwrap_or_default();
    let path = path.trim_start_matches('/');
    let path = ["/", PACKAGE_SUFFIX, INDEX_MODULE_SUFFIX, MODULE_SUFFIX]
        .iter()
        .find_map(|suffix| path.strip_suffix(suffix))
        .unwrap_or(path);
    path.replace('/', ".")
}

/// Whether `name` is a dotted name of identifiers, e.g. `pkg.sub`.
pub fn is_dotted_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        })
}

/// Link from the page at `from` to the page at `to`, both root-relative.
pub fn relative_url(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to_parts: Vec<&str> = to.split('/').collect();
    let (to_dir, to_file) = to_parts.split_at(to_parts.len() - 1);

    let common = from_dir
        .iter()
        .zip(to_dir)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat("..").take(from_dir.len() - common));
    parts.extend(&to_dir[common..]);
    parts.extend(to_file);
    parts.join("/")
}

/// Link to `to` as seen from the page at `from`, honouring a link prefix.
pub fn link(from: &str, to: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{to}"),
        None => relative_url(from, to),
    }
}
