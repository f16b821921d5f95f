//! Client-side search index.
//!
//! For a top-level unit this writes `index.js`, holding two compact JSON
//! arrays (`URLS` and `INDEX`), and a `search.html` page that loads it. Page
//! URLs are interned: every record refers to its page by position in `URLS`.

use std::io::Write as _;
use std::path::PathBuf;

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use pdocs_reflect::{DocId, DocKind, ModuleRef, ObjRef, Unit};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::url::module_url;
use crate::write::{OutputWriter, WriteError};

/// Runs of the same ASCII punctuation character, e.g. `----` or `~~`.
fn doubled_punctuation() -> String {
    (b'!'..=b'~')
        .map(char::from)
        .filter(|c| c.is_ascii_punctuation() && !matches!(*c, '_' | '>'))
        .map(|c| regex::escape(&format!("{c}{c}")))
        .collect::<Vec<_>>()
        .join("|")
}

static TRIM_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = [
        r"\s+".to_string(),
        r"\s+[-=~]{3,}\s+".to_string(),
        r"^[ \t]*[`~]{3,}\w*$".to_string(),
        r"\s*[`#*]+\s*".to_string(),
        format!(r"\s*(?:{})\s*", doubled_punctuation()),
        r"\s*</?\w*[^>]*>\s*".to_string(),
    ]
    .join("|");
    Regex::new(&format!("(?m){pattern}")).expect("valid regex")
});

/// Normalize a docstring for indexing.
///
/// Collapses whitespace and drops Markdown markup, separator runs and simple
/// HTML tags, each replaced by a single space.
pub fn trim_docstring(docstring: &str) -> String {
    TRIM_RE.replace_all(docstring, " ").into_owned()
}

/// Assigns dense, first-seen ids to page URLs for one index build.
#[derive(Debug, Default)]
pub struct UrlInterner {
    urls: IndexSet<String>,
    memo: FxHashMap<DocId, usize>,
    strip_top: bool,
}

impl UrlInterner {
    /// Create an interner. With `strip_top`, URLs drop their first path
    /// segment so they resolve relative to the top package's directory.
    pub fn new(strip_top: bool) -> Self {
        Self {
            strip_top,
            ..Self::default()
        }
    }

    /// Id of the page of `module`.
    pub fn intern(&mut self, module: ModuleRef<'_>) -> usize {
        if let Some(&id) = self.memo.get(&module.id()) {
            return id;
        }
        let url = module_url(module);
        let url = if self.strip_top {
            url.split_once('/').map(|(_, rest)| rest.to_string()).unwrap_or(url)
        } else {
            url
        };
        let (id, _) = self.urls.insert_full(url);
        self.memo.insert(module.id(), id);
        id
    }

    /// Number of distinct URLs so far.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// The URLs, indexed by id.
    pub fn into_urls(self) -> Vec<String> {
        self.urls.into_iter().collect()
    }
}

/// One searchable object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    /// Fully qualified name.
    #[serde(rename = "ref")]
    pub refname: String,
    /// Id of the page documenting it.
    pub url: usize,
    /// Normalized docstring, when docstrings are indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// `1` for functions and methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<u8>,
}

/// A built search index.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    /// Page URLs; `IndexRecord::url` indexes into this.
    pub urls: Vec<String>,
    /// Records in pre-order.
    pub index: Vec<IndexRecord>,
}

impl SearchIndex {
    /// The `index.js` payload.
    pub fn to_script(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "URLS={};\nINDEX={}",
            serde_json::to_string(&self.urls)?,
            serde_json::to_string(&self.index)?
        ))
    }
}

/// Build the search index of `unit`.
pub fn build(unit: &Unit, index_docstrings: bool) -> SearchIndex {
    let mut interner = UrlInterner::new(unit.is_package());
    let mut index = Vec::new();
    add_to_index(unit.module().obj(), index_docstrings, &mut interner, &mut index);
    SearchIndex {
        urls: interner.into_urls(),
        index,
    }
}

fn add_to_index(
    obj: ObjRef<'_>,
    index_docstrings: bool,
    interner: &mut UrlInterner,
    index: &mut Vec<IndexRecord>,
) {
    index.push(IndexRecord {
        refname: obj.refname().to_string(),
        url: interner.intern(obj.module()),
        doc: index_docstrings.then(|| trim_docstring(obj.docstring())),
        func: (obj.kind() == DocKind::Function).then_some(1),
    });
    for member in obj.members() {
        add_to_index(member, index_docstrings, interner, index);
    }
}

/// Write `index.js` and `search.html` for `unit`.
///
/// Assets go to the unit's directory for packages, to the output root
/// otherwise.
pub fn write_search_assets(
    writer: &mut OutputWriter<'_>,
    unit: &Unit,
    index_docstrings: bool,
) -> Result<(), WriteError> {
    let search = build(unit, index_docstrings);
    tracing::debug!(
        "Search index for {}: {} records over {} pages",
        unit.name(),
        search.index.len(),
        search.urls.len()
    );

    let mut main_path: PathBuf = writer.output_dir().to_path_buf();
    if unit.is_package() {
        main_path.extend(unit.name().split('.'));
    }

    let script_path = main_path.join("index.js");
    writer.write_file_with(&script_path, |file| {
        let script = search.to_script().map_err(|e| WriteError::Io {
            path: script_path.clone(),
            source: e.into(),
        })?;
        file.write_all(script.as_bytes())
            .map_err(|source| WriteError::Io {
                path: script_path.clone(),
                source,
            })
    })?;

    let renderer = writer.renderer();
    let page_path = main_path.join("search.html");
    writer.write_file_with(&page_path, |file| {
        let html = renderer.search_html(unit.module())?;
        file.write_all(html.as_bytes())
            .map_err(|source| WriteError::Io {
                path: page_path.clone(),
                source,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderConfig, Renderer};
    use pdocs_reflect::DocArena;
    use tempfile::TempDir;

    fn package() -> Unit {
        let mut arena = DocArena::new();
        let root = arena.alloc_module("pkg", None, None, true);
        arena.get_mut(root).docstring = "The **root**\npackage.".into();
        let f = arena.alloc_member(root, "top_level", DocKind::Function, 1);
        arena.get_mut(f).docstring = "Do it.".into();
        let sub = arena.alloc_module("pkg.sub", Some(root), None, false);
        let class = arena.alloc_member(sub, "Thing", DocKind::Class, 1);
        arena.alloc_member(class, "method", DocKind::Function, 2);
        arena.alloc_member(sub, "CONSTANT", DocKind::Variable, 9);
        Unit::new(arena, root)
    }

    #[test]
    fn trims_markup_and_separators() {
        assert_eq!(trim_docstring("Some  *emphasis*\nhere"), "Some  emphasis here");
        assert_eq!(trim_docstring("a <b>bold</b> move"), "a  bold move");
        assert_eq!(trim_docstring("foo -- bar"), "foo  bar");
        assert_eq!(trim_docstring("# Heading"), " Heading");
        assert_eq!(trim_docstring("plain words"), "plain words");
    }

    #[test]
    fn interning_is_stable_within_a_build() {
        let unit = package();
        let mut interner = UrlInterner::new(true);
        let root = unit.module();
        let sub = root.submodules().next().unwrap();

        let a = interner.intern(sub);
        let b = interner.intern(root);
        assert_eq!(interner.intern(sub), a);
        assert_eq!(interner.intern(root), b);
        assert_eq!((a, b), (0, 1));
        assert_eq!(interner.into_urls(), vec!["sub.html", "index.html"]);
    }

    #[test]
    fn unstripped_urls_keep_the_package_segment() {
        let unit = package();
        let mut interner = UrlInterner::new(false);
        interner.intern(unit.module());
        assert_eq!(interner.into_urls(), vec!["pkg/index.html"]);
    }

    #[test]
    fn records_follow_a_pre_order_walk() {
        let unit = package();
        let search = build(&unit, false);
        let refs: Vec<&str> = search.index.iter().map(|r| r.refname.as_str()).collect();
        assert_eq!(
            refs,
            vec![
                "pkg",
                "pkg.top_level",
                "pkg.sub",
                "pkg.sub.Thing",
                "pkg.sub.Thing.method",
                "pkg.sub.CONSTANT",
            ]
        );
        let urls: Vec<usize> = search.index.iter().map(|r| r.url).collect();
        assert_eq!(urls, vec![0, 0, 1, 1, 1, 1]);
        assert_eq!(search.urls, vec!["index.html", "sub.html"]);
        assert!(search.index.iter().all(|r| r.doc.is_none()));
    }

    #[test]
    fn script_is_compact_and_omits_empty_fields() {
        let unit = package();
        let script = build(&unit, true).to_script().unwrap();
        let (urls, index) = script.split_once(";\n").unwrap();
        assert_eq!(urls, r#"URLS=["index.html","sub.html"]"#);
        assert!(index.starts_with(r#"INDEX=[{"ref":"pkg","url":0,"doc":"The  root package."},"#));
        assert!(index.contains(r#"{"ref":"pkg.top_level","url":0,"doc":"Do it.","func":1}"#));
        assert!(index.contains(r#"{"ref":"pkg.sub.CONSTANT","url":1,"doc":""}"#));
    }

    #[test]
    fn assets_land_in_the_package_directory() {
        let tmp = TempDir::new().unwrap();
        let unit = package();
        let renderer = Renderer::new(RenderConfig::default(), None).unwrap();
        let mut writer = OutputWriter::new(tmp.path(), false, &renderer);

        write_search_assets(&mut writer, &unit, true).unwrap();

        let script = std::fs::read_to_string(tmp.path().join("pkg/index.js")).unwrap();
        assert!(script.starts_with("URLS=[\"index.html\",\"sub.html\"];\nINDEX=["));
        let page = std::fs::read_to_string(tmp.path().join("pkg/search.html")).unwrap();
        assert!(page.contains("<script src=\"index.js\"></script>"));
    }
}
