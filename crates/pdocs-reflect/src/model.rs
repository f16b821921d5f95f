//! Documentation object model.
//!
//! Documentation objects live in a [`DocArena`] and refer to each other by
//! [`DocId`]. A member knows its defining module and its parent only as keys,
//! so the graph can contain back-references without reference cycles.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stable key of a documentation object inside its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(u32);

impl DocId {
    /// Position of the object in its arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind of a documentation object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    /// A module or package.
    Module,
    /// A class.
    Class,
    /// A function or method.
    Function,
    /// A module or class variable.
    Variable,
}

/// A single documented object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocObject {
    /// Short name (last dotted component).
    pub name: String,
    /// Fully qualified dotted name.
    pub refname: String,
    /// What this object is.
    pub kind: DocKind,
    /// Cleaned docstring, empty when undocumented.
    pub docstring: String,
    /// The module that defines this object. Modules point at themselves.
    pub module: DocId,
    /// Enclosing object, `None` for the root module.
    pub parent: Option<DocId>,
    /// Members in source order. Packages list their submodules last.
    pub members: Vec<DocId>,
    /// Parameter list and return annotation of functions, e.g. `(a, b=1) -> int`.
    pub signature: Option<String>,
    /// Base class expressions of classes, as written.
    pub bases: Vec<String>,
    /// Backing source file of modules.
    pub source_file: Option<PathBuf>,
    /// Whether a module is a package.
    pub is_package: bool,
    /// 1-based source line of the definition.
    pub line: Option<usize>,
}

/// Owner of all documentation objects of one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocArena {
    objects: Vec<DocObject>,
}

impl DocArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects ever allocated (including pruned ones).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocate a new module object.
    pub fn alloc_module(
        &mut self,
        refname: &str,
        parent: Option<DocId>,
        source_file: Option<PathBuf>,
        is_package: bool,
    ) -> DocId {
        let id = DocId(self.objects.len() as u32);
        let name = refname.rsplit('.').next().unwrap_or(refname).to_string();
        self.objects.push(DocObject {
            name,
            refname: refname.to_string(),
            kind: DocKind::Module,
            docstring: String::new(),
            module: id,
            parent,
            members: Vec::new(),
            signature: None,
            bases: Vec::new(),
            source_file,
            is_package,
            line: None,
        });
        if let Some(parent) = parent {
            self.objects[parent.index()].members.push(id);
        }
        id
    }

    /// Allocate a member object under `parent` and return its id.
    pub fn alloc_member(&mut self, parent: DocId, name: &str, kind: DocKind, line: usize) -> DocId {
        let id = DocId(self.objects.len() as u32);
        let parent_obj = &self.objects[parent.index()];
        let module = parent_obj.module;
        let refname = format!("{}.{}", parent_obj.refname, name);
        self.objects.push(DocObject {
            name: name.to_string(),
            refname,
            kind,
            docstring: String::new(),
            module,
            parent: Some(parent),
            members: Vec::new(),
            signature: None,
            bases: Vec::new(),
            source_file: None,
            is_package: false,
            line: Some(line),
        });
        self.objects[parent.index()].members.push(id);
        id
    }

    /// Shared access to an object.
    pub fn get(&self, id: DocId) -> &DocObject {
        &self.objects[id.index()]
    }

    /// Mutable access to an object.
    pub fn get_mut(&mut self, id: DocId) -> &mut DocObject {
        &mut self.objects[id.index()]
    }

    /// Find a direct member of `parent` by short name.
    pub fn member_named(&self, parent: DocId, name: &str) -> Option<DocId> {
        self.get(parent)
            .members
            .iter()
            .copied()
            .find(|&m| self.get(m).name == name)
    }

    /// Drop every object allocated at or after `len`.
    ///
    /// References to dropped objects are removed from the remaining ones, so
    /// a failed load can be rolled back to a saved [`len`](Self::len).
    pub fn truncate(&mut self, len: usize) {
        if len >= self.objects.len() {
            return;
        }
        self.objects.truncate(len);
        for obj in &mut self.objects {
            obj.members.retain(|m| m.index() < len);
        }
    }

    /// Detach members of `parent` (recursively) for which `keep` is false.
    ///
    /// Modules are never detached. Detached objects stay allocated but are no
    /// longer reachable from the tree.
    pub fn retain_members(&mut self, parent: DocId, keep: &dyn Fn(&DocArena, DocId) -> bool) {
        let members = self.get(parent).members.clone();
        let kept: Vec<DocId> = members
            .into_iter()
            .filter(|&m| self.get(m).kind == DocKind::Module || keep(self, m))
            .collect();
        for &m in &kept {
            self.retain_members(m, keep);
        }
        self.get_mut(parent).members = kept;
    }
}

/// A loaded documentable unit: a module or package and all of its submodules.
#[derive(Debug, Clone)]
pub struct Unit {
    arena: DocArena,
    root: DocId,
}

impl Unit {
    /// Wrap an arena whose `root` is a module object.
    pub fn new(arena: DocArena, root: DocId) -> Self {
        debug_assert_eq!(arena.get(root).kind, DocKind::Module);
        Self { arena, root }
    }

    /// The root module.
    pub fn module(&self) -> ModuleRef<'_> {
        ModuleRef {
            arena: &self.arena,
            id: self.root,
        }
    }

    /// Dotted name of the root module.
    pub fn name(&self) -> &str {
        &self.arena.get(self.root).refname
    }

    /// Whether the root module is a package.
    pub fn is_package(&self) -> bool {
        self.arena.get(self.root).is_package
    }
}

/// Borrowed view of a module object.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRef<'a> {
    arena: &'a DocArena,
    id: DocId,
}

impl<'a> ModuleRef<'a> {
    /// Key of this module in its arena.
    pub fn id(self) -> DocId {
        self.id
    }

    /// The module as a generic object.
    pub fn obj(self) -> ObjRef<'a> {
        ObjRef {
            arena: self.arena,
            id: self.id,
        }
    }

    /// Full dotted name, e.g. `pkg.sub`.
    pub fn name(self) -> &'a str {
        &self.arena.get(self.id).refname
    }

    /// Module docstring.
    pub fn docstring(self) -> &'a str {
        &self.arena.get(self.id).docstring
    }

    /// Whether this module is a package.
    pub fn is_package(self) -> bool {
        self.arena.get(self.id).is_package
    }

    /// Backing source file, if any.
    pub fn source_file(self) -> Option<&'a Path> {
        self.arena.get(self.id).source_file.as_deref()
    }

    /// The package this module belongs to, `None` for a unit's root.
    pub fn supermodule(self) -> Option<ModuleRef<'a>> {
        self.arena
            .get(self.id)
            .parent
            .map(|id| ModuleRef { arena: self.arena, id })
    }

    /// The root module of the unit this module belongs to.
    pub fn top(self) -> ModuleRef<'a> {
        let mut module = self;
        while let Some(parent) = module.supermodule() {
            module = parent;
        }
        module
    }

    /// Direct submodules in insertion order.
    pub fn submodules(self) -> impl Iterator<Item = ModuleRef<'a>> + 'a {
        let arena = self.arena;
        arena
            .get(self.id)
            .members
            .iter()
            .copied()
            .filter(move |&m| arena.get(m).kind == DocKind::Module)
            .map(move |id| ModuleRef { arena, id })
    }

    /// Non-module members of a given kind, in source order.
    pub fn members_of(self, kind: DocKind) -> impl Iterator<Item = ObjRef<'a>> + 'a {
        self.obj().members().filter(move |m| m.kind() == kind)
    }
}

/// Borrowed view of any documentation object.
#[derive(Debug, Clone, Copy)]
pub struct ObjRef<'a> {
    arena: &'a DocArena,
    id: DocId,
}

impl<'a> ObjRef<'a> {
    /// Key of this object in its arena.
    pub fn id(self) -> DocId {
        self.id
    }

    fn data(self) -> &'a DocObject {
        self.arena.get(self.id)
    }

    /// Short name.
    pub fn name(self) -> &'a str {
        &self.data().name
    }

    /// Fully qualified dotted name.
    pub fn refname(self) -> &'a str {
        &self.data().refname
    }

    /// Object kind.
    pub fn kind(self) -> DocKind {
        self.data().kind
    }

    /// Docstring.
    pub fn docstring(self) -> &'a str {
        &self.data().docstring
    }

    /// Function signature.
    pub fn signature(self) -> Option<&'a str> {
        self.data().signature.as_deref()
    }

    /// Class bases.
    pub fn bases(self) -> &'a [String] {
        &self.data().bases
    }

    /// Definition line.
    pub fn line(self) -> Option<usize> {
        self.data().line
    }

    /// The module that defines this object.
    pub fn module(self) -> ModuleRef<'a> {
        ModuleRef {
            arena: self.arena,
            id: self.data().module,
        }
    }

    /// Direct members in insertion order.
    pub fn members(self) -> impl Iterator<Item = ObjRef<'a>> + 'a {
        let arena = self.arena;
        self.data()
            .members
            .iter()
            .copied()
            .map(move |id| ObjRef { arena, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Unit {
        let mut arena = DocArena::new();
        let root = arena.alloc_module("pkg", None, Some("pkg/__init__.py".into()), true);
        let class = arena.alloc_member(root, "Greeter", DocKind::Class, 3);
        arena.alloc_member(class, "greet", DocKind::Function, 5);
        let sub = arena.alloc_module("pkg.sub", Some(root), Some("pkg/sub.py".into()), false);
        arena.alloc_member(sub, "helper", DocKind::Function, 1);
        Unit::new(arena, root)
    }

    #[test]
    fn members_reference_their_defining_module_by_key() {
        let unit = sample();
        let class = unit.module().members_of(DocKind::Class).next().unwrap();
        let method = class.members().next().unwrap();
        assert_eq!(method.refname(), "pkg.Greeter.greet");
        assert_eq!(method.module().name(), "pkg");

        let sub = unit.module().submodules().next().unwrap();
        assert_eq!(sub.name(), "pkg.sub");
        assert_eq!(sub.obj().module().id(), sub.id());
        assert_eq!(sub.obj().name(), "sub");
        assert_eq!(sub.supermodule().map(|m| m.name()), Some("pkg"));
        assert_eq!(sub.top().id(), unit.module().id());
        assert!(unit.module().supermodule().is_none());
    }

    #[test]
    fn retain_members_keeps_modules() {
        let mut unit = sample();
        let root = unit.root;
        unit.arena.retain_members(root, &|_, _| false);
        let module = unit.module();
        assert_eq!(module.obj().members().count(), 1);
        let sub = module.submodules().next().unwrap();
        assert_eq!(sub.obj().members().count(), 0);
    }

    #[test]
    fn truncate_rolls_back_a_partial_submodule() {
        let mut unit = sample();
        let root = unit.root;
        let mark = unit.arena.len();
        let broken = unit.arena.alloc_module("pkg.broken", Some(root), None, false);
        unit.arena.alloc_member(broken, "half", DocKind::Function, 1);

        unit.arena.truncate(mark);
        assert_eq!(unit.arena.len(), mark);
        let subs: Vec<_> = unit.module().submodules().map(|m| m.name()).collect();
        assert_eq!(subs, vec!["pkg.sub"]);
        assert_eq!(unit.module().obj().members().count(), 2);
    }
}
