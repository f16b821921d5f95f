//! Markdown documentation renderer.

use pdocs_reflect::{DocKind, ModuleRef, ObjRef};

/// Render `modules` as one document suitable for Markdown-to-PDF converters.
pub fn render_pdf(modules: &[ModuleRef<'_>]) -> String {
    let names: Vec<&str> = modules.iter().map(|m| m.name()).collect();

    let mut md = String::new();
    md.push_str("---\n");
    md.push_str("description: |\n");
    md.push_str(&format!("    API documentation for modules: {}.\n\n", names.join(", ")));
    md.push_str("lang: en\n\n");
    md.push_str("classoption: oneside\n");
    md.push_str("geometry: margin=1in\n");
    md.push_str("papersize: a4\n\n");
    md.push_str("linkcolor: blue\n");
    md.push_str("links-as-notes: true\n");
    md.push_str("...\n\n");

    for (i, module) in modules.iter().enumerate() {
        if i > 0 {
            md.push_str("\n-----\n\n");
        }
        md.push_str(&render_module(*module));
    }

    md
}

/// Render one module as Markdown.
pub fn render_module(module: ModuleRef<'_>) -> String {
    let h = |n: usize| "#".repeat(n + 1);
    let mut md = String::new();

    // Module header
    let kind = if module.is_package() { "Package" } else { "Module" };
    md.push_str(&format!("{} {} `{}`\n\n", h(0), kind, module.name()));

    if !module.docstring().is_empty() {
        md.push_str(module.docstring());
        md.push_str("\n\n");
    }

    // Sub-modules
    let submodules: Vec<_> = module.submodules().collect();
    if !submodules.is_empty() {
        md.push_str(&format!("{} Sub-modules\n\n", h(1)));
        for sub in submodules {
            md.push_str(&format!("* `{}`\n", sub.name()));
        }
        md.push('\n');
    }

    // Variables
    let variables: Vec<_> = module.members_of(DocKind::Variable).collect();
    if !variables.is_empty() {
        md.push_str(&format!("{} Variables\n\n", h(1)));
        for var in variables {
            push_variable(&mut md, var, &h(2));
        }
    }

    // Functions
    let functions: Vec<_> = module.members_of(DocKind::Function).collect();
    if !functions.is_empty() {
        md.push_str(&format!("{} Functions\n\n", h(1)));
        for func in functions {
            push_function(&mut md, func, &h(2));
        }
    }

    // Classes
    let classes: Vec<_> = module.members_of(DocKind::Class).collect();
    if !classes.is_empty() {
        md.push_str(&format!("{} Classes\n\n", h(1)));
        for class in classes {
            let bases = if class.bases().is_empty() {
                String::new()
            } else {
                format!("({})", class.bases().join(", "))
            };
            md.push_str(&format!("{} Class `{}`\n\n", h(2), class.name()));
            md.push_str(&format!("> `class {}{}`\n\n", class.name(), bases));
            push_docstring(&mut md, class.docstring());

            let class_vars: Vec<_> = class.members().filter(|m| m.kind() == DocKind::Variable).collect();
            if !class_vars.is_empty() {
                md.push_str(&format!("{} Class variables\n\n", h(3)));
                for var in class_vars {
                    push_variable(&mut md, var, &h(4));
                }
            }

            let methods: Vec<_> = class.members().filter(|m| m.kind() == DocKind::Function).collect();
            if !methods.is_empty() {
                md.push_str(&format!("{} Methods\n\n", h(3)));
                for method in methods {
                    push_function(&mut md, method, &h(4));
                }
            }
        }
    }

    md
}

fn push_variable(md: &mut String, var: ObjRef<'_>, heading: &str) {
    md.push_str(&format!("{} Variable `{}`\n\n", heading, var.name()));
    push_docstring(md, var.docstring());
}

fn push_function(md: &mut String, func: ObjRef<'_>, heading: &str) {
    md.push_str(&format!("{} Function `{}`\n\n", heading, func.name()));
    md.push_str(&format!(
        "> `def {}{}`\n\n",
        func.name(),
        func.signature().unwrap_or("()")
    ));
    push_docstring(md, func.docstring());
}

fn push_docstring(md: &mut String, doc: &str) {
    if !doc.is_empty() {
        md.push_str(doc);
        md.push_str("\n\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdocs_reflect::{DocArena, Unit};

    fn sample() -> Unit {
        let mut arena = DocArena::new();
        let root = arena.alloc_module("calc", None, None, false);
        arena.get_mut(root).docstring = "Arithmetic helpers.".into();
        let add = arena.alloc_member(root, "add", DocKind::Function, 1);
        arena.get_mut(add).signature = Some("(a, b)".into());
        arena.get_mut(add).docstring = "Add two numbers.".into();
        let class = arena.alloc_member(root, "Acc", DocKind::Class, 4);
        arena.get_mut(class).bases = vec!["object".into()];
        arena.alloc_member(class, "total", DocKind::Variable, 5);
        Unit::new(arena, root)
    }

    #[test]
    fn module_text_lists_members() {
        let unit = sample();
        let md = render_module(unit.module());
        assert!(md.starts_with("# Module `calc`\n\nArithmetic helpers.\n\n"));
        assert!(md.contains("### Function `add`\n\n> `def add(a, b)`\n\nAdd two numbers.\n\n"));
        assert!(md.contains("> `class Acc(object)`"));
        assert!(md.contains("#### Class variables\n\n##### Variable `total`"));
    }

    #[test]
    fn pdf_document_has_front_matter_and_every_module() {
        let first = sample();
        let mut arena = DocArena::new();
        let root = arena.alloc_module("other", None, None, false);
        let second = Unit::new(arena, root);

        let md = render_pdf(&[first.module(), second.module()]);
        assert!(md.starts_with("---\ndescription: |\n    API documentation for modules: calc, other.\n"));
        assert!(md.contains("# Module `calc`"));
        assert!(md.contains("\n-----\n\n# Module `other`"));
    }
}
