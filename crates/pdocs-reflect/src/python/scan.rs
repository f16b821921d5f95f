//! Line-level scanner for Python sources.
//!
//! The scanner never evaluates anything. It joins physical lines into
//! logical lines (bracket continuation, backslash continuation and
//! triple-quoted strings), then walks them with an indentation stack to find
//! module-level and class-level definitions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DocArena, DocId, DocKind};

static DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("valid regex"));
static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)\s*([(:])").expect("valid regex"));
static ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?::[^=]*)?=(?:[^=]|$)").expect("valid regex")
});

/// A logical source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogicalLine {
    /// Indentation column of the first physical line.
    pub indent: usize,
    /// Text without indentation or comments; continuation newlines inside
    /// strings are preserved.
    pub text: String,
    /// 1-based physical line where the logical line starts.
    pub line: usize,
}

/// A scan error: the 1-based line and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanError {
    pub line: usize,
    pub message: String,
}

/// Split `source` into logical lines.
pub(crate) fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, ScanError> {
    let source = source.replace("\r\n", "\n");
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();

    let mut lines = Vec::new();
    let mut cur = String::new();
    let mut cur_indent = 0;
    let mut cur_start = 1;
    let mut depth = 0usize;
    let mut line = 1;
    let mut fresh = true;
    // (quote, triple-quoted, starting line)
    let mut string: Option<(char, bool, usize)> = None;
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if let Some((quote, triple, start)) = string {
            match c {
                '\\' => {
                    cur.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        cur.push(next);
                        if next == '\n' {
                            line += 1;
                        }
                    }
                    i += 2;
                }
                '\n' if !triple => {
                    return Err(ScanError {
                        line: start,
                        message: "unterminated string literal".to_string(),
                    });
                }
                '\n' => {
                    cur.push(c);
                    line += 1;
                    i += 1;
                }
                _ if c == quote && !triple => {
                    cur.push(c);
                    string = None;
                    i += 1;
                }
                _ if c == quote && chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) => {
                    cur.extend([quote; 3]);
                    string = None;
                    i += 3;
                }
                _ => {
                    cur.push(c);
                    i += 1;
                }
            }
            continue;
        }

        if fresh {
            let mut col = 0;
            while i < len && matches!(chars[i], ' ' | '\t' | '\x0c') {
                col = if chars[i] == '\t' { (col / 8 + 1) * 8 } else { col + 1 };
                i += 1;
            }
            if i >= len {
                break;
            }
            match chars[i] {
                '\n' => {
                    line += 1;
                    i += 1;
                }
                '#' => {
                    while i < len && chars[i] != '\n' {
                        i += 1;
                    }
                }
                _ => {
                    fresh = false;
                    cur_indent = col;
                    cur_start = line;
                }
            }
            continue;
        }

        match c {
            '#' => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' | '\'' => {
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                string = Some((c, triple, line));
                if triple {
                    cur.extend([c; 3]);
                    i += 3;
                } else {
                    cur.push(c);
                    i += 1;
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                cur.push(c);
                i += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                cur.push(c);
                i += 1;
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                cur.push(' ');
                line += 1;
                i += 2;
            }
            '\n' => {
                line += 1;
                i += 1;
                if depth > 0 {
                    cur.push(' ');
                    continue;
                }
                lines.push(LogicalLine {
                    indent: cur_indent,
                    text: cur.trim_end().to_string(),
                    line: cur_start,
                });
                cur.clear();
                fresh = true;
            }
            _ => {
                cur.push(c);
                i += 1;
            }
        }
    }

    if let Some((_, _, start)) = string {
        return Err(ScanError {
            line: start,
            message: "unterminated string literal".to_string(),
        });
    }
    if !cur.trim().is_empty() {
        lines.push(LogicalLine {
            indent: cur_indent,
            text: cur.trim_end().to_string(),
            line: cur_start,
        });
    }

    Ok(lines)
}

/// If `text` is exactly one string literal, return its contents.
pub(crate) fn string_literal(text: &str) -> Option<&str> {
    let prefix = text
        .chars()
        .take_while(|c| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B'))
        .count();
    if prefix > 2 {
        return None;
    }
    let rest = &text[prefix..];
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if rest.len() >= 2 * quote.len() && rest.starts_with(quote) && rest.ends_with(quote) {
            let inner = &rest[quote.len()..rest.len() - quote.len()];
            if contains_unescaped(inner, quote) {
                return None;
            }
            return Some(inner);
        }
    }
    None
}

fn contains_unescaped(haystack: &str, needle: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let at = from + pos;
        let backslashes = haystack[..at].chars().rev().take_while(|&c| c == '\\').count();
        if backslashes % 2 == 0 {
            return true;
        }
        from = at + needle.len();
    }
    false
}

/// Normalize docstring indentation the way Python's `inspect.cleandoc` does.
pub(crate) fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };

    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.push(first.trim());
    for l in rest {
        let dedented = l.get(margin..).unwrap_or_else(|| l.trim_start());
        out.push(dedented.trim_end());
    }

    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Split `text` at the first top-level `delim`, ignoring nested brackets and strings.
fn split_top_level(text: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if c == delim && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Index of the bracket closing the one opened at `open`.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A parsed definition header.
#[derive(Debug, PartialEq, Eq)]
struct Header {
    name: String,
    /// Function signature or class bases, depending on the header kind.
    detail: Vec<String>,
    /// Whether statements follow the colon on the same line.
    inline_body: bool,
}

fn parse_def(text: &str) -> Option<Header> {
    let caps = DEF_RE.captures(text)?;
    let name = caps[1].to_string();
    let open = caps.get(0)?.end() - 1;
    let close = matching_close(text, open)?;
    let params = collapse_whitespace(&text[open + 1..close]);
    let params = params.trim_end_matches(',').trim_end();

    let after = &text[close + 1..];
    let colon = split_top_level(after, ':');
    let head = colon.first().copied().unwrap_or_default().trim();
    let returns = head.strip_prefix("->").map(str::trim).filter(|r| !r.is_empty());

    let mut signature = format!("({params})");
    if let Some(ret) = returns {
        signature.push_str(" -> ");
        signature.push_str(&collapse_whitespace(ret));
    }
    let inline_body = colon.len() > 1 && !colon[1..].join(":").trim().is_empty();

    Some(Header {
        name,
        detail: vec![signature],
        inline_body,
    })
}

fn parse_class(text: &str) -> Option<Header> {
    let caps = CLASS_RE.captures(text)?;
    let name = caps[1].to_string();
    let marker = caps.get(2)?;

    let (bases, after) = if &caps[2] == "(" {
        let close = matching_close(text, marker.start())?;
        let bases = split_top_level(&text[marker.start() + 1..close], ',')
            .into_iter()
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.contains('='))
            .map(collapse_whitespace)
            .collect();
        let after = text[close + 1..].trim_start();
        (bases, after.strip_prefix(':').unwrap_or(after))
    } else {
        (Vec::new(), &text[marker.end()..])
    };

    Some(Header {
        name,
        detail: bases,
        inline_body: !after.trim().is_empty(),
    })
}

enum Scope {
    Container(DocId),
    Opaque,
}

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

fn is_public(name: &str) -> bool {
    !name.starts_with('_')
}

/// Docstring carried by the logical line at `index`, when it is a bare string
/// and `accept` agrees with its indentation.
fn docstring_at(lines: &[LogicalLine], index: usize, accept: impl Fn(usize) -> bool) -> Option<String> {
    let line = lines.get(index)?;
    if !accept(line.indent) {
        return None;
    }
    string_literal(&line.text).map(clean_docstring)
}

/// Scan `source` and attach its definitions to the module `module`.
pub(crate) fn scan_module(arena: &mut DocArena, module: DocId, source: &str) -> Result<(), ScanError> {
    let lines = logical_lines(source)?;

    if let Some(doc) = docstring_at(&lines, 0, |_| true) {
        arena.get_mut(module).docstring = doc;
    }

    let mut stack: Vec<(usize, Scope)> = Vec::new();

    for (index, logical) in lines.iter().enumerate() {
        while stack.last().is_some_and(|(indent, _)| *indent >= logical.indent) {
            stack.pop();
        }
        let container = match stack.last() {
            None => module,
            Some((_, Scope::Container(id))) => *id,
            Some((_, Scope::Opaque)) => continue,
        };
        let indent = logical.indent;
        let body_doc = |h: &Header| {
            if h.inline_body {
                None
            } else {
                docstring_at(&lines, index + 1, |i| i > indent)
            }
        };

        if let Some(header) = parse_def(&logical.text) {
            if is_public(&header.name) && arena.member_named(container, &header.name).is_none() {
                let id = arena.alloc_member(container, &header.name, DocKind::Function, logical.line);
                let doc = body_doc(&header);
                let obj = arena.get_mut(id);
                obj.signature = header.detail.into_iter().next();
                obj.docstring = doc.unwrap_or_default();
            }
            stack.push((indent, Scope::Opaque));
        } else if let Some(header) = parse_class(&logical.text) {
            if is_public(&header.name) && arena.member_named(container, &header.name).is_none() {
                let id = arena.alloc_member(container, &header.name, DocKind::Class, logical.line);
                let doc = body_doc(&header);
                let obj = arena.get_mut(id);
                obj.docstring = doc.unwrap_or_default();
                obj.bases = header.detail;
                stack.push((indent, Scope::Container(id)));
            } else {
                stack.push((indent, Scope::Opaque));
            }
        } else if let Some(caps) = ASSIGN_RE.captures(&logical.text) {
            let name = &caps[1];
            if !is_public(name) || KEYWORDS.contains(&name) {
                continue;
            }
            let doc = docstring_at(&lines, index + 1, |i| i == indent);
            match arena.member_named(container, name) {
                Some(existing) => {
                    if let Some(doc) = doc {
                        let obj = arena.get_mut(existing);
                        if obj.kind == DocKind::Variable {
                            obj.docstring = doc;
                        }
                    }
                }
                None => {
                    let id = arena.alloc_member(container, name, DocKind::Variable, logical.line);
                    arena.get_mut(id).docstring = doc.unwrap_or_default();
                }
            }
        }
    }

    Ok(())
}
