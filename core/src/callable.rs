//! The landing manifest: a callable's logic plus its captured environment.
//!
//! A compiled program cannot read its own source back, so everything that
//! has to travel is declared up front: the Python definition, the values the
//! definition closes over, and optionally the other callables it relies on.
//! Captures are encoded when they are added, which makes the manifest a
//! snapshot taken at landing time rather than at call time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{LandingError, Result};
use crate::wire;


// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// One captured free variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// The value in wire form.
    Encoded(Value),
    /// A value with no wire form (an open handle, a map with tuple keys, ...).
    Unencodable { type_name: String, reason: String },
}


// ---------------------------------------------------------------------------
// Callable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
    name: String,
    source: String,
    captures: BTreeMap<String, Capture>,
    uses: BTreeSet<String>,
}

impl Callable {
    /// Build a manifest for `name` from `source`.
    ///
    /// Only the top-level definition of `name` is kept: its decorators,
    /// header and body. Everything else in `source` (imports, other
    /// functions, a `__main__` guard) stays behind, so modules the function
    /// needs are imported inside its body.
    pub fn new(name: &str, source: &str) -> Result<Callable> {
        if !wire::is_identifier(name) {
            return Err(LandingError::InvalidCallable(format!(
                "'{}' is not a valid function name",
                name
            )));
        }
        if wire::is_reserved(name) {
            return Err(LandingError::InvalidCallable(format!(
                "'{}' uses the reserved prefix '{}'",
                name,
                wire::RESERVED_PREFIX
            )));
        }
        let source = extract_definition(source, name).ok_or_else(|| {
            LandingError::InvalidCallable(format!("source does not define '{}'", name))
        })?;
        Ok(Callable {
            name: name.to_string(),
            source,
            captures: BTreeMap::new(),
            uses: BTreeSet::new(),
        })
    }

    /// Build a manifest for the first top-level function in `source`.
    pub fn from_source(source: &str) -> Result<Callable> {
        let name = definition_name(source).ok_or_else(|| {
            LandingError::InvalidCallable("no top-level function definition found".into())
        })?;
        Callable::new(&name, source)
    }

    /// One manifest per top-level function in `source`, in order of first
    /// appearance.
    pub fn all_from_source(source: &str) -> Result<Vec<Callable>> {
        let names = definition_names(source);
        if names.is_empty() {
            return Err(LandingError::InvalidCallable(
                "no top-level function definition found".into(),
            ));
        }
        names.iter().map(|name| Callable::new(name, source)).collect()
    }

    /// Read a Python file and build a manifest for its first function.
    pub fn from_file(path: &Path) -> Result<Callable> {
        let source = std::fs::read_to_string(path)?;
        Callable::from_source(&source)
    }

    /// Capture a value under `name`. Values that fail to encode are kept as
    /// [`Capture::Unencodable`]; the context filter decides what happens to
    /// them.
    pub fn capture<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Callable {
        let capture = match serde_json::to_value(value) {
            Ok(v) => Capture::Encoded(v),
            Err(e) => Capture::Unencodable {
                type_name: std::any::type_name::<T>().to_string(),
                reason: e.to_string(),
            },
        };
        self.captures.insert(name.to_string(), capture);
        self
    }

    /// Record a captured value that has no wire form at all.
    pub fn capture_opaque<T: ?Sized>(mut self, name: &str) -> Callable {
        let type_name = std::any::type_name::<T>().to_string();
        self.captures.insert(
            name.to_string(),
            Capture::Unencodable {
                reason: format!("{} has no wire representation", type_name),
                type_name,
            },
        );
        self
    }

    /// Declare a reference to another callable that a source scan would miss
    /// (calls made through `getattr`, `globals()` and the like).
    pub fn uses(mut self, name: &str) -> Callable {
        self.uses.insert(name.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn captures(&self) -> &BTreeMap<String, Capture> {
        &self.captures
    }

    pub fn declared_uses(&self) -> &BTreeSet<String> {
        &self.uses
    }
}


// ---------------------------------------------------------------------------
// Source helpers
// ---------------------------------------------------------------------------

/// Remove the indentation common to all non-blank lines.
pub fn dedent(source: &str) -> String {
    let margin = source
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(&line[margin..]);
            out.push('\n');
        }
    }
    out
}

/// Name of the first top-level `def` (or `async def`).
pub fn definition_name(source: &str) -> Option<String> {
    definition_names(source).into_iter().next()
}

/// Names of all top-level functions, in order of first appearance.
pub fn definition_names(source: &str) -> Vec<String> {
    let source = dedent(source);
    let flags = continuation_flags(&source);
    let mut names: Vec<String> = Vec::new();
    for (line, continued) in source.lines().zip(flags) {
        if continued {
            continue;
        }
        if let Some(name) = header_name(line) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// The text of the top-level definition of `name`: decorators, header and
/// body, dedented. When `name` is defined more than once the last definition
/// wins, as it would when the file is executed.
pub fn extract_definition(source: &str, name: &str) -> Option<String> {
    let source = dedent(source);
    let lines: Vec<&str> = source.lines().collect();
    let flags = continuation_flags(&source);

    let header = (0..lines.len())
        .rev()
        .find(|&i| !flags[i] && header_name(lines[i]) == Some(name))?;

    let mut start = header;
    while start > 0 {
        let mut above = start - 1;
        while above > 0 && flags[above] {
            above -= 1;
        }
        if lines[above].starts_with('@') {
            start = above;
        } else {
            break;
        }
    }

    let mut end = header;
    for (i, line) in lines.iter().enumerate().skip(header + 1) {
        if flags[i] {
            end = i;
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.len() == line.len() {
            break;
        }
        end = i;
    }

    let mut text = lines[start..=end].join("\n");
    text.push('\n');
    Some(text)
}

/// The function name declared by a `def` line at column 0.
fn header_name(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("async def ")
        .or_else(|| line.strip_prefix("def "))?
        .trim_start();
    let end = rest
        .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(rest.len());
    let (name, after) = rest.split_at(end);
    if name.is_empty() || !after.trim_start().starts_with('(') {
        return None;
    }
    Some(name)
}

/// For each line, whether it continues a statement begun on an earlier line:
/// inside brackets, inside a triple-quoted string, or after a trailing
/// backslash.
fn continuation_flags(source: &str) -> Vec<bool> {
    let mut flags = Vec::new();
    let mut depth: usize = 0;
    // Open string: its quote character and whether it is triple-quoted.
    let mut quote: Option<(char, bool)> = None;
    let mut joined = false;

    for line in source.lines() {
        flags.push(depth > 0 || joined || matches!(quote, Some((_, true))));
        joined = false;

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match quote {
                Some((q, triple)) => {
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == q {
                        if !triple {
                            quote = None;
                        } else if chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                            quote = None;
                            i += 3;
                            continue;
                        }
                    }
                }
                None => match c {
                    '#' => break,
                    '\'' | '"' => {
                        let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                        quote = Some((c, triple));
                        i += if triple { 3 } else { 1 };
                        continue;
                    }
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth = depth.saturating_sub(1),
                    '\\' if i + 1 == chars.len() => joined = true,
                    _ => {}
                },
            }
            i += 1;
        }

        if let Some((_, false)) = quote {
            if line.ends_with('\\') {
                joined = true;
            } else {
                quote = None;
            }
        }
    }
    flags
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
