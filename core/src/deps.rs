//! Dependency discovery for landed callables.
//!
//! A callable's source is tokenised just far enough to find bare-name calls
//! (`helper(...)`, not `obj.helper(...)`). Those names, plus any references
//! the manifest declares, are matched against the registry. The closure is
//! followed transitively and emitted dependencies-first in a stable order.
//!
//! Calls written inside f-string replacement fields are not seen by the scan;
//! declare those with [`Callable::uses`].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::callable::Callable;
use crate::registry::Registry;
use crate::wire;


// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Dot,
    LParen,
    Other,
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            if c == '#' {
                self.skip_comment();
            } else if c == '\'' || c == '"' {
                self.skip_string();
                out.push(Token::Other);
            } else if c == '_' || c.is_alphabetic() {
                let word = self.read_word();
                if is_string_prefix(&word) && matches!(self.peek(), Some('\'') | Some('"')) {
                    self.skip_string();
                    out.push(Token::Other);
                } else {
                    out.push(Token::Ident(word));
                }
            } else if c.is_ascii_digit() {
                self.skip_number();
                out.push(Token::Other);
            } else if c.is_whitespace() {
                self.pos += 1;
            } else {
                self.pos += 1;
                out.push(match c {
                    '.' => Token::Dot,
                    '(' => Token::LParen,
                    _ => Token::Other,
                });
            }
        }
        out
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn read_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn skip_number(&mut self) {
        // Digits, letters (hex, exponents, suffixes) and embedded dots.
        while let Some(c) = self.peek() {
            if c == '_' || c == '.' || c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Positioned on the opening quote.
    fn skip_string(&mut self) {
        let quote = match self.peek() {
            Some(q) => q,
            None => return,
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 2;
                continue;
            }
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return;
                }
            } else if c == '\n' && !triple {
                // Unterminated single-line literal; resume scanning.
                return;
            }
            self.pos += 1;
        }
    }
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "b" | "u" | "f" | "rb" | "br" | "fr" | "rf"
    )
}


// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Every name called bare in `source`, deduplicated.
///
/// Attribute calls, definitions (`def name(`), class headers and keywords
/// followed by a parenthesis (`if (`, `return (`) are not counted.
pub fn scan_calls(source: &str) -> BTreeSet<String> {
    let tokens = Scanner::new(source).tokens();
    let mut calls = BTreeSet::new();
    for (i, token) in tokens.iter().enumerate() {
        let name = match token {
            Token::Ident(name) => name,
            _ => continue,
        };
        if tokens.get(i + 1) != Some(&Token::LParen) || wire::is_keyword(name) {
            continue;
        }
        let after_dot_or_def = match i.checked_sub(1).map(|p| &tokens[p]) {
            Some(Token::Dot) => true,
            Some(Token::Ident(prev)) => prev == "def" || prev == "class",
            _ => false,
        };
        if !after_dot_or_def {
            calls.insert(name.clone());
        }
    }
    calls
}

/// Landed callables directly referenced by `callable`, excluding itself.
pub fn direct_references(callable: &Callable, registry: &Registry) -> BTreeSet<String> {
    scan_calls(callable.source())
        .into_iter()
        .chain(callable.declared_uses().iter().cloned())
        .filter(|name| name != callable.name() && registry.is_landed(name))
        .collect()
}


// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// The transitive dependency closure of `target`, dependencies first.
///
/// Ordering is a depth-first post-order over the reference graph with
/// neighbours visited by name, so the same registry always yields the same
/// sequence. Cycles are cut at the first revisit; Python resolves function
/// names at call time, so definition order inside a cycle does not matter.
pub fn resolve(target: &Callable, registry: &Registry) -> Vec<Arc<Callable>> {
    let mut visited = BTreeSet::new();
    visited.insert(target.name().to_string());
    let mut order = Vec::new();
    for name in direct_references(target, registry) {
        visit(&name, registry, &mut visited, &mut order);
    }
    order
}

fn visit(
    name: &str,
    registry: &Registry,
    visited: &mut BTreeSet<String>,
    order: &mut Vec<Arc<Callable>>,
) {
    if !visited.insert(name.to_string()) {
        return;
    }
    let callable = match registry.get(name) {
        Some(c) => c,
        None => return,
    };
    for next in direct_references(&callable, registry) {
        visit(&next, registry, visited, order);
    }
    order.push(callable);
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
