//! Lightweight SQL scanning
//!
//! This is a lexical scanner, not a SQL parser. It knows enough about
//! single-quoted literals and comments to avoid false references, and
//! splits the remaining text into candidate identifier tokens.
//!
//! ## Literal rules
//!
//! Inside a single-quoted literal both `''` and `\'` are escapes. A literal
//! that forms the body of a `LANGUAGE SQL` routine (`... LANGUAGE SQL ... AS
//! '<body>'`) is code rather than data and survives literal removal.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::util::unquote;

static LANGUAGE_SQL_BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bLANGUAGE\s+SQL\b.*\bAS\s*$").unwrap());

static CTE_FIRST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWITH\s+(?:RECURSIVE\s+)?(\w+)\s+AS\s*\(").unwrap());

static CTE_NEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\)\s*,\s*(\w+)\s+AS\s*\(").unwrap());

/// Characters that can never be part of an identifier token. Double
/// quotes also separate tokens but are handled in [`split_tokens`], since
/// a quoted part joins a dotted name.
#[inline]
fn is_delimiter(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')'
                | '['
                | ']'
                | '{'
                | '}'
                | ','
                | ';'
                | '\''
                | '='
                | '@'
                | ':'
                | '+'
                | '-'
                | '*'
                | '/'
                | '<'
                | '>'
                | '!'
                | '|'
                | '%'
                | '^'
                | '~'
                | '&'
        )
}

/// Split neutralized SQL into identifier tokens with double quotes removed.
///
/// A quoted part belongs to the current token only when it directly
/// follows a `.`, and the token continues past it only when a `.` comes
/// next: `"S"."T"` is one token, `from"T"` is two.
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            if !current.is_empty() && !current.ends_with('.') {
                tokens.push(std::mem::take(&mut current));
            }
            for q in chars.by_ref() {
                if q == '"' {
                    break;
                }
                current.push(q);
            }
            if chars.peek() != Some(&'.') && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if is_delimiter(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Copy a single-quoted literal starting at `chars[start]` (the opening
/// quote) into `out` when `keep` is set. Returns the index just past the
/// closing quote, or the end of input for an unterminated literal.
fn scan_literal(chars: &[char], start: usize, keep: bool, out: &mut String) -> usize {
    let mut i = start + 1;
    if keep {
        out.push('\'');
    }
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            if keep {
                out.push(c);
                out.push(chars[i + 1]);
            }
            i += 2;
            continue;
        }
        if c == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                if keep {
                    out.push_str("''");
                }
                i += 2;
                continue;
            }
            if keep {
                out.push('\'');
            }
            return i + 1;
        }
        if keep {
            out.push(c);
        }
        i += 1;
    }
    i
}

/// Strip `--` and `//` line comments and `/* ... */` block comments.
///
/// The line break ending a line comment is kept. Literal content is never
/// altered, so `'-- not a comment'` survives untouched.
pub fn remove_sql_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (c, next) {
            ('\'', _) => {
                i = scan_literal(&chars, i, true, &mut out);
            }
            ('-', Some('-')) | ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Empty the interior of every single-quoted literal, leaving the quotes
/// and the surrounding SQL in place.
pub fn remove_sql_string_literals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut statement_start = 0;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\'' => {
                let keep = LANGUAGE_SQL_BODY_RE.is_match(&out[statement_start..]);
                let end = scan_literal(&chars, i, keep, &mut out);
                if !keep {
                    out.push_str("''");
                }
                i = end;
            }
            ';' => {
                out.push(';');
                statement_start = out.len();
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Names introduced as common table expressions, uppercased
pub fn cte_names(text: &str) -> HashSet<String> {
    CTE_FIRST_RE
        .captures_iter(text)
        .chain(CTE_NEXT_RE.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
        .collect()
}

/// Tokenized view of one script, reusable for many lookups.
///
/// Building the scan neutralizes comments and literals once; each
/// [`ReferenceScan::identifiers_for`] call is then a linear pass over the
/// tokens.
#[derive(Debug, Clone)]
pub struct ReferenceScan {
    tokens: Vec<String>,
    ctes: HashSet<String>,
}

impl ReferenceScan {
    pub fn new(text: &str) -> Self {
        let cleaned = remove_sql_string_literals(&remove_sql_comments(text));
        let ctes = cte_names(&cleaned);
        let tokens = split_tokens(&cleaned);
        Self { tokens, ctes }
    }

    /// Every dotted token whose last part equals `bare_name`
    /// (case-insensitive), excluding unqualified references to CTEs.
    pub fn identifiers_for(&self, bare_name: &str) -> BTreeSet<String> {
        let bare_name = unquote(bare_name);
        self.tokens
            .iter()
            .filter(|token| {
                let last = token.rsplit('.').next().unwrap_or(token.as_str());
                if !last.eq_ignore_ascii_case(&bare_name) {
                    return false;
                }
                token.contains('.') || !self.ctes.contains(&token.to_uppercase())
            })
            .cloned()
            .collect()
    }
}

/// Extract every qualified or unqualified reference to `bare_name` in `text`
pub fn get_full_identifiers(bare_name: &str, text: &str) -> BTreeSet<String> {
    ReferenceScan::new(text).identifiers_for(bare_name)
}
