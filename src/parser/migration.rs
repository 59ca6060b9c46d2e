//! Versioned migration blocks
//!
//! A migration-type script holds one or more blocks, each opened by a
//! marker line:
//!
//! ```text
//! ---version: 1, author: jdoe
//! alter table t1 add column c2 int;
//! ---rollback: alter table t1 drop column c2;
//! ---verify: select c2 from t1 limit 1;
//! ```
//!
//! The directive lines stay part of the block content.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DlSyncError, Result};
use crate::util::starts_with_ci;

const VERSION_MARKER: &str = "---version:";
const ROLLBACK_MARKER: &str = "---rollback:";
const VERIFY_MARKER: &str = "---verify:";

static VERSION_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^---version:\s*(\d+)\s*(?:,\s*author:\s*(.*?))?\s*$").unwrap()
});

/// One raw version block of a migration script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u64,
    pub author: Option<String>,
    pub content: String,
    pub rollback: Option<String>,
    pub verify: Option<String>,
}

/// Split `content` into its version blocks.
///
/// Each block runs from the end of the previous block to just before the
/// line break preceding the next marker; the last block stops before any
/// trailing line breaks. Text before the first marker is not part of any
/// block.
pub fn parse_migration_scripts(content: &str) -> Result<Vec<Migration>> {
    let markers = marker_offsets(content);
    let mut migrations = Vec::with_capacity(markers.len());
    let mut block_start = markers.first().copied().unwrap_or(0);

    for (index, &marker) in markers.iter().enumerate() {
        let block_end = match markers.get(index + 1) {
            Some(&next) => line_break_before(content, next),
            None => content.trim_end_matches(['\n', '\r']).len(),
        };
        let block = &content[block_start..block_end];
        let header = first_line(&content[marker..]);
        let (version, author) = parse_header(header)?;

        migrations.push(Migration {
            version,
            author,
            content: block.to_string(),
            rollback: directive(block, ROLLBACK_MARKER),
            verify: directive(block, VERIFY_MARKER),
        });
        block_start = block_end;
    }

    Ok(migrations)
}

/// Byte offsets of every line that starts with a version marker
fn marker_offsets(content: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut line_start = 0;
    for line in content.split_inclusive('\n') {
        if starts_with_ci(line, VERSION_MARKER) {
            offsets.push(line_start);
        }
        line_start += line.len();
    }
    offsets
}

/// Offset of the line break (`\n` or `\r\n`) ending just before `offset`
fn line_break_before(content: &str, offset: usize) -> usize {
    let before = &content[..offset];
    match before.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest).len(),
        None => offset,
    }
}

fn first_line(text: &str) -> &str {
    let line = text.split('\n').next().unwrap_or(text);
    line.strip_suffix('\r').unwrap_or(line)
}

fn parse_header(line: &str) -> Result<(u64, Option<String>)> {
    let invalid = || DlSyncError::InvalidMigrationHeader {
        line: line.to_string(),
    };
    let caps = VERSION_HEADER_RE.captures(line).ok_or_else(invalid)?;
    let version = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .ok_or_else(invalid)?;
    let author = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty());
    Ok((version, author))
}

/// Value of the first `---rollback:`/`---verify:` line in `block`, with a
/// single leading space dropped.
fn directive(block: &str, marker: &str) -> Option<String> {
    block.lines().find_map(|line| {
        if !starts_with_ci(line, marker) {
            return None;
        }
        let value = &line[marker.len()..];
        let value = value.strip_prefix(' ').unwrap_or(value);
        Some(value.trim_end_matches('\r').to_string())
    })
}
