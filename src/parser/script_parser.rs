//! Building scripts from the script-root layout and from database DDL

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::migration::parse_migration_scripts;
use crate::error::{DlSyncError, Result};
use crate::model::{ObjectLevel, Script, ScriptObjectType};

/// Words that may sit between `CREATE OR REPLACE` and the object keyword
const DDL_MODIFIERS: &[&str] = &[
    "SECURE",
    "TRANSIENT",
    "TEMPORARY",
    "TEMP",
    "VOLATILE",
    "HYBRID",
    "RECURSIVE",
    "MATERIALIZED",
    "LOCAL",
    "GLOBAL",
];

static CREATE_STATEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*create\s+or\s+replace\s").unwrap());

static CREATE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^create\s+or\s+replace\s+").unwrap());

/// Object type keywords, longest first so `DYNAMIC TABLE` wins over `TABLE`
static KEYWORDS_BY_LENGTH: LazyLock<Vec<(Vec<&'static str>, ScriptObjectType)>> =
    LazyLock::new(|| {
        let mut keywords: Vec<_> = ScriptObjectType::ALL
            .iter()
            .map(|t| (t.singular().split(' ').collect::<Vec<_>>(), *t))
            .collect();
        keywords.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        keywords
    });

fn path_component(path: &Path, levels_up: usize) -> Result<String> {
    path.ancestors()
        .nth(levels_up)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| DlSyncError::InvalidScriptPath {
            path: path.to_path_buf(),
        })
}

fn object_name_of(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| DlSyncError::InvalidScriptPath {
            path: path.to_path_buf(),
        })
}

fn object_type_of(path: &Path, level: ObjectLevel) -> Result<ScriptObjectType> {
    let directory = path_component(path, 1)?;
    let object_type = ScriptObjectType::from_directory(&directory)
        .ok_or(DlSyncError::UnknownObjectTypeDirectory(directory))?;
    if object_type.level() != level {
        return Err(DlSyncError::InvalidScriptPath {
            path: path.to_path_buf(),
        });
    }
    Ok(object_type)
}

/// Attach version blocks to a migration-type script
fn with_parsed_migrations(script: Script) -> Result<Script> {
    if !script.is_migration() {
        return Ok(script);
    }
    let migrations = parse_migration_scripts(script.content())?;
    if migrations.is_empty() {
        warn!(
            "Migration script {} has no version marker and will not be deployed",
            script.id()
        );
    }
    script.with_migrations(&migrations)
}

/// Parse a script stored as `<DB>/<SCHEMA>/<TYPE>/<NAME>.SQL`
pub fn parse_schema_script(path: &Path, content: &str) -> Result<Script> {
    let object_name = object_name_of(path)?;
    let object_type = object_type_of(path, ObjectLevel::Schema)?;
    let schema = path_component(path, 2)?;
    let database = path_component(path, 3)?;

    let script = Script::schema(
        Some(path.to_path_buf()),
        &database,
        &schema,
        &object_name,
        object_type,
        content,
    );
    with_parsed_migrations(script)
}

/// Parse a script stored as `ACCOUNT/<TYPE>/<NAME>.SQL`
pub fn parse_account_script(path: &Path, content: &str) -> Result<Script> {
    let object_name = object_name_of(path)?;
    let object_type = object_type_of(path, ObjectLevel::Account)?;

    let script = Script::account(Some(path.to_path_buf()), &object_name, object_type, content);
    with_parsed_migrations(script)
}

/// Resolve the object type and bare object name of one `CREATE OR REPLACE`
/// statement.
fn classify_statement(statement: &str) -> Result<Option<(ScriptObjectType, String)>> {
    let Some(prefix) = CREATE_PREFIX_RE.find(statement) else {
        return Ok(None);
    };
    let rest = &statement[prefix.end()..];
    let words: Vec<&str> = rest
        .split(|c: char| c.is_whitespace() || c == '(')
        .filter(|w| !w.is_empty())
        .collect();

    let mut position = 0;
    while position < words.len()
        && DDL_MODIFIERS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(words[position]))
    {
        position += 1;
    }

    let remaining = &words[position..];
    let matched = KEYWORDS_BY_LENGTH.iter().find(|(keyword, _)| {
        keyword.len() <= remaining.len()
            && keyword
                .iter()
                .zip(remaining)
                .all(|(k, w)| k.eq_ignore_ascii_case(w))
    });

    let Some((keyword, object_type)) = matched else {
        let found = remaining.first().copied().unwrap_or_default().to_uppercase();
        return Err(DlSyncError::UnknownDdlObjectType(found));
    };

    let qualified = remaining
        .get(keyword.len())
        .copied()
        .ok_or_else(|| DlSyncError::UnknownDdlObjectType(statement.to_string()))?;
    let name = qualified.rsplit('.').next().unwrap_or(qualified);
    Ok(Some((*object_type, name.to_string())))
}

/// Split DDL text returned by the database into one script per object.
///
/// The schema (or database) statement the DDL starts with is skipped.
pub fn parse_ddl_scripts(ddl: &str, database: &str, schema: &str) -> Result<Vec<Script>> {
    let starts: Vec<usize> = CREATE_STATEMENT_RE.find_iter(ddl).map(|m| m.start()).collect();
    let mut scripts = Vec::with_capacity(starts.len());

    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(ddl.len());
        let statement = ddl[start..end].trim();

        let Some((object_type, name)) = classify_statement(statement)? else {
            continue;
        };
        if object_type.level() == ObjectLevel::Account {
            debug!("Skipping {} statement in DDL of {}.{}", object_type.singular(), database, schema);
            continue;
        }
        scripts.push(Script::schema(None, database, schema, &name, object_type, statement));
    }

    Ok(scripts)
}
