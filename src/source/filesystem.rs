//! Script-root directory layout
//!
//! ```text
//! <root>/[main/]
//!   ACCOUNT/<TYPE>/<NAME>.SQL
//!   <DB>/<SCHEMA>/<TYPE>/<NAME>.SQL
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ScriptSource;
use crate::error::{DlSyncError, Result};
use crate::model::{ObjectLevel, Script};
use crate::parser::{parse_account_script, parse_schema_script};
use crate::util::starts_with_ci;

pub const MAIN_DIR: &str = "main";
pub const ACCOUNT_DIR: &str = "ACCOUNT";

/// Header given to exported migration-type scripts that have none
const DEFAULT_VERSION_HEADER: &str = "---version: 0, author: dlsync";

/// Minimum number of files to benefit from parallel parsing.
/// Below this threshold, sequential processing is faster due to rayon overhead.
const PARALLEL_THRESHOLD: usize = 8;

/// Read a file as a string, trying UTF-8 first, then Windows-1252 as fallback.
/// A UTF-8 BOM is stripped.
pub fn read_file_with_encoding_fallback(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;

    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            // Fall back to Windows-1252 (common for SQL files created on Windows)
            let bytes = e.into_bytes();
            let (decoded, _, had_errors) = WINDOWS_1252.decode(&bytes);
            if had_errors {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "File contains invalid characters",
                ));
            }
            decoded.into_owned()
        }
    };

    Ok(match content.strip_prefix('\u{FEFF}') {
        Some(stripped) => stripped.to_string(),
        None => content,
    })
}

/// Scripts stored as files under a script root
#[derive(Debug, Clone)]
pub struct FileScriptSource {
    main_dir: PathBuf,
}

impl FileScriptSource {
    /// Use `<script_root>/main` when it exists, the root itself otherwise
    pub fn new(script_root: impl AsRef<Path>) -> Self {
        let script_root = script_root.as_ref();
        let main = script_root.join(MAIN_DIR);
        let main_dir = if main.is_dir() {
            main
        } else {
            script_root.to_path_buf()
        };
        debug!("Script file reader initialized with root {}", main_dir.display());
        Self { main_dir }
    }

    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    /// Locate every script file together with the layout it was found in
    fn script_files(&self) -> Result<Vec<(PathBuf, ObjectLevel)>> {
        if !self.main_dir.is_dir() {
            return Err(DlSyncError::ScriptRootNotFound {
                path: self.main_dir.clone(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.main_dir)
            .min_depth(1)
            .max_depth(4)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.main_dir) else {
                continue;
            };
            let in_account = relative
                .components()
                .next()
                .and_then(|c| c.as_os_str().to_str())
                .is_some_and(|first| first.eq_ignore_ascii_case(ACCOUNT_DIR));
            let (level, expected_depth) = if in_account {
                (ObjectLevel::Account, 3)
            } else {
                (ObjectLevel::Schema, 4)
            };

            let is_sql = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("sql"));

            if entry.depth() != expected_depth {
                if is_sql {
                    warn!("Script file found outside object type directory: {}", path.display());
                }
                continue;
            }
            if !is_sql {
                warn!("Script skipped, file not SQL: {}", path.display());
                continue;
            }
            files.push((path.to_path_buf(), level));
        }
        Ok(files)
    }

    /// Every script file parsed, migration-type scripts not yet expanded
    pub fn read_file_scripts(&self) -> Result<Vec<Script>> {
        let files = self.script_files()?;
        info!("Reading {} script files from {}", files.len(), self.main_dir.display());

        if files.len() >= PARALLEL_THRESHOLD {
            files
                .par_iter()
                .map(|(path, level)| parse_script_file(path, *level))
                .collect()
        } else {
            files
                .iter()
                .map(|(path, level)| parse_script_file(path, *level))
                .collect()
        }
    }

    fn script_path(&self, script: &Script) -> PathBuf {
        let file_name = format!("{}.SQL", script.object_name());
        let type_dir = script.object_type().directory_name();
        match (script.database_name(), script.schema_name()) {
            (Some(database), Some(schema)) => self
                .main_dir
                .join(database)
                .join(schema)
                .join(type_dir)
                .join(file_name),
            _ => self.main_dir.join(ACCOUNT_DIR).join(type_dir).join(file_name),
        }
    }

    fn write_script_file(&self, script: &Script) -> Result<PathBuf> {
        let path = self.script_path(script);
        let write_error = |e| DlSyncError::ScriptWriteError {
            path: path.clone(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let has_header = script
            .content()
            .lines()
            .any(|line| starts_with_ci(line, "---version:"));
        let content = if script.is_migration() && !has_header {
            format!("{}\n{}", DEFAULT_VERSION_HEADER, script.content())
        } else {
            script.content().to_string()
        };

        std::fs::write(&path, content).map_err(write_error)?;
        debug!("File {} created successfully", path.display());
        Ok(path)
    }
}

/// Dot-entries such as the `.dlsync` state directory or `.git`
fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn parse_script_file(path: &Path, level: ObjectLevel) -> Result<Script> {
    let content =
        read_file_with_encoding_fallback(path).map_err(|e| DlSyncError::ScriptReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
    match level {
        ObjectLevel::Account => parse_account_script(path, &content),
        ObjectLevel::Schema => parse_schema_script(path, &content),
    }
}

impl ScriptSource for FileScriptSource {
    fn get_all_scripts(&self) -> Result<Vec<Script>> {
        Ok(self
            .read_file_scripts()?
            .into_iter()
            .flat_map(Script::into_deployable)
            .collect())
    }

    fn create_script_files(&self, scripts: &[Script]) -> Result<()> {
        debug!("Creating {} script files", scripts.len());
        for script in scripts {
            self.write_script_file(script)?;
        }
        Ok(())
    }
}
