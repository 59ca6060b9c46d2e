//! Where scripts come from and where exported scripts go

mod filesystem;

pub use filesystem::{read_file_with_encoding_fallback, FileScriptSource, ACCOUNT_DIR, MAIN_DIR};

use crate::error::Result;
use crate::model::Script;

/// A store of authored scripts
pub trait ScriptSource {
    /// Every script, with migration-type scripts expanded into their
    /// individual versions.
    fn get_all_scripts(&self) -> Result<Vec<Script>>;

    /// Persist scripts reconstructed from the database
    fn create_script_files(&self, scripts: &[Script]) -> Result<()>;
}
