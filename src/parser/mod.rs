//! SQL scanning and script parsing

mod migration;
mod parameters;
mod script_parser;
mod tokenizer;

pub use migration::{parse_migration_scripts, Migration};
pub use parameters::ParameterInjector;
pub use script_parser::{parse_account_script, parse_ddl_scripts, parse_schema_script};
pub use tokenizer::{
    cte_names, get_full_identifiers, remove_sql_comments, remove_sql_string_literals,
    ReferenceScan,
};
