//! Script model: object types, scripts and lineage

mod dependency;
mod object_type;
mod script;

pub use dependency::{ChangeType, ScriptDependency, Status};
pub use object_type::{ObjectLevel, ScriptObjectType};
pub use script::{MigrationDetails, Script, ScriptKey};
