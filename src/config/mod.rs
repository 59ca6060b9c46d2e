//! Configuration: `config.yaml`, connection properties and profile parameters

mod connection;
mod settings;

pub use connection::{
    load_parameters, parameter_file_name, parse_properties, profile_from_lookup,
    ConnectionProperties, CONNECTION_KEYS, DEFAULT_PROFILE, PROFILE_KEY,
};
pub use settings::{Config, DependencyOverride, CONFIG_FILE_NAME};
