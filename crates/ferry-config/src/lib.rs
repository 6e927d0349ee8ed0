//! YAML configuration for Ferry: schema, short-form normalization,
//! construction of workflow values and the loaders the engine calls back
//! into when it re-reads configuration from the origin.

pub mod build;
pub mod loader;
pub mod options;
pub mod parser;
pub mod schema;
pub mod validator;

pub use build::build_config;
pub use loader::{relative_config_path, FileConfigLoader, OriginConfigLoader};
pub use options::{FolderOptions, GeneralOptions, Options};
pub use parser::{load_config_file, parse_config};
pub use schema::ConfigFile;
pub use validator::MigrationValidator;
