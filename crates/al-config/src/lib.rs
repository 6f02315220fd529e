//! YAML project loading for the action-list engine
//!
//! This crate loads a project file describing engine settings, variables
//! and sequence definitions. The following custom tags are supported:
//!
//! - `!include path` - Include another YAML file
//! - `!include_dir_named dir` - Include all YAML files as a mapping keyed by filename
//! - `!env_var VAR` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use al_config::load_project;
//!
//! let project = load_project("game/project.yaml")?;
//! let mut ctx = project.build_context()?;
//! ```

mod error;
mod loader;
mod project;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use project::{load_project, ProjectConfig};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
