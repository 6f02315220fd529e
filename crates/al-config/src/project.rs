//! Project configuration
//!
//! A project file declares the engine settings, the initial variables of
//! every scope and the sequence definitions:
//!
//! ```yaml
//! engine:
//!   tick_rate: 30
//! globals:
//!   - { id: 0, label: score, value: { integer: 0 } }
//! local_hosts:
//!   lobby:
//!     - { id: 0, label: visits, value: { integer: 0 } }
//! sequences: !include_dir_named sequences
//! autostart: [intro]
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;
use al_core::{DefinitionId, LocalHostId};
use al_script::{EngineContext, EngineSettings, SequenceConfig, SequenceLibrary, StepKind};
use al_variables::{Variable, VariableConfig, VariableScopes, VariableTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Top-level project file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    /// Global variables
    #[serde(default)]
    pub globals: Vec<VariableConfig>,

    /// Local variables, per scene host
    #[serde(default)]
    pub local_hosts: IndexMap<String, Vec<VariableConfig>>,

    /// Sequence definitions by id
    #[serde(default)]
    pub sequences: IndexMap<String, SequenceConfig>,

    /// Sequences started when the project is run
    #[serde(default)]
    pub autostart: Vec<String>,
}

impl ProjectConfig {
    /// Parse a processed YAML value
    pub fn from_value(value: serde_yaml::Value, path: &Path) -> ConfigResult<Self> {
        serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check cross-references that deserialization cannot
    pub fn validate(&self) -> ConfigResult<()> {
        for id in &self.autostart {
            if !self.sequences.contains_key(id) {
                return Err(ConfigError::ValidationFailed {
                    message: format!("autostart sequence '{}' is not defined", id),
                });
            }
        }

        for (id, config) in &self.sequences {
            if let al_script::SequenceHost::Scene(host) = &config.host {
                if !self.local_hosts.contains_key(host.as_str()) {
                    warn!(sequence = %id, host = %host, "Sequence host declares no local variables");
                }
            }
            for step in &config.steps {
                let target = match &step.kind {
                    StepKind::RunSequence(run) => &run.target,
                    StepKind::EndSequence(end) => &end.target,
                    StepKind::CheckRunning(check) => &check.target,
                    _ => continue,
                };
                if !self.sequences.contains_key(target.as_str()) {
                    warn!(sequence = %id, target = %target, "Step refers to an undefined sequence");
                }
            }
        }
        Ok(())
    }

    /// Build a ready-to-run engine
    ///
    /// Parameter caches of `run_sequence` steps are resynchronized against
    /// their targets before the library is handed over.
    pub fn build_context(&self) -> ConfigResult<EngineContext> {
        self.validate()?;

        let mut variables = VariableScopes::with_globals(table(&self.globals)?);
        for (host, configs) in &self.local_hosts {
            variables.create_local_host(LocalHostId::new(host.as_str()), table(configs)?);
        }

        let mut library = SequenceLibrary::from_configs(self.sequences.clone())?;
        let resynced = library.resync_bindings();

        info!(
            sequences = library.len(),
            globals = self.globals.len(),
            local_hosts = self.local_hosts.len(),
            resynced,
            "Project loaded"
        );

        Ok(EngineContext::new(self.engine.clone())
            .with_variables(variables)
            .with_library(library))
    }

    /// Autostart ids as definition ids
    pub fn autostart_ids(&self) -> Vec<DefinitionId> {
        self.autostart.iter().map(DefinitionId::new).collect()
    }
}

fn table(configs: &[VariableConfig]) -> ConfigResult<VariableTable> {
    let variables = configs.iter().cloned().map(Variable::from);
    Ok(VariableTable::from_variables(variables)?)
}

/// Load, process and parse a project file
pub fn load_project(path: impl AsRef<Path>) -> ConfigResult<ProjectConfig> {
    let path = path.as_ref();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path.file_name().map(Path::new).unwrap_or(path);

    let value = YamlLoader::new(dir).load_file(file)?;
    ProjectConfig::from_value(value, path)
}
