//! YAML loader with custom tag support
//!
//! Supported tags:
//! - `!include path` - Include another YAML file
//! - `!include_dir_named dir` - Include all YAML files as a mapping keyed by filename
//! - `!env_var VAR` - Environment variable substitution
//!
//! Any other tag is kept, so enum variants written in tag form
//! (`value: !integer 5`, `after: !jump 3`) reach the deserializer intact.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader resolving includes relative to the including file
#[derive(Debug)]
pub struct YamlLoader {
    /// Base directory for top-level relative paths
    project_dir: PathBuf,
    /// Files currently being loaded, for circular include detection
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!(path = %path.display(), "Loading YAML file");

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = Mapping::new();
                for (k, v) in map {
                    let key = self.process_value(k, source_path)?;
                    let value = self.process_value(v, source_path)?;
                    result.insert(key, value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(tag = %tag, "Processing tag");

        match tag.as_str() {
            "!include" => {
                let path = self.value_to_path(&tagged.value, source_path)?;
                debug!(path = %path.display(), "Including file");
                self.load_file(&path)
            }
            "!include_dir_named" => self.process_include_dir_named(&tagged.value, source_path),
            "!env_var" => process_env_var(tagged.value),
            _ => {
                let value = self.process_value(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    /// Every YAML file of a directory, keyed by file stem
    fn process_include_dir_named(
        &mut self,
        value: &Value,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let dir = self.value_to_path(value, source_path)?;
        debug!(dir = %dir.display(), "Including directory as named mapping");

        let mut result = Mapping::new();
        for file in yaml_files(&dir)? {
            let Some(name) = file.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            let content = self.load_file(&file)?;
            result.insert(Value::String(name), content);
        }
        Ok(Value::Mapping(result))
    }

    /// Resolve a tag argument relative to the including file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(path) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            });
        };

        if Path::new(path).is_absolute() {
            return Ok(PathBuf::from(path));
        }
        let base = source_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(&self.project_dir);
        Ok(base.join(path))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

fn process_env_var(value: Value) -> ConfigResult<Value> {
    let Value::String(var) = value else {
        return Err(ConfigError::InvalidValue {
            key: "!env_var".to_string(),
            reason: "environment variable name must be a string".to_string(),
        });
    };

    let env_value =
        std::env::var(&var).map_err(|_| ConfigError::EnvVarNotFound { var: var.clone() })?;
    debug!(var = %var, "Substituted environment variable");

    // scalars keep their YAML type
    match serde_yaml::from_str::<Value>(&env_value) {
        Ok(scalar @ (Value::Bool(_) | Value::Number(_))) => Ok(scalar),
        _ => Ok(Value::String(env_value)),
    }
}

/// YAML files in a directory, sorted by name
fn yaml_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ConfigError::ReadFile {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Load a YAML file with full tag processing
pub fn load_yaml(project_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(project_dir).load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    project_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    YamlLoader::new(project_dir).load_string(content, Path::new(source_name))
}
