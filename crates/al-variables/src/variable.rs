//! Variable cell

use al_core::{EngineError, EngineResult, InstanceId, Value, ValueKind, VariableId};
use serde::{Deserialize, Serialize};

/// Translation id meaning "no translation"
pub const NO_TRANSLATION: i32 = -1;

/// The step instance currently driving a variable's backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupOwner {
    pub instance: InstanceId,
    pub step: usize,
}

/// A named, typed, id-stable mutable cell
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    id: VariableId,
    label: String,
    value: Value,
    translation_id: i32,
    backup: Value,
    backup_owner: Option<BackupOwner>,
}

impl Variable {
    /// Create a variable whose kind is taken from its initial value
    pub fn new(id: VariableId, label: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            label: label.into(),
            backup: value.clone(),
            value,
            translation_id: NO_TRANSLATION,
            backup_owner: None,
        }
    }

    /// Attach a translation id (string variables only)
    pub fn with_translation(mut self, translation_id: i32) -> Self {
        self.translation_id = translation_id;
        self
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn translation_id(&self) -> Option<i32> {
        (self.translation_id != NO_TRANSLATION).then_some(self.translation_id)
    }

    /// Type-checked write
    ///
    /// The value's kind must match the variable's kind, except that a string
    /// variable accepts any value by taking its display representation. On
    /// mismatch the variable is left unchanged.
    pub fn set(&mut self, value: Value) -> EngineResult<()> {
        self.value = coerce(self.kind(), value)?;
        Ok(())
    }

    /// Type-checked copy from another variable
    pub fn assign_from(&mut self, source: &Variable) -> EngineResult<()> {
        self.set(source.value.clone())
    }

    /// Take ownership of the backup slot and record the current value
    ///
    /// Returns `false` if another step instance already owns the backup.
    /// Re-entry by the current owner keeps the original backup.
    pub fn begin_backup(&mut self, owner: BackupOwner) -> bool {
        match self.backup_owner {
            Some(current) if current == owner => true,
            Some(_) => false,
            None => {
                self.backup = self.value.clone();
                self.backup_owner = Some(owner);
                true
            }
        }
    }

    /// Backed-up value, if `owner` holds the backup slot
    pub fn backup_for(&self, owner: BackupOwner) -> Option<&Value> {
        (self.backup_owner == Some(owner)).then_some(&self.backup)
    }

    /// Restore the backed-up value; only the owner may do this
    pub fn restore_backup(&mut self, owner: BackupOwner) -> bool {
        if self.backup_owner != Some(owner) {
            return false;
        }
        self.value = self.backup.clone();
        true
    }

    /// Give up the backup slot
    pub fn release_backup(&mut self, owner: BackupOwner) {
        if self.backup_owner == Some(owner) {
            self.backup_owner = None;
        }
    }

    /// Whether any step instance currently owns the backup slot
    pub fn backup_in_use(&self) -> bool {
        self.backup_owner.is_some()
    }
}

/// Convert `value` for storage in a cell of kind `target`
fn coerce(target: ValueKind, value: Value) -> EngineResult<Value> {
    let found = value.kind();
    if found == target {
        Ok(value)
    } else if target == ValueKind::String {
        Ok(Value::String(value.to_string()))
    } else {
        Err(EngineError::mismatch(target, found))
    }
}

fn no_translation() -> i32 {
    NO_TRANSLATION
}

/// Variable declaration from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Variable ID
    pub id: u32,

    /// Human-readable label
    pub label: String,

    /// Initial value (also fixes the kind)
    pub value: Value,

    /// Translation id for string variables
    #[serde(default = "no_translation")]
    pub translation_id: i32,
}

impl From<VariableConfig> for Variable {
    fn from(config: VariableConfig) -> Self {
        Variable::new(VariableId(config.id), config.label, config.value)
            .with_translation(config.translation_id)
    }
}
