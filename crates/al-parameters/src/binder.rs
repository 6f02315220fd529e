//! Id-stable parameter binding
//!
//! A step that starts another sequence keeps one [`BoundParameter`] per
//! parameter of the target definition. Each slot records the external
//! parameter id it feeds, plus either an authored value or the id of a
//! parameter of the caller's own sequence to forward.

use crate::parameter::ParameterList;
use al_core::{EngineError, ParameterId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One local cache slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    /// Id of the target definition's parameter this slot feeds
    #[serde(rename = "id")]
    pub external_id: ParameterId,

    /// Authored value; `None` until authored or filled in by a resync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Forward this parameter of the calling sequence instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_parameter: Option<ParameterId>,
}

impl BoundParameter {
    pub fn authored(external_id: ParameterId, value: Value) -> Self {
        Self {
            external_id,
            value: Some(value),
            from_parameter: None,
        }
    }

    pub fn forwarded(external_id: ParameterId, caller_parameter: ParameterId) -> Self {
        Self {
            external_id,
            value: None,
            from_parameter: Some(caller_parameter),
        }
    }
}

/// Outcome of a resync, by external id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub kept: Vec<ParameterId>,
    pub dropped: Vec<ParameterId>,
    pub created: Vec<ParameterId>,
}

impl ResyncReport {
    /// Whether the cache changed structurally
    pub fn changed(&self) -> bool {
        !self.dropped.is_empty() || !self.created.is_empty()
    }
}

/// Local parameter cache of a sequence-invoking step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBindings {
    slots: Vec<BoundParameter>,
}

impl ParameterBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding the external defaults
    pub fn from_defaults(external: &ParameterList) -> Self {
        Self {
            slots: external
                .iter()
                .map(|p| BoundParameter::authored(p.id(), p.value().clone()))
                .collect(),
        }
    }

    /// Author a value for the slot feeding `external_id`
    pub fn set(&mut self, external_id: ParameterId, value: Value) {
        self.upsert(BoundParameter::authored(external_id, value));
    }

    /// Forward a caller parameter into the slot feeding `external_id`
    pub fn forward(&mut self, external_id: ParameterId, caller_parameter: ParameterId) {
        self.upsert(BoundParameter::forwarded(external_id, caller_parameter));
    }

    pub fn get(&self, external_id: ParameterId) -> Option<&BoundParameter> {
        self.slots.iter().find(|s| s.external_id == external_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParameter> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the cache no longer mirrors the external list's ids and order
    pub fn needs_resync(&self, external: &ParameterList) -> bool {
        self.slots.len() != external.len()
            || self
                .slots
                .iter()
                .zip(external.iter())
                .any(|(slot, p)| slot.external_id != p.id())
    }

    /// Rebuild the cache against the external list
    ///
    /// Slots are matched by external id only. Surviving slots keep their
    /// authored value and type and are reordered to follow the external
    /// list; slots whose id disappeared are dropped; external parameters
    /// without a slot get a fresh one holding the external default.
    pub fn resync(&mut self, external: &ParameterList) -> ResyncReport {
        let mut report = ResyncReport::default();
        let mut existing: HashMap<ParameterId, BoundParameter> = self
            .slots
            .drain(..)
            .map(|slot| (slot.external_id, slot))
            .collect();

        for parameter in external.iter() {
            match existing.remove(&parameter.id()) {
                Some(mut slot) => {
                    if slot.value.is_none() && slot.from_parameter.is_none() {
                        slot.value = Some(parameter.value().clone());
                    }
                    report.kept.push(parameter.id());
                    self.slots.push(slot);
                }
                None => {
                    report.created.push(parameter.id());
                    self.slots.push(BoundParameter::authored(
                        parameter.id(),
                        parameter.value().clone(),
                    ));
                }
            }
        }

        report.dropped = existing.into_keys().collect();
        report.dropped.sort();

        if report.changed() {
            debug!(
                kept = report.kept.len(),
                dropped = report.dropped.len(),
                created = report.created.len(),
                "Resynchronized parameter bindings"
            );
        }
        report
    }

    /// Copy cached values into the external list, in its declaration order
    ///
    /// Forwarded slots read from `caller`. When the target is asset-scoped,
    /// object references are reduced to their persisted stable id, since
    /// live handles do not outlive the scene that produced them. Every
    /// failure is logged and returned; the remaining slots are still
    /// assigned.
    pub fn bulk_assign(
        &self,
        external: &mut ParameterList,
        caller: Option<&ParameterList>,
        target_is_asset_scoped: bool,
    ) -> Vec<EngineError> {
        let mut errors = Vec::new();

        for id in external.ids() {
            let Some(slot) = self.get(id) else {
                continue;
            };

            let value = match slot.from_parameter {
                Some(source) => match caller.and_then(|c| c.get(source)) {
                    Some(parameter) => parameter.value().clone(),
                    None => {
                        errors.push(EngineError::unresolved(format!(
                            "caller parameter {}",
                            source
                        )));
                        continue;
                    }
                },
                None => match &slot.value {
                    Some(value) => value.clone(),
                    None => continue,
                },
            };

            let value = if target_is_asset_scoped {
                persisted(value)
            } else {
                value
            };

            if let Err(e) = external.set_value(id, value) {
                errors.push(e);
            }
        }

        for error in &errors {
            warn!(error = %error, "Parameter assignment skipped");
        }
        errors
    }

    fn upsert(&mut self, slot: BoundParameter) {
        match self
            .slots
            .iter_mut()
            .find(|s| s.external_id == slot.external_id)
        {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }
}

fn persisted(value: Value) -> Value {
    match value {
        Value::Object(o) => Value::Object(o.map(|o| o.to_persisted())),
        Value::ExternalObject(o) => Value::ExternalObject(o.map(|o| o.to_persisted())),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;
    use al_core::{ObjectRef, ValueKind};

    fn list(params: &[(u32, Value)]) -> ParameterList {
        ParameterList::from_vec(
            params
                .iter()
                .map(|(id, v)| Parameter::new(ParameterId(*id), format!("p{}", id), v.clone()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_resync_matches_by_id() {
        let before = list(&[(1, Value::Integer(0)), (2, Value::from("b"))]);
        let mut bindings = ParameterBindings::from_defaults(&before);
        bindings.set(ParameterId(1), Value::Integer(10));
        bindings.set(ParameterId(2), Value::from("authored"));

        let after = list(&[(2, Value::from("b")), (3, Value::Float(1.5))]);
        assert!(bindings.needs_resync(&after));
        let report = bindings.resync(&after);

        assert_eq!(report.kept, vec![ParameterId(2)]);
        assert_eq!(report.dropped, vec![ParameterId(1)]);
        assert_eq!(report.created, vec![ParameterId(3)]);
        assert_eq!(
            bindings.get(ParameterId(2)).and_then(|s| s.value.clone()),
            Some(Value::from("authored"))
        );
        assert_eq!(
            bindings.get(ParameterId(3)),
            Some(&BoundParameter::authored(ParameterId(3), Value::Float(1.5)))
        );
        assert!(bindings.get(ParameterId(1)).is_none());
        assert!(!bindings.needs_resync(&after));
    }

    #[test]
    fn test_reorder_only_keeps_everything() {
        let mut external = list(&[(1, Value::Integer(0)), (2, Value::Integer(0))]);
        let mut bindings = ParameterBindings::from_defaults(&external);
        bindings.set(ParameterId(1), Value::Integer(7));

        external.move_to(ParameterId(2), 0);
        let report = bindings.resync(&external);

        assert!(!report.changed());
        let order: Vec<_> = bindings.iter().map(|s| s.external_id).collect();
        assert_eq!(order, vec![ParameterId(2), ParameterId(1)]);
        assert_eq!(
            bindings.get(ParameterId(1)).and_then(|s| s.value.clone()),
            Some(Value::Integer(7))
        );
    }

    #[test]
    fn test_bulk_assign_authored_and_forwarded() {
        let mut external = list(&[(1, Value::Integer(0)), (2, Value::Float(0.0))]);
        let caller = list(&[(9, Value::Float(2.5))]);

        let mut bindings = ParameterBindings::new();
        bindings.set(ParameterId(1), Value::Integer(4));
        bindings.forward(ParameterId(2), ParameterId(9));

        let errors = bindings.bulk_assign(&mut external, Some(&caller), false);
        assert!(errors.is_empty());
        assert_eq!(external.get(ParameterId(1)).unwrap().value(), &Value::Integer(4));
        assert_eq!(external.get(ParameterId(2)).unwrap().value(), &Value::Float(2.5));
    }

    #[test]
    fn test_bulk_assign_reports_failures_and_continues() {
        let mut external = list(&[(1, Value::Integer(0)), (2, Value::Integer(0))]);
        let mut bindings = ParameterBindings::new();
        bindings.set(ParameterId(1), Value::Float(1.0));
        bindings.set(ParameterId(2), Value::Integer(3));

        let errors = bindings.bulk_assign(&mut external, None, false);
        assert_eq!(
            errors,
            vec![EngineError::mismatch(ValueKind::Integer, ValueKind::Float)]
        );
        assert_eq!(external.get(ParameterId(1)).unwrap().value(), &Value::Integer(0));
        assert_eq!(external.get(ParameterId(2)).unwrap().value(), &Value::Integer(3));
    }

    #[test]
    fn test_bulk_assign_missing_caller_parameter() {
        let mut external = list(&[(1, Value::Integer(0))]);
        let mut bindings = ParameterBindings::new();
        bindings.forward(ParameterId(1), ParameterId(5));

        let errors = bindings.bulk_assign(&mut external, None, false);
        assert!(matches!(errors.as_slice(), [EngineError::UnresolvedReference(_)]));
    }

    #[test]
    fn test_asset_scoped_targets_get_persisted_objects() {
        let mut external = list(&[(1, Value::Object(None))]);
        let mut bindings = ParameterBindings::new();
        bindings.set(ParameterId(1), Value::Object(Some(ObjectRef::live(3, 30))));

        bindings.bulk_assign(&mut external, None, true);
        assert_eq!(
            external.get(ParameterId(1)).unwrap().value(),
            &Value::Object(Some(ObjectRef::persisted(30)))
        );
    }

    #[test]
    fn test_unauthored_slot_is_filled_on_resync() {
        let external = list(&[(1, Value::Bool(true))]);
        let mut bindings: ParameterBindings =
            serde_json::from_str(r#"[{"id": 1}]"#).unwrap();
        bindings.resync(&external);
        assert_eq!(
            bindings.get(ParameterId(1)).and_then(|s| s.value.clone()),
            Some(Value::Bool(true))
        );
    }
}
