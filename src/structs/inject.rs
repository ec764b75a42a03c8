// src/structs/inject.rs

//! Injections: rules for copying values from a control task into the task
//! it depends on (or blocks).
//!
//! With a control `C` and a target `T`:
//! - `from_spec   {k1 = k2}`: `T.spec[k1]  = C.spec[k2]`
//! - `from_state  {k1 = k2}`: `T.state[k1] = C.state[k2]`, once both are live
//! - `from_target {k1 = k2}`: `T.state[k1_]` names the key `C.spec[k2]`
//! - `literal     {k1 = v}` : `T.state[k1] = v`
//!
//! A list of keys is shorthand for the identity mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::errors::{DagtrackError, Result};
use crate::structs::value::{Extra, Value};

/// Extra key listing the state keys a task refuses to start without.
pub const MUST_INJECT_K: &str = "must_inject";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InjectSpec {
    pub from_spec: BTreeMap<String, String>,
    pub from_state: BTreeMap<String, String>,
    pub from_target: BTreeMap<String, String>,
    pub literal: BTreeMap<String, Option<Value>>,
    pub with_suffix: Option<String>,
}

/// One side of an injection check: a spec's declared extras, or a live
/// task's state.
#[derive(Debug, Clone, Copy)]
pub enum InjectSide<'a> {
    Spec(&'a Extra),
    Task(&'a Extra),
}

impl<'a> InjectSide<'a> {
    pub fn values(&self) -> &'a Extra {
        match *self {
            InjectSide::Spec(v) | InjectSide::Task(v) => v,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, InjectSide::Task(_))
    }
}

/// Structured result of [`InjectSpec::validate_details`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionReport {
    /// Keys the injection reads that the control does not have.
    pub rhs_missing: BTreeSet<String>,
    /// Keys the injection writes that the target does not have.
    pub lhs_surplus: BTreeSet<String>,
    /// `from_target` keys absent from the control.
    pub rhs_redirect: BTreeSet<String>,
    /// Redirected keys absent from the target.
    pub lhs_redirect: BTreeSet<String>,
    /// `(target key, control key)` pairs whose values differ.
    pub mismatches: BTreeSet<(String, String)>,
    /// State injection requested while one side is not a live task.
    pub state: bool,
}

impl InjectionReport {
    pub fn is_ok(&self) -> bool {
        self.rhs_missing.is_empty()
            && self.lhs_surplus.is_empty()
            && self.rhs_redirect.is_empty()
            && self.lhs_redirect.is_empty()
            && self.mismatches.is_empty()
            && !self.state
    }
}

impl fmt::Display for InjectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing={:?} surplus={:?} rhs_redirect={:?} lhs_redirect={:?} mismatches={:?} state={}",
            self.rhs_missing,
            self.lhs_surplus,
            self.rhs_redirect,
            self.lhs_redirect,
            self.mismatches,
            self.state
        )
    }
}

impl InjectSpec {
    /// Build from raw data. An empty table yields `None`.
    pub fn build(data: &Value) -> Result<Option<Self>> {
        let Value::Map(map) = data else {
            return Err(DagtrackError::InjectionError(format!(
                "injection must be a table, got: {data}"
            )));
        };
        let mut spec = InjectSpec::default();
        for (key, val) in map {
            match key.as_str() {
                "from_spec" => spec.from_spec = prep_keys(key, val)?,
                "from_state" => spec.from_state = prep_keys(key, val)?,
                "from_target" => {
                    spec.from_target = prep_keys(key, val)?
                        .into_iter()
                        .map(|(k, v)| (format!("{k}_"), v))
                        .collect();
                }
                "literal" => spec.literal = prep_literal(val)?,
                "with_suffix" => {
                    let suffix = val.as_str().ok_or_else(|| {
                        DagtrackError::InjectionError("with_suffix must be a string".to_string())
                    })?;
                    spec.with_suffix = Some(suffix.to_string());
                }
                other => {
                    return Err(DagtrackError::InjectionError(format!(
                        "unknown injection key '{other}'"
                    )));
                }
            }
        }
        Ok((!spec.is_empty()).then_some(spec))
    }

    pub fn is_empty(&self) -> bool {
        self.from_spec.is_empty()
            && self.from_state.is_empty()
            && self.from_target.is_empty()
            && self.literal.is_empty()
            && self.with_suffix.is_none()
    }

    /// Values copied from the control's declared extras, plus redirect keys
    /// and declared literal constants.
    pub fn apply_from_spec(&self, control: &Extra) -> Extra {
        let mut data = Extra::new();
        for (k, v) in &self.from_spec {
            if let Some(val) = control.get(v) {
                data.insert(k.clone(), val.clone());
            }
        }
        for (k, v) in &self.from_target {
            let redirect = control.get(v).cloned().unwrap_or_else(|| Value::Str(v.clone()));
            data.insert(k.clone(), redirect);
        }
        for (k, v) in &self.literal {
            if let Some(val) = v {
                data.insert(k.clone(), val.clone());
            }
        }
        data
    }

    /// Values copied from the control's live state.
    pub fn apply_from_state(&self, control_state: &Extra) -> Extra {
        self.from_state
            .iter()
            .filter_map(|(k, v)| control_state.get(v).map(|val| (k.clone(), val.clone())))
            .collect()
    }

    /// Set every literal key to `val`.
    pub fn apply_literal(&self, val: &Value) -> Extra {
        self.literal
            .keys()
            .map(|k| (k.clone(), val.clone()))
            .collect()
    }

    pub fn validate(&self, control: InjectSide<'_>, target: InjectSide<'_>, only_spec: bool) -> bool {
        self.validate_details(control, target, only_spec).is_ok()
    }

    /// Compare what this injection needs against what the two sides hold.
    ///
    /// Value mismatches are only reported once the key sets line up.
    pub fn validate_details(
        &self,
        control: InjectSide<'_>,
        target: InjectSide<'_>,
        only_spec: bool,
    ) -> InjectionReport {
        let control_vals = control.values();
        let target_vals = target.values();

        let mut control_needs: BTreeSet<&String> = self.from_spec.values().collect();
        let mut target_needs: BTreeSet<&String> = self.from_spec.keys().collect();
        if control.is_task() {
            control_needs.extend(self.from_state.values());
        }
        if target.is_task() {
            target_needs.extend(self.from_state.keys());
        }

        let mut report = InjectionReport {
            state: !only_spec
                && !self.from_state.is_empty()
                && !(control.is_task() && target.is_task()),
            ..InjectionReport::default()
        };

        report.rhs_missing = control_needs
            .into_iter()
            .filter(|k| !control_vals.contains_key(*k))
            .cloned()
            .collect();
        report.lhs_surplus = target_needs
            .into_iter()
            .filter(|k| !target_vals.contains_key(*k))
            .cloned()
            .collect();
        report.rhs_redirect = self
            .from_target
            .values()
            .filter(|k| !control_vals.contains_key(*k))
            .cloned()
            .collect();
        report.lhs_redirect = self
            .from_target
            .values()
            .filter_map(|k| control_vals.get(k).and_then(Value::as_str))
            .filter(|redirect| !target_vals.contains_key(*redirect))
            .map(str::to_string)
            .collect();

        if report.rhs_missing.is_empty() && report.lhs_surplus.is_empty() {
            report.mismatches = self
                .from_spec
                .iter()
                .filter(|(k, v)| target_vals.get(*k) != control_vals.get(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        report
    }
}

fn prep_keys(field: &str, val: &Value) -> Result<BTreeMap<String, String>> {
    match val {
        Value::List(_) | Value::Str(_) => {
            let keys = val.as_str_list().ok_or_else(|| {
                DagtrackError::InjectionError(format!("{field} keys must be strings"))
            })?;
            Ok(keys.into_iter().map(|k| (k.clone(), k)).collect())
        }
        Value::Map(m) => m
            .iter()
            .map(|(k, v)| match v.as_str() {
                Some(s) => Ok((k.clone(), s.to_string())),
                None => Err(DagtrackError::InjectionError(format!(
                    "{field}.{k} must name a key, got: {v}"
                ))),
            })
            .collect(),
        other => Err(DagtrackError::InjectionError(format!(
            "{field} must be a list or table, got: {other}"
        ))),
    }
}

fn prep_literal(val: &Value) -> Result<BTreeMap<String, Option<Value>>> {
    match val {
        Value::List(_) | Value::Str(_) => {
            let keys = val.as_str_list().ok_or_else(|| {
                DagtrackError::InjectionError("literal keys must be strings".to_string())
            })?;
            Ok(keys.into_iter().map(|k| (k, None)).collect())
        }
        Value::Map(m) => Ok(m.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect()),
        other => Err(DagtrackError::InjectionError(format!(
            "literal must be a list or table, got: {other}"
        ))),
    }
}
