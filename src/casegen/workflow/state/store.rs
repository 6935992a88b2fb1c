// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use crate::adk::error::WorkflowError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::schema::{ReducerType, StateSchema};

/// Runtime workflow state with reducer support
///
/// Nodes only ever see `&WorkflowState`; the executor is the single writer.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// Current state values
    fields: HashMap<String, Value>,
    /// Reducers for each field, shared by every copy of this state
    reducers: Arc<HashMap<String, ReducerType>>,
}

/// One write carried by a [`StateUpdate`]
#[derive(Debug, Clone, PartialEq)]
pub enum StateWrite {
    /// Combine with the current value through the field's reducer
    Reduce { key: String, value: Value },
    /// Store the value as is, bypassing the reducer
    Replace { key: String, value: Value },
}

/// Partial state update returned by a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    writes: Vec<StateWrite>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reducer-mediated write
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.writes.push(StateWrite::Reduce {
            key: key.into(),
            value,
        });
        self
    }

    /// Add a write that resets the field to `value`
    pub fn replace(mut self, key: impl Into<String>, value: Value) -> Self {
        self.writes.push(StateWrite::Replace {
            key: key.into(),
            value,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[StateWrite] {
        &self.writes
    }
}

impl WorkflowState {
    /// Create a new WorkflowState from a schema
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = HashMap::new();
        let mut reducers = HashMap::new();

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
            reducers.insert(name.clone(), def.reducer);
        }

        Self {
            fields,
            reducers: Arc::new(reducers),
        }
    }

    /// Create a state from a schema and an input projection
    ///
    /// Input values are stored as given; they do not pass through reducers.
    pub fn from_input(schema: &StateSchema, input: Map<String, Value>) -> Self {
        let mut state = Self::new(schema);
        for (key, value) in input {
            state.fields.insert(key, value);
        }
        state
    }

    /// Create an empty WorkflowState
    pub fn empty() -> Self {
        Self {
            fields: HashMap::new(),
            reducers: Arc::new(HashMap::new()),
        }
    }

    /// Reducer registered for a field; undeclared fields overwrite
    pub fn reducer(&self, key: &str) -> ReducerType {
        self.reducers.get(key).copied().unwrap_or_default()
    }

    /// Update a field using the appropriate reducer
    pub fn update(&mut self, key: &str, value: Value) -> Result<(), WorkflowError> {
        match self.reducer(key) {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if arr.is_null() {
                    *arr = Value::Array(vec![]);
                }
                let Value::Array(a) = arr else {
                    return Err(WorkflowError::invalid_state(key, "append target is not an array"));
                };
                match value {
                    Value::Array(new_items) => a.extend(new_items),
                    other => a.push(other),
                }
            }
            ReducerType::SumByKey => {
                let Value::Object(new_obj) = value else {
                    return Err(WorkflowError::invalid_state(key, "tally update is not an object"));
                };
                let current = self.object_entry(key)?;
                for (k, v) in new_obj {
                    let add = v.as_i64().ok_or_else(|| {
                        WorkflowError::invalid_state(key, format!("count for '{}' is not an integer", k))
                    })?;
                    let prev = current.get(&k).and_then(Value::as_i64).unwrap_or(0);
                    current.insert(k, Value::from(prev + add));
                }
            }
            ReducerType::Merge => {
                let Value::Object(new_obj) = value else {
                    return Err(WorkflowError::invalid_state(key, "merge update is not an object"));
                };
                let current = self.object_entry(key)?;
                for (k, v) in new_obj {
                    current.insert(k, v);
                }
            }
        }
        Ok(())
    }

    /// Current object value of `key`, created empty when missing or null
    fn object_entry(&mut self, key: &str) -> Result<&mut Map<String, Value>, WorkflowError> {
        let entry = self
            .fields
            .entry(key.to_string())
            .or_insert(Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        entry
            .as_object_mut()
            .ok_or_else(|| WorkflowError::invalid_state(key, "current value is not an object"))
    }

    /// Store a value without consulting the reducer
    pub fn replace(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Apply every write of a node update in order
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), WorkflowError> {
        for write in update.writes {
            match write {
                StateWrite::Reduce { key, value } => self.update(&key, value)?,
                StateWrite::Replace { key, value } => self.replace(&key, value),
            }
        }
        Ok(())
    }

    /// Copy of this state with branch payload fields laid over it
    pub fn with_overlay(&self, payload: &Map<String, Value>) -> Self {
        let mut state = self.clone();
        for (key, value) in payload {
            state.fields.insert(key.clone(), value.clone());
        }
        state
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get an integer field
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Deserialize a field; missing and null both read as `None`
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkflowError> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| WorkflowError::invalid_state(key, e.to_string())),
        }
    }

    /// Deserialize a field that must be present
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkflowError> {
        self.get_typed(key)?
            .ok_or_else(|| WorkflowError::invalid_state(key, "missing"))
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::empty()
    }
}
