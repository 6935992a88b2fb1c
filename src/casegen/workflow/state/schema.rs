// SPDX-License-Identifier: MIT

//! State schema definitions

use crate::adk::error::WorkflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema defining the workflow state structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Default value
    pub default: Option<serde_json::Value>,
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Add integer counts key by key
    SumByKey,
    /// Shallow merge of object keys, incoming keys win
    Merge,
}

impl ReducerType {
    /// Field types this reducer can combine
    fn accepts(self, field_type: FieldType) -> bool {
        match self {
            ReducerType::Overwrite => true,
            ReducerType::Append => field_type == FieldType::Array,
            ReducerType::SumByKey | ReducerType::Merge => field_type == FieldType::Object,
        }
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field without a default value
    pub fn field(mut self, name: &str, field_type: FieldType, reducer: ReducerType) -> Self {
        self.fields.insert(
            name.to_string(),
            StateFieldDef {
                field_type,
                reducer,
                default: None,
            },
        );
        self
    }

    /// Declare a field with a default value
    pub fn field_with_default(
        mut self,
        name: &str,
        field_type: FieldType,
        reducer: ReducerType,
        default: serde_json::Value,
    ) -> Self {
        self.fields.insert(
            name.to_string(),
            StateFieldDef {
                field_type,
                reducer,
                default: Some(default),
            },
        );
        self
    }

    /// Reject reducers declared on field types they cannot combine
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for (name, def) in &self.fields {
            if !def.reducer.accepts(def.field_type) {
                return Err(WorkflowError::InvalidSchema(format!(
                    "field '{}' of type {:?} cannot use reducer {:?}",
                    name, def.field_type, def.reducer
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_schema_deserialize() {
        let yaml = r#"
            spec:
              type: object
            draftCount:
              type: number
              default: 3
            drafts:
              type: array
              reducer: append
            votes:
              type: object
              reducer: sum_by_key
        "#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(schema.fields.len(), 4);
        assert_eq!(schema.fields["spec"].field_type, FieldType::Object);
        assert_eq!(schema.fields["draftCount"].default, Some(json!(3)));
        assert_eq!(schema.fields["drafts"].reducer, ReducerType::Append);
        assert_eq!(schema.fields["votes"].reducer, ReducerType::SumByKey);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_reducer_default() {
        let def = StateFieldDef {
            field_type: FieldType::String,
            reducer: ReducerType::default(),
            default: None,
        };
        assert_eq!(def.reducer, ReducerType::Overwrite);
    }

    #[test]
    fn test_all_reducers() {
        let yaml = r#"
            f1: { type: string, reducer: overwrite }
            f2: { type: array, reducer: append }
            f3: { type: object, reducer: sum_by_key }
            f4: { type: object, reducer: merge }
        "#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(schema.fields["f1"].reducer, ReducerType::Overwrite);
        assert_eq!(schema.fields["f2"].reducer, ReducerType::Append);
        assert_eq!(schema.fields["f3"].reducer, ReducerType::SumByKey);
        assert_eq!(schema.fields["f4"].reducer, ReducerType::Merge);
    }

    #[test]
    fn test_validate_rejects_mismatched_reducer() {
        let schema = StateSchema::new().field("count", FieldType::Number, ReducerType::Append);
        assert!(matches!(
            schema.validate(),
            Err(WorkflowError::InvalidSchema(_))
        ));

        let schema = StateSchema::new().field("votes", FieldType::Array, ReducerType::SumByKey);
        assert!(schema.validate().is_err());
    }
}
