//! Tool parameter schemas as tagged descriptors.
//!
//! Schemas are declared in code, validated against the parsed argument
//! tree before execution, and rendered to JSON Schema for the provider's
//! tool declarations. Rendering is deterministic: properties are kept in
//! a sorted map so the serialized form never reorders between iterations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn json_name(&self) -> &'static str {
        match self {
            ParamType::String  => "string",
            ParamType::Integer => "integer",
            ParamType::Number  => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array   => "array",
            ParamType::Object  => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String  => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number  => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array   => value.is_array(),
            ParamType::Object  => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub param_type:  ParamType,
    pub description: String,
    pub required:    bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum:     Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum:     Option<f64>,
}

impl ParamSpec {
    pub fn new(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            required:    false,
            enum_values: None,
            minimum:     None,
            maximum:     None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// Declared parameters of a tool, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    properties: BTreeMap<String, ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a required parameter with no constraints.
    pub fn require(mut self, name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        self.properties.insert(name.into(), ParamSpec::new(param_type, description).required());
        self
    }

    /// Shorthand for an optional parameter with no constraints.
    pub fn allow(mut self, name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        self.properties.insert(name.into(), ParamSpec::new(param_type, description));
        self
    }

    /// Full-control insertion for enum/range parameters.
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    /// Validate an argument mapping. Returns every violation, not just the
    /// first, so the model sees the complete picture in one round-trip.
    pub fn validate(&self, args: &HashMap<String, Value>) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        for (name, spec) in &self.properties {
            let Some(value) = args.get(name) else {
                if spec.required {
                    violations.push(format!("missing required parameter '{name}'"));
                }
                continue;
            };
            if !spec.param_type.matches(value) {
                violations.push(format!(
                    "parameter '{name}' expected {}, got {}",
                    spec.param_type.json_name(),
                    json_type_name(value)
                ));
                continue;
            }
            if let Some(allowed) = &spec.enum_values {
                if !allowed.contains(value) {
                    violations.push(format!("parameter '{name}' must be one of {allowed:?}"));
                }
            }
            if let Some(n) = value.as_f64() {
                if spec.minimum.is_some_and(|min| n < min) || spec.maximum.is_some_and(|max| n > max) {
                    violations.push(format!(
                        "parameter '{name}' out of range [{:?}, {:?}]",
                        spec.minimum, spec.maximum
                    ));
                }
            }
        }

        for name in args.keys() {
            if !self.properties.contains_key(name) {
                violations.push(format!("unknown parameter '{name}'"));
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Render as a JSON Schema object for the provider tool declaration.
    pub fn to_json_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.properties {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), json!(spec.param_type.json_name()));
            prop.insert("description".to_string(), json!(spec.description));
            if let Some(values) = &spec.enum_values {
                prop.insert("enum".to_string(), json!(values));
            }
            if let Some(min) = spec.minimum {
                prop.insert("minimum".to_string(), json!(min));
            }
            if let Some(max) = spec.maximum {
                prop.insert("maximum".to_string(), json!(max));
            }
            props.insert(name.clone(), Value::Object(prop));
            if spec.required {
                required.push(json!(name));
            }
        }
        json!({
            "type": "object",
            "properties": props,
            "required": required,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}
