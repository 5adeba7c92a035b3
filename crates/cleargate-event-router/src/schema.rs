//! Payload schemas for trigger types.
//!
//! A schema is used two ways: to validate emitted payloads, and to resolve
//! the dotted property paths a subscription filter refers to. Both go
//! through the [`PayloadSchema`] trait so callers never introspect a
//! concrete validator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural schema of a trigger's payload.
pub trait PayloadSchema: Send + Sync + fmt::Debug {
    /// Check `payload` against the schema, returning every violation found.
    fn validate(&self, payload: &Value) -> Result<(), Vec<SchemaViolation>>;

    /// Resolve a dotted path (`repo.owner.login`) to the type declared for
    /// it. `None` means the path does not exist in the schema.
    fn resolve_path(&self, path: &str) -> Option<FieldType>;

    /// Every addressable dotted path, sorted. Used for filter autocomplete.
    fn paths(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Type of a single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object(ObjectSchema),
    Array(Box<FieldType>),
    Any,
}

impl FieldType {
    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Any => "any",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Object(_), Value::Object(_)) => true,
            (Self::Array(_), Value::Array(_)) => true,
            _ => false,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A named field within an [`ObjectSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// If non-empty, the value must equal one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSchema {
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            allowed_values: Vec::new(),
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn object(schema: ObjectSchema) -> Self {
        Self::of(FieldType::Object(schema))
    }

    pub fn array(items: FieldType) -> Self {
        Self::of(FieldType::Array(Box::new(items)))
    }

    pub fn any() -> Self {
        Self::of(FieldType::Any)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.allowed_values = values.into_iter().collect();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ObjectSchema
// ---------------------------------------------------------------------------

/// Schema for a JSON object. Unknown properties are rejected unless the
/// schema is `open`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ObjectSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    pub open: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Accept properties not declared in `fields`.
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    fn validate_at(&self, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
        let Some(obj) = value.as_object() else {
            out.push(SchemaViolation::new(
                path,
                ViolationKind::TypeMismatch {
                    expected: "object",
                    found: json_type_name(value),
                },
            ));
            return;
        };

        for (name, field) in &self.fields {
            let child = join(path, name);
            match obj.get(name) {
                None | Some(Value::Null) if field.required => {
                    out.push(SchemaViolation::new(&child, ViolationKind::Missing));
                }
                None | Some(Value::Null) => {}
                Some(v) => validate_field(field, v, &child, out),
            }
        }

        if !self.open {
            for key in obj.keys() {
                if !self.fields.contains_key(key) {
                    out.push(SchemaViolation::new(
                        &join(path, key),
                        ViolationKind::Unexpected,
                    ));
                }
            }
        }
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, field) in &self.fields {
            let path = join(prefix, name);
            out.push(path.clone());
            collect_type_paths(&field.field_type, &path, out);
        }
    }
}

fn validate_field(field: &FieldSchema, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    validate_type(&field.field_type, value, path, out);
    if !field.allowed_values.is_empty() && !field.allowed_values.contains(value) {
        out.push(SchemaViolation::new(path, ViolationKind::NotAllowed));
    }
}

fn validate_type(ty: &FieldType, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    if !ty.accepts(value) {
        out.push(SchemaViolation::new(
            path,
            ViolationKind::TypeMismatch {
                expected: ty.name(),
                found: json_type_name(value),
            },
        ));
        return;
    }
    match (ty, value) {
        (FieldType::Object(schema), _) => schema.validate_at(value, path, out),
        (FieldType::Array(items), Value::Array(elems)) => {
            for (i, elem) in elems.iter().enumerate() {
                validate_type(items, elem, &format!("{path}[{i}]"), out);
            }
        }
        _ => {}
    }
}

fn collect_type_paths(ty: &FieldType, prefix: &str, out: &mut Vec<String>) {
    match ty {
        FieldType::Object(schema) => schema.collect_paths(prefix, out),
        FieldType::Array(items) => collect_type_paths(items, prefix, out),
        _ => {}
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

impl PayloadSchema for ObjectSchema {
    fn validate(&self, payload: &Value) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();
        self.validate_at(payload, "", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn resolve_path(&self, path: &str) -> Option<FieldType> {
        if path.is_empty() {
            return None;
        }
        let mut current = FieldType::Object(self.clone());
        for segment in path.split('.') {
            current = descend(&current, segment)?;
        }
        Some(current)
    }

    fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out.sort();
        out.dedup();
        out
    }
}

/// Step one path segment into `ty`. Arrays are transparent so that
/// `labels.name` addresses the `name` of each element.
fn descend(ty: &FieldType, segment: &str) -> Option<FieldType> {
    match ty {
        FieldType::Any => Some(FieldType::Any),
        FieldType::Array(items) => descend(items, segment),
        FieldType::Object(schema) => match schema.fields.get(segment) {
            Some(field) => Some(field.field_type.clone()),
            None if schema.open => Some(FieldType::Any),
            None => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// A single schema violation, addressed by dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    pub kind: ViolationKind,
}

impl SchemaViolation {
    fn new(path: &str, kind: ViolationKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ViolationKind {
    Missing,
    Unexpected,
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    NotAllowed,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "(root)"
        } else {
            &self.path
        };
        match &self.kind {
            ViolationKind::Missing => write!(f, "{path}: required property missing"),
            ViolationKind::Unexpected => write!(f, "{path}: unexpected property"),
            ViolationKind::TypeMismatch { expected, found } => {
                write!(f, "{path}: expected {expected}, found {found}")
            }
            ViolationKind::NotAllowed => write!(f, "{path}: value not in allowed set"),
        }
    }
}
