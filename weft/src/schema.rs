//! Target schemas and artifact validation
//!
//! A target schema names the fields a produced record must carry. Validation
//! reports structured, per-item violations; the orchestrator feeds those back
//! to the agent instead of failing the run.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// JSON kind a field must hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }

    fn matches(&self, value: &JsonValue) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// The schema an endpoint's output must satisfy. Unknown keys are allowed;
/// records carry an open property mapping beyond the declared fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl TargetSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields,
        }
    }

    /// Content hash of the schema, for manifest reproducibility/versioning
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        format!("{:x}", digest)
    }
}

/// One structured validation failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// Where in the artifact the problem sits, e.g. `[3].email`
    pub path: String,
    pub message: String,
}

/// Outcome of validating an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub item_count: usize,
    pub violations: Vec<SchemaViolation>,
}

impl ValidationReport {
    pub fn passed(item_count: usize) -> Self {
        Self {
            passed: true,
            item_count,
            violations: vec![],
        }
    }

    /// Render violations as agent feedback, bounded to the first ten
    pub fn feedback(&self) -> String {
        let mut text = format!(
            "Validation failed with {} problem(s):\n",
            self.violations.len()
        );
        for violation in self.violations.iter().take(10) {
            text.push_str(&format!("- {}: {}\n", violation.path, violation.message));
        }
        if self.violations.len() > 10 {
            text.push_str(&format!("... and {} more\n", self.violations.len() - 10));
        }
        text
    }
}

pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate a record stream
    pub fn validate_items(schema: &TargetSchema, items: &[JsonValue]) -> ValidationReport {
        let mut violations = vec![];
        for (index, item) in items.iter().enumerate() {
            Self::check_object(schema, item, &format!("[{}]", index), &mut violations);
        }
        ValidationReport {
            passed: violations.is_empty(),
            item_count: items.len(),
            violations,
        }
    }

    /// Validate a single object
    pub fn validate_object(schema: &TargetSchema, object: &JsonValue) -> ValidationReport {
        let mut violations = vec![];
        Self::check_object(schema, object, "$", &mut violations);
        ValidationReport {
            passed: violations.is_empty(),
            item_count: 1,
            violations,
        }
    }

    fn check_object(
        schema: &TargetSchema,
        value: &JsonValue,
        path: &str,
        violations: &mut Vec<SchemaViolation>,
    ) {
        let Some(object) = value.as_object() else {
            violations.push(SchemaViolation {
                path: path.to_string(),
                message: "expected an object".to_string(),
            });
            return;
        };

        for field in &schema.fields {
            match object.get(&field.name) {
                None | Some(JsonValue::Null) => {
                    if field.required {
                        violations.push(SchemaViolation {
                            path: format!("{}.{}", path, field.name),
                            message: "required field is missing".to_string(),
                        });
                    }
                }
                Some(actual) => {
                    if !field.kind.matches(actual) {
                        violations.push(SchemaViolation {
                            path: format!("{}.{}", path, field.name),
                            message: format!("expected {}", field.kind.as_str()),
                        });
                    }
                }
            }
        }
    }
}
