use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How a field's value is read from the matched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Attribute,
    Html,
    Nested,
    NestedList,
    List,
}

impl FieldKind {
    /// Kinds whose value is built from sub-fields.
    pub fn has_children(&self) -> bool {
        matches!(self, FieldKind::Nested | FieldKind::NestedList | FieldKind::List)
    }
}

/// One named field of an extraction schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// CSS selector relative to the enclosing element. When absent the
    /// enclosing element itself is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Attribute name for [`FieldKind::Attribute`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Value used when nothing matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

/// CSS-selector extraction schema.
///
/// Every element matched by `base_selector` becomes one record whose
/// entries are produced by `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSchema {
    /// Human-readable schema name, also used to label persisted files.
    pub name: String,
    pub base_selector: String,
    pub fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    /// Read and validate a schema from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::SchemaError(format!(
                "Failed to read schema file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            AppError::SchemaError(msg) => {
                AppError::SchemaError(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Parse and validate a schema from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let schema: ExtractionSchema = serde_json::from_str(raw)
            .map_err(|e| AppError::SchemaError(format!("Invalid schema JSON: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::SchemaError("Schema name must not be empty".into()));
        }
        if self.base_selector.trim().is_empty() {
            return Err(AppError::SchemaError(
                "baseSelector must not be empty".into(),
            ));
        }
        if self.fields.is_empty() {
            return Err(AppError::SchemaError(
                "Schema must declare at least one field".into(),
            ));
        }
        validate_fields(&self.fields, &self.name)
    }
}

fn validate_fields(fields: &[FieldSpec], parent: &str) -> Result<(), AppError> {
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(AppError::SchemaError(format!(
                "Field under '{parent}' has an empty name"
            )));
        }
        if field.kind == FieldKind::Attribute && field.attribute.is_none() {
            return Err(AppError::SchemaError(format!(
                "Field '{}' is of type attribute but names no attribute",
                field.name
            )));
        }
        if field.kind.has_children() {
            if field.fields.is_empty() {
                return Err(AppError::SchemaError(format!(
                    "Field '{}' needs sub-fields",
                    field.name
                )));
            }
            validate_fields(&field.fields, &field.name)?;
        }
    }
    Ok(())
}
