//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Schema validation for the Schema Registry
//!
//! The registry calls an injected validator before store and after load.
//! The default [`SchemaValidator`] only checks the structural shape the
//! registry relies on; field-level semantics belong to the authoring layer.

use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::schema::{validate_schema_id, SchemaDocument};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Maximum encoded content size accepted by the structural validator
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Field count above which a warning is raised
const LARGE_FIELD_COUNT: usize = 500;

/// Schema validator trait
#[async_trait]
pub trait SchemaValidatorTrait: Send + Sync {
    /// Validate a schema document
    async fn validate_document(
        &self,
        document: &SchemaDocument,
    ) -> SchemaRegistryResult<ValidationResult>;
}

/// Structural schema validator
pub struct SchemaValidator {
    /// Validation rules
    rules: BTreeMap<String, ValidationRule>,

    /// Treat warnings as errors
    strict_mode: bool,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    /// Create a new schema validator
    pub fn new() -> Self {
        Self::with_strict_mode(false)
    }

    /// Create a validator with strict mode
    pub fn with_strict_mode(strict_mode: bool) -> Self {
        let mut validator = Self {
            rules: BTreeMap::new(),
            strict_mode,
        };

        validator.add_default_rules();

        validator
    }

    /// Add default validation rules
    fn add_default_rules(&mut self) {
        for (name, description, rule_type) in [
            (
                "document_identity",
                "Validate id and version tag",
                ValidationRuleType::Identity,
            ),
            (
                "document_structure",
                "Validate fields, actions and layout shape",
                ValidationRuleType::Structure,
            ),
            (
                "document_size",
                "Validate document size limits",
                ValidationRuleType::Size,
            ),
        ] {
            self.add_rule(ValidationRule {
                name: name.to_string(),
                description: description.to_string(),
                rule_type,
                enabled: true,
            });
        }
    }

    /// Add custom validation rule
    pub fn add_rule(&mut self, rule: ValidationRule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    /// Remove validation rule
    pub fn remove_rule(&mut self, rule_name: &str) {
        self.rules.remove(rule_name);
    }

    /// Enable or disable a rule
    pub fn set_rule_enabled(&mut self, rule_name: &str, enabled: bool) {
        if let Some(rule) = self.rules.get_mut(rule_name) {
            rule.enabled = enabled;
        }
    }

    fn validate_identity(
        &self,
        document: &SchemaDocument,
        errors: &mut Vec<ValidationError>,
        _warnings: &mut Vec<ValidationWarning>,
    ) {
        if let Err(e) = validate_schema_id(&document.id) {
            errors.push(ValidationError::new("INVALID_ID", &e.to_string(), "id"));
        }

        if document.version.trim().is_empty() {
            errors.push(ValidationError::new(
                "MISSING_VERSION",
                "Schema version must not be empty",
                "version",
            ));
        } else if document.version.chars().any(char::is_whitespace) {
            errors.push(ValidationError::new(
                "INVALID_VERSION",
                "Schema version must not contain whitespace",
                "version",
            ));
        }
    }

    fn validate_structure(
        &self,
        document: &SchemaDocument,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        if let Some(title) = document.field("title") {
            if !title.is_string() {
                errors.push(ValidationError::new(
                    "INVALID_TITLE",
                    "title must be a string",
                    "title",
                ));
            }
        }

        if let Some(layout) = document.field("layout") {
            if !layout.is_object() {
                errors.push(ValidationError::new(
                    "INVALID_LAYOUT",
                    "layout must be an object",
                    "layout",
                ));
            }
        }

        for section in ["fields", "actions"] {
            let Some(value) = document.field(section) else {
                continue;
            };
            let Value::Array(items) = value else {
                errors.push(ValidationError::new(
                    "INVALID_SECTION",
                    &format!("{} must be an array", section),
                    section,
                ));
                continue;
            };

            let mut seen = HashSet::new();
            for (index, item) in items.iter().enumerate() {
                let location = format!("{}[{}]", section, index);
                let name = item.get("name").and_then(Value::as_str);
                match name {
                    Some(name) if !name.trim().is_empty() => {
                        if !seen.insert(name) {
                            errors.push(ValidationError::new(
                                "DUPLICATE_NAME",
                                &format!("duplicate {} name {:?}", section, name),
                                &location,
                            ));
                        }
                    }
                    _ => errors.push(ValidationError::new(
                        "MISSING_NAME",
                        &format!("{} entries must be objects with a non-empty name", section),
                        &location,
                    )),
                }
            }

            if section == "fields" && items.is_empty() {
                warnings.push(ValidationWarning::new(
                    "EMPTY_FIELDS",
                    "Schema declares an empty field list",
                    section,
                ));
            }
        }
    }

    fn validate_size(
        &self,
        document: &SchemaDocument,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        match serde_json::to_vec(&document.content) {
            Ok(bytes) if bytes.len() > MAX_DOCUMENT_BYTES => {
                errors.push(ValidationError::new(
                    "SCHEMA_TOO_LARGE",
                    &format!(
                        "Schema content exceeds maximum size of {} bytes",
                        MAX_DOCUMENT_BYTES
                    ),
                    "content",
                ));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(
                "UNSERIALIZABLE_CONTENT",
                &e.to_string(),
                "content",
            )),
        }

        if let Some(Value::Array(fields)) = document.field("fields") {
            if fields.len() > LARGE_FIELD_COUNT {
                warnings.push(ValidationWarning::new(
                    "LARGE_FIELD_COUNT",
                    &format!("Schema declares {} fields", fields.len()),
                    "fields",
                ));
            }
        }
    }
}

#[async_trait]
impl SchemaValidatorTrait for SchemaValidator {
    async fn validate_document(
        &self,
        document: &SchemaDocument,
    ) -> SchemaRegistryResult<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for rule in self.rules.values().filter(|r| r.enabled) {
            match rule.rule_type {
                ValidationRuleType::Identity => {
                    self.validate_identity(document, &mut errors, &mut warnings)
                }
                ValidationRuleType::Structure => {
                    self.validate_structure(document, &mut errors, &mut warnings)
                }
                ValidationRuleType::Size => {
                    self.validate_size(document, &mut errors, &mut warnings)
                }
            }
        }

        if self.strict_mode {
            errors.extend(warnings.drain(..).map(|w| ValidationError {
                code: w.code,
                message: w.message,
                location: w.location,
                details: Some("warning promoted by strict mode".to_string()),
            }));
        }

        Ok(ValidationResult::from_findings(errors, warnings))
    }
}

/// Validation result
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationResult {
    /// Overall status
    pub status: ValidationStatus,

    /// Errors that reject the document
    pub errors: Vec<ValidationError>,

    /// Findings that do not reject the document
    pub warnings: Vec<ValidationWarning>,

    /// Extra validator specific data
    pub metadata: HashMap<String, String>,
}

impl ValidationResult {
    /// A passing result without findings
    pub fn valid() -> Self {
        Self::from_findings(Vec::new(), Vec::new())
    }

    /// Build a result, deriving the status from the findings
    pub fn from_findings(errors: Vec<ValidationError>, warnings: Vec<ValidationWarning>) -> Self {
        let status = if !errors.is_empty() {
            ValidationStatus::Invalid
        } else if !warnings.is_empty() {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Valid
        };

        Self {
            status,
            errors,
            warnings,
            metadata: HashMap::new(),
        }
    }

    /// Check if the document passed
    pub fn is_valid(&self) -> bool {
        self.status != ValidationStatus::Invalid
    }

    /// Number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of warnings
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Convert a failing result into the registry error
    pub fn into_result(self) -> SchemaRegistryResult<()> {
        if self.is_valid() {
            return Ok(());
        }
        Err(SchemaRegistryError::ValidationFailed(
            self.errors.iter().map(ToString::to_string).collect(),
        ))
    }
}

/// Validation status
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Validation passed
    Valid,

    /// Validation passed with warnings
    Warning,

    /// Validation failed
    Invalid,
}

/// Validation error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    /// Error code
    pub code: String,

    /// Error message
    pub message: String,

    /// Error location (optional)
    pub location: Option<String>,

    /// Additional details (optional)
    pub details: Option<String>,
}

impl ValidationError {
    /// Create an error at a location
    pub fn new(code: &str, message: &str, location: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            location: Some(location.to_string()),
            details: None,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {}: {}", self.code, location, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Validation warning
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationWarning {
    /// Warning code
    pub code: String,

    /// Warning message
    pub message: String,

    /// Warning location (optional)
    pub location: Option<String>,

    /// Additional details (optional)
    pub details: Option<String>,
}

impl ValidationWarning {
    /// Create a warning at a location
    pub fn new(code: &str, message: &str, location: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            location: Some(location.to_string()),
            details: None,
        }
    }
}

/// Validation rule
#[derive(Debug, Clone)]
pub struct ValidationRule {
    /// Rule name
    pub name: String,

    /// Rule description
    pub description: String,

    /// Rule type
    pub rule_type: ValidationRuleType,

    /// Whether the rule is enabled
    pub enabled: bool,
}

/// Validation rule type
#[derive(Debug, Clone, Copy)]
pub enum ValidationRuleType {
    /// Id and version checks
    Identity,

    /// Shape of well-known sections
    Structure,

    /// Size limits
    Size,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> SchemaDocument {
        SchemaDocument::new("user.profile")
            .with_field("title", json!("User"))
            .with_field(
                "fields",
                json!([{"name": "email"}, {"name": "display_name"}]),
            )
            .with_field("actions", json!([{"name": "save"}]))
    }

    #[tokio::test]
    async fn test_valid_document() {
        let validator = SchemaValidator::new();
        let result = validator.validate_document(&form()).await.unwrap();
        assert!(result.is_valid());
        assert_eq!(result.error_count(), 0);
        assert!(result.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_structural_errors() {
        let validator = SchemaValidator::new();
        let document = SchemaDocument::new("user.profile")
            .with_field("title", json!(42))
            .with_field("fields", json!([{"name": "a"}, {"name": "a"}, {"type": "text"}]))
            .with_field("actions", json!("save"));

        let result = validator.validate_document(&document).await.unwrap();
        assert!(!result.is_valid());
        let codes: Vec<_> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&"INVALID_TITLE"));
        assert!(codes.contains(&"DUPLICATE_NAME"));
        assert!(codes.contains(&"MISSING_NAME"));
        assert!(codes.contains(&"INVALID_SECTION"));

        let err = result.into_result().unwrap_err();
        assert!(matches!(err, SchemaRegistryError::ValidationFailed(ref m) if m.len() == 4));
    }

    #[tokio::test]
    async fn test_identity_errors() {
        let validator = SchemaValidator::new();
        let document = SchemaDocument::new("bad id").with_version(" ");
        let result = validator.validate_document(&document).await.unwrap();
        assert_eq!(result.error_count(), 2);
    }

    #[tokio::test]
    async fn test_strict_mode_promotes_warnings() {
        let document = SchemaDocument::new("x").with_field("fields", json!([]));

        let lenient = SchemaValidator::new();
        let result = lenient.validate_document(&document).await.unwrap();
        assert_eq!(result.status, ValidationStatus::Warning);
        assert!(result.is_valid());

        let strict = SchemaValidator::with_strict_mode(true);
        let result = strict.validate_document(&document).await.unwrap();
        assert!(!result.is_valid());
    }

    #[tokio::test]
    async fn test_disabled_rule_is_skipped() {
        let mut validator = SchemaValidator::new();
        validator.set_rule_enabled("document_structure", false);
        let document = SchemaDocument::new("x").with_field("fields", json!("nope"));
        let result = validator.validate_document(&document).await.unwrap();
        assert!(result.is_valid());
    }
}
