//! Schema id syntax
//!
//! Ids are printable and free of whitespace. Dots are the only allowed
//! hierarchy separator and map onto directories for file and object
//! storage (`x.y.z` becomes `x/y/z`).

use crate::error::{SchemaRegistryError, SchemaRegistryResult};

/// Maximum accepted id length in bytes
pub const MAX_SCHEMA_ID_LENGTH: usize = 200;

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

fn check_token(value: &str, what: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", what));
    }
    if value.len() > MAX_SCHEMA_ID_LENGTH {
        return Err(format!(
            "{} exceeds {} bytes",
            what, MAX_SCHEMA_ID_LENGTH
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control())
    {
        return Err(format!("{} contains whitespace or control character {:?}", what, c));
    }
    if let Some(c) = value.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(format!("{} contains forbidden character {:?}", what, c));
    }
    Ok(())
}

/// Validate a schema id before it reaches any backend
pub fn validate_schema_id(id: &str) -> SchemaRegistryResult<()> {
    check_token(id, "id").map_err(|reason| SchemaRegistryError::invalid_id(id, &reason))?;

    if id.contains("..") {
        return Err(SchemaRegistryError::invalid_id(
            id,
            "id must not contain '..'",
        ));
    }
    if id.starts_with('.') || id.ends_with('.') {
        return Err(SchemaRegistryError::invalid_id(
            id,
            "id must not start or end with '.'",
        ));
    }

    Ok(())
}

/// Validate a version tag used to address historical snapshots
pub fn validate_version_tag(id: &str, version: &str) -> SchemaRegistryResult<()> {
    check_token(version, "version").map_err(|reason| SchemaRegistryError::invalid_id(id, &reason))?;
    if version.starts_with('.') || version.contains("..") {
        return Err(SchemaRegistryError::invalid_id(
            id,
            "version must not contain a relative path segment",
        ));
    }
    Ok(())
}

/// Relative path of an id with dots mapped to separators, without extension
pub fn id_to_relative_path(id: &str) -> String {
    id.replace('.', "/")
}

/// Cache key of the current record of an id
pub fn current_cache_key(id: &str) -> String {
    format!("schema:{}", id)
}

/// Cache key of a historical version of an id
pub fn version_cache_key(id: &str, version: &str) -> String {
    format!("schema:{}:v:{}", id, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in ["x", "user.profile", "orders.v2.checkout-form", "a_b-C9"] {
            assert!(validate_schema_id(id).is_ok(), "{} should be valid", id);
        }
    }

    #[test]
    fn test_invalid_ids() {
        let long = "a".repeat(MAX_SCHEMA_ID_LENGTH + 1);
        for id in [
            "",
            " x",
            "x ",
            "a b",
            "a/b",
            "a\\b",
            "..",
            "a..b",
            ".hidden",
            "trailing.",
            "a:b",
            "a*b",
            "tab\there",
            long.as_str(),
        ] {
            let err = validate_schema_id(id).unwrap_err();
            assert!(
                matches!(err, SchemaRegistryError::InvalidId { .. }),
                "{:?} should be rejected",
                id
            );
        }
    }

    #[test]
    fn test_version_tags() {
        assert!(validate_version_tag("x", "00000001712345678901234567").is_ok());
        assert!(validate_version_tag("x", "1.0.0").is_ok());
        assert!(validate_version_tag("x", "").is_err());
        assert!(validate_version_tag("x", "../etc").is_err());
        assert!(validate_version_tag("x", "a/b").is_err());
    }

    #[test]
    fn test_path_and_cache_keys() {
        assert_eq!(id_to_relative_path("x.y.z"), "x/y/z");
        assert_eq!(current_cache_key("user.profile"), "schema:user.profile");
        assert_eq!(version_cache_key("x", "7"), "schema:x:v:7");
    }
}
