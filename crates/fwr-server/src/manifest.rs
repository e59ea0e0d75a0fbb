//! Release manifest parsing and schema validation
//!
//! The manifest is untrusted input from inside the uploaded archive. It is
//! first read into [`RawManifest`], where every field is optional, and only
//! business logic downstream of [`RawManifest::validate`] sees the typed
//! [`Manifest`].

use fwr_common::checksum::SHA256_HEX_LEN;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path};

use crate::error::{PipelineError, PipelineResult};

/// Required top-level fields, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "class",
    "product_id",
    "application",
    "branch",
    "version",
    "commit",
    "created",
    "files",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawManifest {
    pub class: Option<Value>,
    pub product_id: Option<Value>,
    pub application: Option<Value>,
    pub branch: Option<Value>,
    pub version: Option<Value>,
    pub commit: Option<Value>,
    pub created: Option<Value>,
    pub files: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub class: String,
    pub product_id: String,
    pub application: String,
    pub branch: String,
    pub version: String,
    pub commit: String,
    pub created: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path relative to the archive root
    pub name: String,
    pub sha256: String,
}

fn schema(message: impl Into<String>) -> PipelineError {
    PipelineError::Schema(message.into())
}

/// Render a scalar JSON value as a string; objects, arrays and null yield None
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_safe_relative(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Parse manifest bytes into a JSON document.
///
/// Returns the document untouched so it can be stored verbatim even when
/// it later fails validation.
pub fn parse_document(bytes: &[u8]) -> PipelineResult<Value> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| schema(format!("manifest.json is not valid JSON: {e}")))?;

    if !document.is_object() {
        return Err(schema("Manifest must be a JSON object"));
    }

    Ok(document)
}

impl RawManifest {
    pub fn from_document(document: &Value) -> PipelineResult<Self> {
        RawManifest::deserialize(document)
            .map_err(|e| schema(format!("Manifest could not be read: {e}")))
    }

    fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "class" => self.class.as_ref(),
            "product_id" => self.product_id.as_ref(),
            "application" => self.application.as_ref(),
            "branch" => self.branch.as_ref(),
            "version" => self.version.as_ref(),
            "commit" => self.commit.as_ref(),
            "created" => self.created.as_ref(),
            "files" => self.files.as_ref(),
            _ => None,
        }
    }

    fn scalar(&self, name: &str) -> PipelineResult<String> {
        self.field(name)
            .and_then(scalar_string)
            .ok_or_else(|| schema(format!("Manifest field '{name}' must be a string")))
    }

    /// Check the manifest structure and convert it into a [`Manifest`].
    ///
    /// Fails on the first problem found: a missing required field, a
    /// `files` value that is not an array, or a file entry without a
    /// usable `name` and a 64 character `sha256`. Digest content is not
    /// checked here.
    pub fn validate(&self) -> PipelineResult<Manifest> {
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| self.field(f).is_none()) {
            return Err(schema(format!("Manifest missing required field: {missing}")));
        }

        let entries = match self.files.as_ref() {
            Some(Value::Array(entries)) => entries,
            _ => return Err(schema("Manifest 'files' must be an array")),
        };

        let mut files = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let name = entry.get("name").and_then(Value::as_str);
            let sha256 = entry.get("sha256").and_then(Value::as_str);

            let (Some(name), Some(sha256)) = (name, sha256) else {
                return Err(schema(format!(
                    "File entry {index} must contain 'name' and 'sha256'"
                )));
            };

            if sha256.chars().count() != SHA256_HEX_LEN {
                return Err(schema(format!("Invalid SHA256 for {name}")));
            }

            if !is_safe_relative(name) {
                return Err(schema(format!("Invalid file name in manifest: {name}")));
            }

            files.push(FileEntry {
                name: name.to_string(),
                sha256: sha256.to_string(),
            });
        }

        Ok(Manifest {
            class: self.scalar("class")?,
            product_id: self.scalar("product_id")?,
            application: self.scalar("application")?,
            branch: self.scalar("branch")?,
            version: self.scalar("version")?,
            commit: self.scalar("commit")?,
            created: self.scalar("created")?,
            files,
        })
    }
}

/// Parse and validate in one step
pub fn validate_document(document: &Value) -> PipelineResult<Manifest> {
    RawManifest::from_document(document)?.validate()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "class": "firmware",
            "product_id": "ctrl-4ch",
            "application": "controller",
            "branch": "main",
            "version": "1.4.2",
            "commit": "9f1c2ab",
            "created": "2024-05-01T12:00:00Z",
            "files": [
                { "name": "firmware.bin", "sha256": "a".repeat(64) },
                { "name": "boot/loader.bin", "sha256": "B".repeat(64) }
            ]
        })
    }

    fn schema_message(document: &Value) -> String {
        match validate_document(document) {
            Err(PipelineError::Schema(message)) => message,
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_manifest() {
        let manifest = validate_document(&valid_document()).unwrap();
        assert_eq!(manifest.product_id, "ctrl-4ch");
        assert_eq!(manifest.version, "1.4.2");
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[1].name, "boot/loader.bin");
    }

    #[test]
    fn test_first_missing_field_is_named() {
        let mut document = valid_document();
        let object = document.as_object_mut().unwrap();
        object.remove("branch");
        object.remove("commit");
        assert_eq!(schema_message(&document), "Manifest missing required field: branch");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let mut document = valid_document();
        document["created"] = Value::Null;
        assert_eq!(schema_message(&document), "Manifest missing required field: created");
    }

    #[test]
    fn test_files_must_be_array() {
        let mut document = valid_document();
        document["files"] = json!({ "name": "firmware.bin" });
        assert_eq!(schema_message(&document), "Manifest 'files' must be an array");

        document["files"] = json!("firmware.bin");
        assert_eq!(schema_message(&document), "Manifest 'files' must be an array");
    }

    #[test]
    fn test_empty_files_is_valid() {
        let mut document = valid_document();
        document["files"] = json!([]);
        assert!(validate_document(&document).unwrap().files.is_empty());
    }

    #[test]
    fn test_entry_missing_digest() {
        let mut document = valid_document();
        document["files"] = json!([{ "name": "firmware.bin" }]);
        assert_eq!(
            schema_message(&document),
            "File entry 0 must contain 'name' and 'sha256'"
        );
    }

    #[test]
    fn test_entry_short_digest_names_file() {
        let mut document = valid_document();
        document["files"][1]["sha256"] = json!("abc123");
        assert_eq!(schema_message(&document), "Invalid SHA256 for boot/loader.bin");
    }

    #[test]
    fn test_digest_length_counts_characters() {
        let mut document = valid_document();
        document["files"][0]["sha256"] = json!("é".repeat(32));
        assert_eq!(schema_message(&document), "Invalid SHA256 for firmware.bin");

        document["files"][0]["sha256"] = json!("é".repeat(64));
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn test_traversal_rejected() {
        for name in ["../etc/passwd", "/abs/firmware.bin", "a/../../b", ""] {
            let mut document = valid_document();
            document["files"][0]["name"] = json!(name);
            assert!(matches!(
                validate_document(&document),
                Err(PipelineError::Schema(_))
            ));
        }
    }

    #[test]
    fn test_numeric_fields_rendered() {
        let mut document = valid_document();
        document["version"] = json!(7);
        document["created"] = json!(1714564800);
        let manifest = validate_document(&document).unwrap();
        assert_eq!(manifest.version, "7");
        assert_eq!(manifest.created, "1714564800");
    }

    #[test]
    fn test_structured_scalar_field_rejected() {
        let mut document = valid_document();
        document["branch"] = json!({ "name": "main" });
        assert_eq!(schema_message(&document), "Manifest field 'branch' must be a string");
    }

    #[test]
    fn test_parse_document() {
        assert!(parse_document(br#"{"class":"firmware"}"#).is_ok());
        assert!(matches!(parse_document(b"[1,2]"), Err(PipelineError::Schema(_))));
        assert!(matches!(parse_document(b"{not json"), Err(PipelineError::Schema(_))));
    }

    proptest! {
        #[test]
        fn any_missing_required_field_is_reported(index in 0usize..REQUIRED_FIELDS.len()) {
            let field = REQUIRED_FIELDS[index];
            let mut document = valid_document();
            document.as_object_mut().unwrap().remove(field);
            prop_assert_eq!(
                schema_message(&document),
                format!("Manifest missing required field: {field}")
            );
        }

        #[test]
        fn digest_length_decides_entry_schema(digest in "[0-9a-zA-Z]{0,100}") {
            let mut document = valid_document();
            document["files"] = json!([{ "name": "firmware.bin", "sha256": digest.clone() }]);
            let result = validate_document(&document);
            if digest.len() == 64 {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(PipelineError::Schema(_))));
            }
        }
    }
}
