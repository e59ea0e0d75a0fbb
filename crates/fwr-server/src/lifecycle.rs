//! Storage key layout for the artifact lifecycle
//!
//! The prefix of an object key encodes where the artifact is in its life:
//! `incoming/` → `processing/` → `processed/` | `errors/`. Only `incoming/`
//! keys carry the uploader's file name; every later key uses a generated
//! name so two uploads of the same file never collide.

use uuid::Uuid;

/// Only keys ending in this extension are treated as firmware artifacts.
pub const ARTIFACT_EXTENSION: &str = ".zip";

/// Name of the release descriptor at the archive root.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Incoming,
    Processing,
    Processed,
    Errors,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Incoming, Stage::Processing, Stage::Processed, Stage::Errors];

    pub fn prefix(self) -> &'static str {
        match self {
            Stage::Incoming => "incoming/",
            Stage::Processing => "processing/",
            Stage::Processed => "processed/",
            Stage::Errors => "errors/",
        }
    }

    pub fn key(self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }

    /// Which lifecycle prefix, if any, a key lives under
    pub fn of_key(key: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| key.starts_with(stage.prefix()))
    }

    /// Stages whose deletion should be reflected in the record table
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Processed | Stage::Errors)
    }
}

pub fn is_artifact(key: &str) -> bool {
    key.ends_with(ARTIFACT_EXTENSION)
}

/// Final path segment of an object key
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Fresh storage name for an accepted upload
pub fn generate_artifact_name() -> String {
    format!("{}{}", Uuid::new_v4(), ARTIFACT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_key() {
        assert_eq!(Stage::of_key("incoming/release.zip"), Some(Stage::Incoming));
        assert_eq!(Stage::of_key("processed/abc.zip"), Some(Stage::Processed));
        assert_eq!(Stage::of_key("errors/abc.zip"), Some(Stage::Errors));
        assert_eq!(Stage::of_key("archive/abc.zip"), None);
        assert_eq!(Stage::of_key("processedx/abc.zip"), None);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Processed.is_terminal());
        assert!(Stage::Errors.is_terminal());
        assert!(!Stage::Incoming.is_terminal());
        assert!(!Stage::Processing.is_terminal());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("incoming/team-a/release.zip"), "release.zip");
        assert_eq!(basename("release.zip"), "release.zip");
    }

    #[test]
    fn test_generated_names_are_unique_artifacts() {
        let a = generate_artifact_name();
        let b = generate_artifact_name();
        assert_ne!(a, b);
        assert!(is_artifact(&a));
        assert_eq!(Stage::Processing.key(&a), format!("processing/{a}"));
    }
}
