//! Error types for project loading and migration

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for project operations
pub type Result<T> = std::result::Result<T, ProjectError>;

/// Project migration errors
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Project file format error: {message}")]
    ProjectFileFormat { message: String },

    #[error("Project does not match the current schema: {}", summarize(.violations))]
    SchemaValidation { violations: Vec<SchemaViolation> },

    #[error("Every audioKey in audioKeys should be a key of audioItems (missing {audio_key})")]
    ReferentialIntegrity { audio_key: String },

    #[error("Audio item {audio_key} is missing the \"{attribute}\" voice attribute")]
    MissingVoiceAttribute {
        audio_key: String,
        attribute: VoiceAttribute,
    },

    #[error("Migration step {step} failed: {message}")]
    InvariantViolation { step: &'static str, message: String },

    #[error("Fetching mora data for audio item {audio_key} failed: {source}")]
    Enrichment {
        audio_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Fetched mora data for audio item {audio_key} does not match: {message}")]
    EnrichmentMismatch { audio_key: String, message: String },

    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    #[error("Embedded schema is invalid: {0}")]
    Schema(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ProjectError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::ProjectFileFormat {
            message: message.into(),
        }
    }

    pub(crate) fn invariant(step: &'static str, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            step,
            message: message.into(),
        }
    }
}

/// Which part of a voice reference is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceAttribute {
    Voice,
    EngineId,
    SpeakerId,
    StyleId,
}

impl VoiceAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceAttribute::Voice => "voice",
            VoiceAttribute::EngineId => "engineId",
            VoiceAttribute::SpeakerId => "speakerId",
            VoiceAttribute::StyleId => "styleId",
        }
    }
}

impl fmt::Display for VoiceAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a structural schema failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    MissingField,
    WrongType,
    WrongEnumValue,
    Other,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::MissingField => "missing-field",
            ViolationKind::WrongType => "wrong-type",
            ViolationKind::WrongEnumValue => "wrong-enum-value",
            ViolationKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A single structural schema failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending field (e.g. "/talk/audioItems/a1/query")
    pub path: String,
    pub kind: ViolationKind,
    /// Human-readable description
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{} at {}: {}", self.kind, path, self.message)
    }
}

fn summarize(violations: &[SchemaViolation]) -> String {
    match violations {
        [] => "no violations reported".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}
