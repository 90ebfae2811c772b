//! Schema Registry
//!
//! Holds the composed JSON Schema of the current project format and turns a
//! migrated document into a typed [`ProjectDocument`].
//!
//! The schema is split across the files in `schemas/`. `project.schema.json`
//! is the root; every other `<name>.schema.json` is installed under
//! `definitions/<name>` so the root and its parts can refer to each other
//! with `{"$ref": "#/definitions/<name>"}`.

use include_dir::{include_dir, Dir};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ProjectError, Result, SchemaViolation, ViolationKind, VoiceAttribute};
use crate::schema::{AudioItem, ProjectDocument, TalkProject};

static SCHEMA_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

const ROOT_SCHEMA: &str = "project.schema.json";
const SCHEMA_SUFFIX: &str = ".schema.json";

/// Validator for the latest project shape
pub struct SchemaRegistry {
    /// Composed schema document
    schema: Value,
    /// Compiled validator
    compiled: JSONSchema,
}

impl SchemaRegistry {
    /// Compose and compile the embedded schemas
    pub fn new() -> Result<Self> {
        let schema = compose_schema()?;
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| ProjectError::Schema(e.to_string()))?;
        Ok(Self { schema, compiled })
    }

    /// The composed schema, with all sub-schemas under `definitions`
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Names of the installed sub-schemas
    pub fn definitions(&self) -> Vec<&str> {
        self.schema
            .get("definitions")
            .and_then(Value::as_object)
            .map(|defs| defs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Structural validation only, collecting every violation
    pub fn validate_structure(&self, document: &Value) -> Result<()> {
        if let Err(errors) = self.compiled.validate(document) {
            let violations: Vec<SchemaViolation> = errors
                .map(|error| {
                    let mut path = error.instance_path.to_string();
                    let kind = match &error.kind {
                        ValidationErrorKind::Required { property } => {
                            if let Some(name) = property.as_str() {
                                path = format!("{}/{}", path, name);
                            }
                            ViolationKind::MissingField
                        }
                        ValidationErrorKind::Type { .. } => ViolationKind::WrongType,
                        ValidationErrorKind::Enum { .. } => ViolationKind::WrongEnumValue,
                        _ => ViolationKind::Other,
                    };
                    SchemaViolation {
                        path,
                        kind,
                        message: error.to_string(),
                    }
                })
                .collect();
            return Err(ProjectError::SchemaValidation { violations });
        }
        Ok(())
    }

    /// Validate against the current schema and build the typed document
    ///
    /// Optional fields that are absent stay `None`; nothing is defaulted here.
    pub fn parse_and_validate(&self, document: &Value) -> Result<ProjectDocument> {
        self.validate_structure(document)?;
        ProjectDocument::deserialize_checked(document)
    }

    /// Cross-reference checks for the talk section
    pub fn validate_talk_project(&self, talk: &TalkProject) -> Result<()> {
        validate_talk_project(talk)
    }
}

impl ProjectDocument {
    fn deserialize_checked(document: &Value) -> Result<Self> {
        Self::deserialize(document).map_err(|e| {
            ProjectError::SchemaValidation {
                violations: vec![SchemaViolation {
                    path: String::new(),
                    kind: ViolationKind::Other,
                    message: e.to_string(),
                }],
            }
        })
    }
}

/// Check that every audio key resolves and every referenced item has a
/// complete voice
///
/// Each condition is checked across all keys before the next one, so a
/// dangling key is always reported ahead of an incomplete voice.
pub fn validate_talk_project(talk: &TalkProject) -> Result<()> {
    if let Some(key) = talk
        .audio_keys
        .iter()
        .find(|key| !talk.audio_items.contains_key(*key))
    {
        return Err(ProjectError::ReferentialIntegrity {
            audio_key: key.to_string(),
        });
    }

    let checks: [(VoiceAttribute, fn(&AudioItem) -> bool); 4] = [
        (VoiceAttribute::Voice, |item| item.voice.is_some()),
        (VoiceAttribute::EngineId, |item| {
            item.voice.as_ref().is_some_and(|v| v.engine_id.is_some())
        }),
        (VoiceAttribute::SpeakerId, |item| {
            item.voice.as_ref().is_some_and(|v| v.speaker_id.is_some())
        }),
        (VoiceAttribute::StyleId, |item| {
            item.voice.as_ref().is_some_and(|v| v.style_id.is_some())
        }),
    ];

    for (attribute, present) in checks {
        for (key, item) in talk.ordered_items() {
            if !present(item) {
                return Err(ProjectError::MissingVoiceAttribute {
                    audio_key: key.to_string(),
                    attribute,
                });
            }
        }
    }

    Ok(())
}

/// Build the root schema with every sub-schema installed under `definitions`
fn compose_schema() -> Result<Value> {
    let root_file = SCHEMA_DIR
        .get_file(ROOT_SCHEMA)
        .ok_or_else(|| ProjectError::Schema(format!("{} is not embedded", ROOT_SCHEMA)))?;
    let mut root: Value = serde_json::from_slice(root_file.contents())?;

    let mut definitions = Map::new();
    for file in SCHEMA_DIR.files() {
        let Some(name) = file.path().file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == ROOT_SCHEMA {
            continue;
        }
        let Some(stem) = name.strip_suffix(SCHEMA_SUFFIX) else {
            continue;
        };
        let sub_schema: Value = serde_json::from_slice(file.contents())?;
        definitions.insert(stem.to_string(), sub_schema);
    }

    match root.as_object_mut() {
        Some(object) => {
            object.insert("definitions".to_string(), Value::Object(definitions));
        }
        None => {
            return Err(ProjectError::Schema(format!("{} is not an object", ROOT_SCHEMA)));
        }
    }

    Ok(root)
}
