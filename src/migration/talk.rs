//! Talk item migrations
//!
//! Steps below 0.17.0 operate on `audioItems` at the document root; later
//! ones on `talk.audioItems`.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::document::{expect_object, is_defined, root_audio_items, talk_audio_items, Object};
use super::{MigrationContext, MigrationStep};
use crate::error::{ProjectError, Result};

/// `charactorIndex` → `characterIndex`
pub struct RenameCharacterIndex;

#[async_trait]
impl MigrationStep for RenameCharacterIndex {
    async fn apply(&self, document: &mut Value, _ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "rename-character-index";
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            if let Some(index) = item.remove("charactorIndex") {
                item.insert("characterIndex".to_string(), index);
            }
        }
        Ok(())
    }
}

/// Queries gain volume, pause and phoneme padding parameters
pub struct QueryScaleDefaults;

#[async_trait]
impl MigrationStep for QueryScaleDefaults {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "query-scale-defaults";
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            let Some(query) = query_mut(item, key, STEP)? else {
                continue;
            };
            query.insert("volumeScale".to_string(), json!(1.0));
            query.insert("pauseLengthScale".to_string(), json!(1.0));
            query.insert("prePhonemeLength".to_string(), json!(0.1));
            query.insert("postPhonemeLength".to_string(), json!(0.1));
            query.insert(
                "outputSamplingRate".to_string(),
                json!(ctx.defaults.output_sampling_rate),
            );
        }
        Ok(())
    }
}

/// `characterIndex` → `speaker`, for the two characters that existed then
pub struct CharacterIndexToSpeaker;

#[async_trait]
impl MigrationStep for CharacterIndexToSpeaker {
    async fn apply(&self, document: &mut Value, _ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "character-index-to-speaker";
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            if !is_defined(item, "characterIndex") {
                continue;
            }
            if let Some(index) = item.remove("characterIndex").and_then(|v| v.as_i64()) {
                // 0: Shikoku Metan, 1: Zundamon; both kept their style numbers
                if index == 0 || index == 1 {
                    item.insert("speaker".to_string(), json!(index));
                }
            }
        }
        Ok(())
    }
}

/// `speaker` → `styleId`
pub struct SpeakerToStyleId;

#[async_trait]
impl MigrationStep for SpeakerToStyleId {
    async fn apply(&self, document: &mut Value, _ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "speaker-to-style-id";
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            if !is_defined(item, "speaker") {
                continue;
            }
            if let Some(speaker) = item.remove("speaker") {
                item.insert("styleId".to_string(), speaker);
            }
        }
        Ok(())
    }
}

/// Items without an engine belong to the original engine
pub struct DefaultEngineId;

#[async_trait]
impl MigrationStep for DefaultEngineId {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "default-engine-id";
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            if !is_defined(item, "engineId") {
                item.insert("engineId".to_string(), json!(ctx.defaults.legacy_engine_id));
            }
        }
        Ok(())
    }
}

/// `(engineId, styleId)` → `voice`, looked up in the voice catalog
pub struct ResolveVoice;

#[async_trait]
impl MigrationStep for ResolveVoice {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "resolve-voice";
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            if is_defined(item, "voice") {
                continue;
            }
            let engine_id = item.get("engineId").and_then(Value::as_str);
            let style_id = item.get("styleId").and_then(Value::as_i64);
            let voice = ctx.voices.iter().find(|voice| {
                Some(voice.engine_id.as_str()) == engine_id && Some(voice.style_id.0) == style_id
            });
            let Some(voice) = voice else {
                return Err(ProjectError::invariant(
                    STEP,
                    format!(
                        "no known voice for audio item {} (engineId {}, styleId {})",
                        key,
                        item.get("engineId").unwrap_or(&Value::Null),
                        item.get("styleId").unwrap_or(&Value::Null)
                    ),
                ));
            };
            item.insert("voice".to_string(), serde_json::to_value(voice)?);
            item.remove("engineId");
            item.remove("styleId");
        }
        Ok(())
    }
}

/// Queries gain the in-sentence pause scale
pub struct PauseLengthScale;

#[async_trait]
impl MigrationStep for PauseLengthScale {
    async fn apply(&self, document: &mut Value, _ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "pause-length-scale";
        let Some(items) = talk_audio_items(document, STEP)? else {
            return Ok(());
        };
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            if let Some(query) = query_mut(item, key, STEP)? {
                query.insert("pauseLengthScale".to_string(), json!(1.0));
            }
        }
        Ok(())
    }
}

/// The item's query, if it has one
pub(crate) fn query_mut<'a>(item: &'a mut Object, key: &str, step: &'static str) -> Result<Option<&'a mut Object>> {
    match item.get_mut("query") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(query)) => Ok(Some(query)),
        Some(_) => Err(ProjectError::invariant(
            step,
            format!("query of audio item {} is not an object", key),
        )),
    }
}
