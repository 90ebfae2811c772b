//! Phoneme timing recomputation for files written before 0.5.0
//!
//! Those files carry no vowel or consonant lengths. The step zeroes them,
//! asks the engine for fresh timings and copies only the length fields back
//! into the stored accent phrases, pairing phrases and moras by position.
//! Everything else in the stored phrases is kept as written.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::document::{child_array_mut, expect_object, is_truthy, root_audio_items, Object};
use super::talk::query_mut;
use super::{MigrationContext, MigrationStep};
use crate::error::{ProjectError, Result};
use crate::schema::{AccentPhrase, EngineId, StyleId};

const STEP: &str = "recompute-mora-timing";

pub struct RecomputeMoraTiming;

#[async_trait]
impl MigrationStep for RecomputeMoraTiming {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        let Some(items) = root_audio_items(document, STEP)? else {
            return Ok(());
        };
        let engine_id = EngineId::new(ctx.defaults.legacy_engine_id.clone());

        // serde_json maps iterate in key order, so fetches happen in a stable order
        for (key, item) in items.iter_mut() {
            let item = expect_object(item, key, STEP)?;
            // Before 0.7 the style is still stored as characterIndex
            let character_index = item.get("characterIndex").cloned();
            let Some(query) = query_mut(item, key, STEP)? else {
                continue;
            };

            query.insert("outputStereo".to_string(), json!(false));
            let Some(stored) = child_array_mut(query, "accentPhrases", STEP)? else {
                return Err(ProjectError::invariant(
                    STEP,
                    format!("query of audio item {} has no accentPhrases", key),
                ));
            };
            reset_lengths(stored, key)?;

            let style_id = match character_index {
                None | Some(Value::Null) => {
                    return Err(ProjectError::invariant(
                        STEP,
                        format!("characterIndex of audio item {} is undefined", key),
                    ));
                }
                Some(value) => value.as_i64().map(StyleId).ok_or_else(|| {
                    ProjectError::invariant(
                        STEP,
                        format!("characterIndex of audio item {} is not an integer: {}", key, value),
                    )
                })?,
            };

            let phrases: Vec<AccentPhrase> = serde_json::from_value(Value::Array(stored.clone()))
                .map_err(|e| {
                    ProjectError::invariant(
                        STEP,
                        format!("accent phrases of audio item {} are malformed: {}", key, e),
                    )
                })?;

            debug!(audio_key = %key, style_id = %style_id, phrases = phrases.len(), "fetching mora data");
            let fetched = ctx
                .fetcher
                .fetch_mora_data(&phrases, &engine_id, style_id)
                .await
                .map_err(|source| ProjectError::Enrichment {
                    audio_key: key.clone(),
                    source,
                })?;

            merge_lengths(stored, &fetched, key)?;
        }
        Ok(())
    }
}

/// Zero every length so phrases deserialize before the engine fills them in
fn reset_lengths(stored: &mut [Value], key: &str) -> Result<()> {
    for phrase in stored.iter_mut() {
        let phrase = expect_object(phrase, &format!("accent phrase of audio item {}", key), STEP)?;
        if is_truthy(phrase, "pauseMora") {
            if let Some(pause) = phrase.get_mut("pauseMora").and_then(Value::as_object_mut) {
                pause.insert("vowelLength".to_string(), json!(0.0));
            }
        }
        let Some(moras) = child_array_mut(phrase, "moras", STEP)? else {
            continue;
        };
        for mora in moras.iter_mut() {
            let mora = expect_object(mora, &format!("mora of audio item {}", key), STEP)?;
            if is_truthy(mora, "consonant") {
                mora.insert("consonantLength".to_string(), json!(0.0));
            }
            mora.insert("vowelLength".to_string(), json!(0.0));
        }
    }
    Ok(())
}

/// Copy timing fields from `fetched` into `stored`, phrase by phrase and
/// mora by mora
pub(crate) fn merge_lengths(stored: &mut [Value], fetched: &[AccentPhrase], key: &str) -> Result<()> {
    let mismatch = |message: String| ProjectError::EnrichmentMismatch {
        audio_key: key.to_string(),
        message,
    };

    if stored.len() != fetched.len() {
        return Err(mismatch(format!(
            "expected {} accent phrases, engine returned {}",
            stored.len(),
            fetched.len()
        )));
    }

    for (i, (old, new)) in stored.iter_mut().zip(fetched).enumerate() {
        let old = old
            .as_object_mut()
            .ok_or_else(|| mismatch(format!("accent phrase {} is not an object", i)))?;

        if let Some(pause) = &new.pause_mora {
            let old_pause = old
                .get_mut("pauseMora")
                .and_then(Value::as_object_mut)
                .ok_or_else(|| mismatch(format!("accent phrase {} has no pause mora to update", i)))?;
            old_pause.insert("vowelLength".to_string(), json!(pause.vowel_length));
        }

        let old_moras = old
            .get_mut("moras")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| mismatch(format!("accent phrase {} has no moras", i)))?;
        if old_moras.len() != new.moras.len() {
            return Err(mismatch(format!(
                "accent phrase {} has {} moras, engine returned {}",
                i,
                old_moras.len(),
                new.moras.len()
            )));
        }

        for (j, (old_mora, mora)) in old_moras.iter_mut().zip(&new.moras).enumerate() {
            let old_mora: &mut Object = old_mora
                .as_object_mut()
                .ok_or_else(|| mismatch(format!("mora {} of accent phrase {} is not an object", j, i)))?;
            if mora.consonant.is_some() {
                match mora.consonant_length {
                    Some(length) => {
                        old_mora.insert("consonantLength".to_string(), json!(length));
                    }
                    None => {
                        old_mora.remove("consonantLength");
                    }
                }
            }
            old_mora.insert("vowelLength".to_string(), json!(mora.vowel_length));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::migration::MoraDataFetcher;
    use std::sync::Mutex;

    /// Fetcher for tests that must never reach the engine
    pub(crate) struct Unreachable;

    #[async_trait]
    impl MoraDataFetcher for Unreachable {
        async fn fetch_mora_data(
            &self,
            _accent_phrases: &[AccentPhrase],
            _engine_id: &EngineId,
            _style_id: StyleId,
        ) -> anyhow::Result<Vec<AccentPhrase>> {
            anyhow::bail!("mora data fetcher should not be called")
        }
    }

    /// Answers with fixed lengths and records every call
    #[derive(Default)]
    pub(crate) struct FixedLengths {
        pub calls: Mutex<Vec<(EngineId, StyleId, usize)>>,
    }

    #[async_trait]
    impl MoraDataFetcher for FixedLengths {
        async fn fetch_mora_data(
            &self,
            accent_phrases: &[AccentPhrase],
            engine_id: &EngineId,
            style_id: StyleId,
        ) -> anyhow::Result<Vec<AccentPhrase>> {
            self.calls
                .lock()
                .unwrap()
                .push((engine_id.clone(), style_id, accent_phrases.len()));
            Ok(accent_phrases
                .iter()
                .map(|phrase| {
                    let mut phrase = phrase.clone();
                    for mora in &mut phrase.moras {
                        mora.vowel_length = 0.1;
                        if mora.consonant.is_some() {
                            mora.consonant_length = Some(0.05);
                        }
                        // Round trip loses pitch
                        mora.pitch = 0.0;
                    }
                    if let Some(pause) = &mut phrase.pause_mora {
                        pause.vowel_length = 0.3;
                    }
                    phrase
                })
                .collect())
        }
    }

    /// Vowel length handed out for a style
    fn style_length(style_id: StyleId) -> f64 {
        0.1 * (style_id.0 + 1) as f64
    }

    /// Answers with style-dependent lengths and records the call order
    #[derive(Default)]
    struct PerStyleLengths {
        styles: Mutex<Vec<StyleId>>,
    }

    #[async_trait]
    impl MoraDataFetcher for PerStyleLengths {
        async fn fetch_mora_data(
            &self,
            accent_phrases: &[AccentPhrase],
            _engine_id: &EngineId,
            style_id: StyleId,
        ) -> anyhow::Result<Vec<AccentPhrase>> {
            self.styles.lock().unwrap().push(style_id);
            let mut phrases = accent_phrases.to_vec();
            for mora in phrases.iter_mut().flat_map(|phrase| phrase.moras.iter_mut()) {
                mora.vowel_length = style_length(style_id);
            }
            Ok(phrases)
        }
    }

    fn legacy_document() -> Value {
        json!({"audioItems": {
            "a": {
                "characterIndex": 1,
                "query": {"accentPhrases": [
                    {
                        "accent": 1,
                        "moras": [
                            {"text": "コ", "consonant": "k", "vowel": "o", "pitch": 5.5},
                            {"text": "ン", "vowel": "N", "pitch": 5.2}
                        ],
                        "pauseMora": {"text": "、", "vowel": "pau", "pitch": 0.0}
                    }
                ]}
            },
            "b": {"characterIndex": 0}
        }})
    }

    #[tokio::test]
    async fn test_lengths_merged_positionally() {
        let fetcher = FixedLengths::default();
        let defaults = DefaultsConfig::default();
        let ctx = MigrationContext {
            fetcher: &fetcher,
            voices: &[],
            defaults: &defaults,
        };
        let mut doc = legacy_document();
        RecomputeMoraTiming.apply(&mut doc, &ctx).await.unwrap();

        let query = &doc["audioItems"]["a"]["query"];
        assert_eq!(query["outputStereo"], json!(false));
        let moras = &query["accentPhrases"][0]["moras"];
        assert_eq!(moras[0]["vowelLength"], json!(0.1));
        assert_eq!(moras[0]["consonantLength"], json!(0.05));
        assert_eq!(moras[1]["vowelLength"], json!(0.1));
        assert!(moras[1].get("consonantLength").is_none());
        // Stored pitch survives; only lengths are copied back
        assert_eq!(moras[0]["pitch"], json!(5.5));
        assert_eq!(query["accentPhrases"][0]["pauseMora"]["vowelLength"], json!(0.3));

        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_str(), defaults.legacy_engine_id);
        assert_eq!(calls[0].1, StyleId(1));
        assert!(doc["audioItems"]["b"].get("query").is_none());
    }

    #[tokio::test]
    async fn test_each_item_gets_lengths_of_its_own_style() {
        let fetcher = PerStyleLengths::default();
        let defaults = DefaultsConfig::default();
        let ctx = MigrationContext {
            fetcher: &fetcher,
            voices: &[],
            defaults: &defaults,
        };
        let phrase = json!([{"accent": 1, "moras": [
            {"text": "ア", "vowel": "a", "pitch": 5.0},
            {"text": "カ", "consonant": "k", "vowel": "a", "pitch": 5.1}
        ]}]);
        let mut doc = json!({"audioItems": {
            "zeta": {"characterIndex": 0, "query": {"accentPhrases": phrase}},
            "alpha": {"characterIndex": 2, "query": {"accentPhrases": phrase}}
        }});
        RecomputeMoraTiming.apply(&mut doc, &ctx).await.unwrap();

        assert_eq!(*fetcher.styles.lock().unwrap(), vec![StyleId(2), StyleId(0)]);
        for (key, style_id) in [("alpha", StyleId(2)), ("zeta", StyleId(0))] {
            let moras = &doc["audioItems"][key]["query"]["accentPhrases"][0]["moras"];
            assert_eq!(moras[0]["vowelLength"], json!(style_length(style_id)));
            assert_eq!(moras[1]["vowelLength"], json!(style_length(style_id)));
        }
    }

    #[tokio::test]
    async fn test_missing_character_index_is_invariant_violation() {
        let defaults = DefaultsConfig::default();
        let ctx = MigrationContext {
            fetcher: &Unreachable,
            voices: &[],
            defaults: &defaults,
        };
        let mut doc = legacy_document();
        doc["audioItems"]["a"].as_object_mut().unwrap().remove("characterIndex");

        let err = RecomputeMoraTiming.apply(&mut doc, &ctx).await.unwrap_err();
        assert!(matches!(err, ProjectError::InvariantViolation { step: STEP, .. }));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let defaults = DefaultsConfig::default();
        let ctx = MigrationContext {
            fetcher: &Unreachable,
            voices: &[],
            defaults: &defaults,
        };
        let mut doc = legacy_document();
        match RecomputeMoraTiming.apply(&mut doc, &ctx).await {
            Err(ProjectError::Enrichment { audio_key, .. }) => assert_eq!(audio_key, "a"),
            other => panic!("Expected Enrichment, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_phrase_count() {
        let mut stored = vec![json!({"accent": 1, "moras": []})];
        let err = merge_lengths(&mut stored, &[], "a").unwrap_err();
        assert!(matches!(err, ProjectError::EnrichmentMismatch { .. }));
    }
}
