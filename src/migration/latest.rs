//! Backfill of the current document shape
//!
//! Runs for every file older than 1.1.0-dev and for every file saved by a
//! development build. Unlike the historical steps it only fills in what is
//! missing, so running it on a file that is already current changes nothing.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::document::{child_object_mut, expect_object, root_mut, talk_audio_items};
use super::song::key_tracks;
use super::talk::query_mut;
use super::{MigrationContext, MigrationStep};
use crate::error::Result;

const STEP: &str = "current-shape-backfill";

pub struct CurrentShapeBackfill;

#[async_trait]
impl MigrationStep for CurrentShapeBackfill {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        key_tracks(document, ctx.defaults, STEP)?;

        if let Some(items) = talk_audio_items(document, STEP)? {
            for (key, item) in items.iter_mut() {
                let item = expect_object(item, key, STEP)?;
                if let Some(query) = query_mut(item, key, STEP)? {
                    query.entry("pauseLengthScale").or_insert(json!(1.0));
                }
            }
        }

        let root = root_mut(document, STEP)?;
        if let Some(presets) = child_object_mut(root, "presets", STEP)? {
            if let Some(items) = child_object_mut(presets, "items", STEP)? {
                for (key, preset) in items.iter_mut() {
                    let preset = expect_object(preset, key, STEP)?;
                    preset.entry("pauseLengthScale").or_insert(json!(1.0));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::migration::mora::tests::Unreachable;

    async fn run(document: &mut Value) {
        let defaults = DefaultsConfig::default();
        let ctx = MigrationContext {
            fetcher: &Unreachable,
            voices: &[],
            defaults: &defaults,
        };
        CurrentShapeBackfill.apply(document, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_fills_only_missing_values() {
        let mut doc = json!({
            "talk": {"audioItems": {
                "a": {"query": {"speedScale": 1.0}},
                "b": {"query": {"pauseLengthScale": 1.5}},
                "c": {"text": "no query"}
            }},
            "song": {"tracks": {"t": {"name": "kept"}}, "trackOrder": ["t"]},
            "presets": {"items": {
                "p1": {"name": "old"},
                "p2": {"name": "new", "pauseLengthScale": 0.5}
            }}
        });
        run(&mut doc).await;

        let items = &doc["talk"]["audioItems"];
        assert_eq!(items["a"]["query"]["pauseLengthScale"], json!(1.0));
        assert_eq!(items["b"]["query"]["pauseLengthScale"], json!(1.5));
        assert_eq!(items["c"], json!({"text": "no query"}));
        assert_eq!(doc["presets"]["items"]["p1"]["pauseLengthScale"], json!(1.0));
        assert_eq!(doc["presets"]["items"]["p2"]["pauseLengthScale"], json!(0.5));
        assert_eq!(doc["song"]["trackOrder"], json!(["t"]));
    }

    #[tokio::test]
    async fn test_converts_track_list() {
        let mut doc = json!({"song": {"tracks": [{"notes": []}]}});
        run(&mut doc).await;
        let order = doc["song"]["trackOrder"].as_array().unwrap();
        assert_eq!(order.len(), 1);
        let id = order[0].as_str().unwrap();
        assert_eq!(doc["song"]["tracks"][id]["mute"], json!(false));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let mut doc = json!({
            "talk": {"audioItems": {"a": {"query": {}}}},
            "song": {"tracks": [{"notes": []}]},
            "presets": {"items": {"p": {"name": "p"}}}
        });
        run(&mut doc).await;
        let once = doc.clone();
        run(&mut doc).await;
        assert_eq!(doc, once);
    }
}
