//! Song section migrations
//!
//! Files before 0.17.0 only hold talk data. From then on the document has a
//! `talk` and a `song` section, and tracks evolve from a plain list into a
//! map keyed by track id plus an explicit `trackOrder`.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::document::{expect_object, root_mut, song_mut, tracks_mut, Object};
use super::{MigrationContext, MigrationStep};
use crate::config::DefaultsConfig;
use crate::error::{ProjectError, Result};

/// Move talk data under `talk` and create a song section
///
/// The song section is written with the score layout of 0.17.0 and the
/// configured defaults, never with whatever a new score looks like today.
/// A document that already has both sections keeps them.
pub struct SplitTalkAndSong;

#[async_trait]
impl MigrationStep for SplitTalkAndSong {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        const STEP: &str = "split-talk-and-song";
        let root = root_mut(document, STEP)?;

        let hoisted: Vec<(String, Value)> = ["audioKeys", "audioItems"]
            .into_iter()
            .filter_map(|key| root.remove(key).map(|value| (key.to_string(), value)))
            .collect();
        if !hoisted.is_empty() || !root.contains_key("talk") {
            let talk = root
                .entry("talk")
                .or_insert_with(|| Value::Object(Object::new()));
            let talk = expect_object(talk, "\"talk\"", STEP)?;
            talk.extend(hoisted);
        } else {
            debug!(step = STEP, "talk section already present");
        }

        if !root.contains_key("song") {
            root.insert("song".to_string(), initial_song(ctx.defaults));
        }
        Ok(())
    }
}

fn initial_song(defaults: &DefaultsConfig) -> Value {
    json!({
        "tpqn": defaults.tpqn,
        "tempos": [{"position": 0, "bpm": defaults.bpm}],
        "timeSignatures": [{
            "measureNumber": 1,
            "beats": defaults.beats,
            "beatType": defaults.beat_type,
        }],
        "tracks": [{"keyRangeAdjustment": 0, "notes": []}],
    })
}

/// Tracks gain a volume range adjustment
pub struct TrackVolumeRange;

#[async_trait]
impl MigrationStep for TrackVolumeRange {
    async fn apply(&self, document: &mut Value, _ctx: &MigrationContext<'_>) -> Result<()> {
        for track in tracks_mut(document, "track-volume-range")? {
            track.entry("volumeRangeAdjustment").or_insert(json!(0));
        }
        Ok(())
    }
}

/// Tracks gain an (empty) pitch edit curve
pub struct TrackPitchEditData;

#[async_trait]
impl MigrationStep for TrackPitchEditData {
    async fn apply(&self, document: &mut Value, _ctx: &MigrationContext<'_>) -> Result<()> {
        for track in tracks_mut(document, "track-pitch-edit-data")? {
            track.entry("pitchEditData").or_insert(json!([]));
        }
        Ok(())
    }
}

/// `tracks: [...]` → `tracks: {id: ...}` plus `trackOrder`
pub struct KeyedTracks;

#[async_trait]
impl MigrationStep for KeyedTracks {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        key_tracks(document, ctx.defaults, "keyed-tracks")
    }
}

/// Convert a track list into a keyed map, leaving an existing map alone
///
/// Every track receives mixer defaults and a fresh random id. `trackOrder`
/// lists the ids in the order of the original list.
pub(crate) fn key_tracks(document: &mut Value, defaults: &DefaultsConfig, step: &'static str) -> Result<()> {
    let Some(song) = song_mut(document, step)? else {
        return Ok(());
    };
    let list = match song.get_mut("tracks") {
        Some(Value::Array(list)) => std::mem::take(list),
        Some(Value::Object(_)) => {
            debug!(step, "tracks already keyed");
            return Ok(());
        }
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            return Err(ProjectError::invariant(step, "\"song.tracks\" is neither a list nor a map"));
        }
    };

    let mut used = HashSet::new();
    let mut tracks = Object::new();
    let mut order = Vec::with_capacity(list.len());
    for mut track in list {
        let fields = expect_object(&mut track, "track", step)?;
        fields.insert("name".to_string(), json!(defaults.track_name));
        fields.insert("solo".to_string(), json!(false));
        fields.insert("mute".to_string(), json!(false));
        fields.insert("gain".to_string(), json!(1.0));
        fields.insert("pan".to_string(), json!(0.0));

        let id = unique_track_id(&mut used);
        order.push(Value::String(id.clone()));
        tracks.insert(id, track);
    }

    song.insert("tracks".to_string(), Value::Object(tracks));
    song.insert("trackOrder".to_string(), Value::Array(order));
    Ok(())
}

/// A random v4 id not yet in `used`
fn unique_track_id(used: &mut HashSet<String>) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if used.insert(id.clone()) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::mora::tests::Unreachable;

    async fn run<S: MigrationStep>(step: S, document: &mut Value) -> Result<()> {
        let defaults = DefaultsConfig::default();
        let ctx = MigrationContext {
            fetcher: &Unreachable,
            voices: &[],
            defaults: &defaults,
        };
        step.apply(document, &ctx).await
    }

    #[tokio::test]
    async fn test_split_moves_talk_data() {
        let mut doc = json!({
            "appVersion": "0.16.1",
            "audioKeys": ["a"],
            "audioItems": {"a": {"text": "hi"}}
        });
        run(SplitTalkAndSong, &mut doc).await.unwrap();

        assert_eq!(
            doc["talk"],
            json!({"audioKeys": ["a"], "audioItems": {"a": {"text": "hi"}}})
        );
        assert!(doc.get("audioKeys").is_none());
        assert!(doc.get("audioItems").is_none());
        assert_eq!(doc["song"]["tpqn"], json!(480));
        assert_eq!(doc["song"]["tempos"], json!([{"position": 0, "bpm": 120.0}]));
        assert_eq!(
            doc["song"]["timeSignatures"],
            json!([{"measureNumber": 1, "beats": 4, "beatType": 4}])
        );
        assert_eq!(doc["song"]["tracks"], json!([{"keyRangeAdjustment": 0, "notes": []}]));
        assert!(doc["song"]["tracks"][0].get("singer").is_none());
    }

    #[tokio::test]
    async fn test_split_without_talk_data() {
        let mut doc = json!({"appVersion": "0.16.0"});
        run(SplitTalkAndSong, &mut doc).await.unwrap();
        assert_eq!(doc["talk"], json!({}));
    }

    #[tokio::test]
    async fn test_split_keeps_existing_sections() {
        let migrated = json!({
            "appVersion": "0.16.0",
            "talk": {"audioKeys": ["a"], "audioItems": {"a": {"text": "hi"}}},
            "song": {"tpqn": 960, "tempos": [], "timeSignatures": [], "tracks": {"t1": {"notes": []}}}
        });
        let mut doc = migrated.clone();
        run(SplitTalkAndSong, &mut doc).await.unwrap();
        assert_eq!(doc, migrated);
    }

    #[tokio::test]
    async fn test_track_fields_kept_when_present() {
        let mut doc = json!({"song": {"tracks": {"t1": {
            "notes": [],
            "volumeRangeAdjustment": 3,
            "pitchEditData": [440.0]
        }}}});
        run(TrackVolumeRange, &mut doc).await.unwrap();
        run(TrackPitchEditData, &mut doc).await.unwrap();
        assert_eq!(doc["song"]["tracks"]["t1"]["volumeRangeAdjustment"], json!(3));
        assert_eq!(doc["song"]["tracks"]["t1"]["pitchEditData"], json!([440.0]));
    }

    #[tokio::test]
    async fn test_track_fields_added_in_list_form() {
        let mut doc = json!({"song": {"tracks": [{"notes": []}]}});
        run(TrackVolumeRange, &mut doc).await.unwrap();
        run(TrackPitchEditData, &mut doc).await.unwrap();
        assert_eq!(
            doc["song"]["tracks"][0],
            json!({"notes": [], "volumeRangeAdjustment": 0, "pitchEditData": []})
        );
    }

    #[tokio::test]
    async fn test_keyed_tracks() {
        let mut doc = json!({"song": {"tracks": [
            {"notes": [], "keyRangeAdjustment": 2},
            {"notes": [], "keyRangeAdjustment": 5}
        ]}});
        run(KeyedTracks, &mut doc).await.unwrap();

        let order: Vec<&str> = doc["song"]["trackOrder"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_str().unwrap())
            .collect();
        assert_eq!(order.len(), 2);
        assert_ne!(order[0], order[1]);
        for id in &order {
            assert!(Uuid::parse_str(id).is_ok());
        }

        let tracks = doc["song"]["tracks"].as_object().unwrap();
        assert_eq!(tracks.len(), 2);
        let first = &tracks[order[0]];
        assert_eq!(first["keyRangeAdjustment"], json!(2));
        assert_eq!(first["name"], json!("無名トラック"));
        assert_eq!(first["gain"], json!(1.0));
        assert_eq!(first["pan"], json!(0.0));
        assert_eq!(first["solo"], json!(false));
        assert_eq!(tracks[order[1]]["keyRangeAdjustment"], json!(5));
    }

    #[tokio::test]
    async fn test_keyed_tracks_leaves_map_alone() {
        let keyed = json!({"song": {
            "tracks": {"t1": {"name": "mine"}},
            "trackOrder": ["t1"]
        }});
        let mut doc = keyed.clone();
        run(KeyedTracks, &mut doc).await.unwrap();
        assert_eq!(doc, keyed);
    }

    #[test]
    fn test_unique_track_ids() {
        let mut used = HashSet::new();
        let ids: Vec<_> = (0..32).map(|_| unique_track_id(&mut used)).collect();
        assert_eq!(used.len(), ids.len());
    }
}
