//! Typed shape of the current project format
//!
//! These types describe the latest schema only. Older shapes exist only as
//! untyped JSON inside the migration pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Key of a talk item in `talk.audioItems`
    AudioKey
);
string_id!(
    /// Key of a track in `song.tracks`
    TrackId
);
string_id!(
    /// Key of a preset in `presets.items`
    PresetKey
);
string_id!(EngineId);
string_id!(SpeakerId);
string_id!(NoteId);

/// Style of a speaker, numbered by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(pub i64);

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root of a project file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    /// Version of the application that wrote the file
    pub app_version: String,
    pub talk: TalkProject,
    pub song: SongProject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presets: Option<Presets>,
}

/// Talk (text-to-speech) section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkProject {
    /// Display order of the items
    pub audio_keys: Vec<AudioKey>,
    pub audio_items: BTreeMap<AudioKey, AudioItem>,
}

impl TalkProject {
    /// Items in display order, skipping keys without an item
    pub fn ordered_items(&self) -> impl Iterator<Item = (&AudioKey, &AudioItem)> + '_ {
        self.audio_keys
            .iter()
            .filter_map(|key| self.audio_items.get_key_value(key))
    }
}

/// One synthesised sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Completeness is checked by the talk validation, not the schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<PartialVoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<AudioQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_key: Option<PresetKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morphing_info: Option<MorphingInfo>,
}

/// Voice reference as stored on an audio item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<EngineId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<SpeakerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<StyleId>,
}

impl PartialVoice {
    /// The full identity, if every attribute is present
    pub fn complete(&self) -> Option<Voice> {
        Some(Voice {
            engine_id: self.engine_id.clone()?,
            speaker_id: self.speaker_id.clone()?,
            style_id: self.style_id?,
        })
    }
}

/// A fully specified voice identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub engine_id: EngineId,
    pub speaker_id: SpeakerId,
    pub style_id: StyleId,
}

impl From<Voice> for PartialVoice {
    fn from(voice: Voice) -> Self {
        Self {
            engine_id: Some(voice.engine_id),
            speaker_id: Some(voice.speaker_id),
            style_id: Some(voice.style_id),
        }
    }
}

/// Synthesis parameters of an audio item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioQuery {
    pub accent_phrases: Vec<AccentPhrase>,
    pub speed_scale: f64,
    pub pitch_scale: f64,
    pub intonation_scale: f64,
    pub volume_scale: f64,
    pub pause_length_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
    pub output_sampling_rate: OutputSamplingRate,
    pub output_stereo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kana: Option<String>,
}

/// Either a fixed rate in Hz or the literal `"engineDefault"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSamplingRate {
    Hz(u32),
    Named(NamedSamplingRate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamedSamplingRate {
    #[serde(rename = "engineDefault")]
    EngineDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_mora: Option<Mora>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_interrogative: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mora {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant_length: Option<f64>,
    pub vowel: String,
    pub vowel_length: f64,
    pub pitch: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphingInfo {
    pub rate: f64,
    pub target_engine_id: EngineId,
    pub target_speaker_id: SpeakerId,
    pub target_style_id: StyleId,
}

/// Song (singing synthesis) section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongProject {
    /// Ticks per quarter note
    pub tpqn: u32,
    pub tempos: Vec<Tempo>,
    pub time_signatures: Vec<TimeSignature>,
    pub tracks: BTreeMap<TrackId, Track>,
    pub track_order: Vec<TrackId>,
}

impl SongProject {
    /// Tracks in arrangement order
    pub fn ordered_tracks(&self) -> impl Iterator<Item = (&TrackId, &Track)> + '_ {
        self.track_order
            .iter()
            .filter_map(|id| self.tracks.get_key_value(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tempo {
    pub position: i64,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignature {
    pub measure_number: u32,
    pub beats: u32,
    pub beat_type: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singer: Option<Singer>,
    pub key_range_adjustment: i64,
    pub volume_range_adjustment: i64,
    pub notes: Vec<Note>,
    pub pitch_edit_data: Vec<f64>,
    pub solo: bool,
    pub mute: bool,
    pub gain: f64,
    pub pan: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Singer {
    pub engine_id: EngineId,
    pub style_id: StyleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub position: i64,
    pub duration: i64,
    pub note_number: i64,
    pub lyric: String,
}

/// Saved parameter presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presets {
    pub items: BTreeMap<PresetKey, Preset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub name: String,
    pub speed_scale: f64,
    pub pitch_scale: f64,
    pub intonation_scale: f64,
    pub volume_scale: f64,
    pub pause_length_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morphing_info: Option<MorphingInfo>,
}
