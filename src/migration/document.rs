//! Runtime shape assertions over the untyped document
//!
//! Older project files are never given a Rust type. Every step reaches into
//! the JSON tree through these helpers, which fail with an invariant error
//! naming the step instead of panicking on an unexpected shape.

use serde_json::{Map, Value};

use crate::error::{ProjectError, Result};

pub(crate) type Object = Map<String, Value>;

/// The document root, which must be an object
pub(crate) fn root_mut<'a>(document: &'a mut Value, step: &'static str) -> Result<&'a mut Object> {
    document
        .as_object_mut()
        .ok_or_else(|| ProjectError::invariant(step, "project root is not an object"))
}

/// `value` as an object, naming `what` on failure
pub(crate) fn expect_object<'a>(value: &'a mut Value, what: &str, step: &'static str) -> Result<&'a mut Object> {
    value
        .as_object_mut()
        .ok_or_else(|| ProjectError::invariant(step, format!("{} is not an object", what)))
}

/// A child object; `None` if absent or null
pub(crate) fn child_object_mut<'a>(
    parent: &'a mut Object,
    key: &str,
    step: &'static str,
) -> Result<Option<&'a mut Object>> {
    match parent.get_mut(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(_) => Err(ProjectError::invariant(step, format!("\"{}\" is not an object", key))),
    }
}

/// A child array; `None` if absent or null
pub(crate) fn child_array_mut<'a>(
    parent: &'a mut Object,
    key: &str,
    step: &'static str,
) -> Result<Option<&'a mut Vec<Value>>> {
    match parent.get_mut(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(array)) => Ok(Some(array)),
        Some(_) => Err(ProjectError::invariant(step, format!("\"{}\" is not an array", key))),
    }
}

/// Whether `key` holds something other than null
pub(crate) fn is_defined(object: &Object, key: &str) -> bool {
    !matches!(object.get(key), None | Some(Value::Null))
}

/// Whether `key` holds a JavaScript-truthy value
pub(crate) fn is_truthy(object: &Object, key: &str) -> bool {
    match object.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// Talk items stored at the root, as before the talk/song split
pub(crate) fn root_audio_items<'a>(document: &'a mut Value, step: &'static str) -> Result<Option<&'a mut Object>> {
    let root = root_mut(document, step)?;
    child_object_mut(root, "audioItems", step)
}

/// Talk items under `talk.audioItems`
pub(crate) fn talk_audio_items<'a>(document: &'a mut Value, step: &'static str) -> Result<Option<&'a mut Object>> {
    let root = root_mut(document, step)?;
    match child_object_mut(root, "talk", step)? {
        Some(talk) => child_object_mut(talk, "audioItems", step),
        None => Ok(None),
    }
}

/// The `song` section
pub(crate) fn song_mut<'a>(document: &'a mut Value, step: &'static str) -> Result<Option<&'a mut Object>> {
    let root = root_mut(document, step)?;
    child_object_mut(root, "song", step)
}

/// Every track record, whether `song.tracks` is still a list or already a map
pub(crate) fn tracks_mut<'a>(document: &'a mut Value, step: &'static str) -> Result<Vec<&'a mut Object>> {
    let Some(song) = song_mut(document, step)? else {
        return Ok(Vec::new());
    };
    let tracks: Vec<&mut Value> = match song.get_mut("tracks") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(list)) => list.iter_mut().collect(),
        Some(Value::Object(map)) => map.values_mut().collect(),
        Some(_) => return Err(ProjectError::invariant(step, "\"song.tracks\" is neither a list nor a map")),
    };
    tracks
        .into_iter()
        .map(|track| expect_object(track, "track", step))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        let object = json!({"a": "", "b": "k", "c": 0, "d": 0.5, "e": null, "f": {}});
        let object = object.as_object().unwrap();
        assert!(!is_truthy(object, "a"));
        assert!(is_truthy(object, "b"));
        assert!(!is_truthy(object, "c"));
        assert!(is_truthy(object, "d"));
        assert!(!is_truthy(object, "e"));
        assert!(is_truthy(object, "f"));
        assert!(!is_truthy(object, "missing"));
        assert!(!is_defined(object, "e"));
        assert!(is_defined(object, "c"));
    }

    #[test]
    fn test_tracks_in_either_form() {
        let mut listed = json!({"song": {"tracks": [{"notes": []}, {"notes": []}]}});
        assert_eq!(tracks_mut(&mut listed, "test").unwrap().len(), 2);

        let mut keyed = json!({"song": {"tracks": {"t1": {"notes": []}}}});
        assert_eq!(tracks_mut(&mut keyed, "test").unwrap().len(), 1);

        let mut broken = json!({"song": {"tracks": 3}});
        assert!(tracks_mut(&mut broken, "test").is_err());
    }

    #[test]
    fn test_wrong_shape_names_step() {
        let mut doc = json!({"talk": []});
        let err = talk_audio_items(&mut doc, "pause-length-scale").unwrap_err();
        assert!(err.to_string().contains("pause-length-scale"));
    }
}
