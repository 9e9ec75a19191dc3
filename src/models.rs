//! Payload shapes for structured phases and the asset operations on them.
//!
//! Structured phases (images, videos, tones, audio, film) store JSON. In
//! phase content the payload is wrapped as `{"<data_key>": payload}`; in the
//! confirmation bundle it is stored bare.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::phase::{DataKey, Phase};

/// Candidate images for one character or one first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSet {
    pub index: usize,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub index: usize,
    #[serde(default)]
    pub content_generation_task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub index: usize,
    #[serde(default)]
    pub line: String,
    #[serde(default)]
    pub tone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audio {
    pub index: usize,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Film {
    #[serde(default)]
    pub url: String,
}

trait Indexed {
    fn index(&self) -> usize;
}

macro_rules! indexed {
    ($($ty:ty),*) => {
        $(impl Indexed for $ty {
            fn index(&self) -> usize {
                self.index
            }
        })*
    };
}

indexed!(ImageSet, Video, Tone, Audio);

/// Wrap a bare payload under its data key.
pub fn wrap(key: DataKey, payload: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.as_str().to_string(), payload);
    Value::Object(map)
}

/// Strip the `{"<data_key>": ...}` wrapper when present.
pub fn unwrap(key: DataKey, value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(key.as_str()) => {
            map.remove(key.as_str()).unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Parse user- or generator-supplied JSON for a structured phase and check its shape.
pub fn parse_payload(phase: Phase, text: &str) -> Result<Value, ValidationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|source| ValidationError::MalformedPayload { phase, source })?;
    let payload = unwrap(phase.data_key(), value);
    check_shape(phase, &payload)?;
    Ok(payload)
}

fn check_shape(phase: Phase, payload: &Value) -> Result<(), ValidationError> {
    fn probe<T: DeserializeOwned>(phase: Phase, payload: &Value) -> Result<(), ValidationError> {
        serde_json::from_value::<T>(payload.clone())
            .map(|_| ())
            .map_err(|source| ValidationError::MalformedPayload { phase, source })
    }
    match phase.data_key() {
        DataKey::RoleImages | DataKey::FirstFrameImages => probe::<Vec<ImageSet>>(phase, payload),
        DataKey::Videos => probe::<Vec<Video>>(phase, payload),
        DataKey::Tones => probe::<Vec<Tone>>(phase, payload),
        DataKey::Audios => probe::<Vec<Audio>>(phase, payload),
        DataKey::Film => probe::<Film>(phase, payload),
        _ => Ok(()),
    }
}

/// Bundle value derived from a phase body.
pub fn bundle_value(phase: Phase, body: &str) -> Result<Value, ValidationError> {
    if phase.is_structured() {
        parse_payload(phase, body)
    } else {
        Ok(Value::String(body.to_string()))
    }
}

/// Phase body for a bundle value; inverse of [`bundle_value`].
pub fn body_for(phase: Phase, payload: &Value) -> Result<String, serde_json::Error> {
    match payload {
        Value::String(text) if !phase.is_structured() => Ok(text.clone()),
        _ if phase.is_structured() => {
            serde_json::to_string(&wrap(phase.data_key(), payload.clone()))
        }
        other => Ok(other.to_string()),
    }
}

fn map_items<T, F>(
    phase: Phase,
    payload: &Value,
    only_index: Option<usize>,
    mut f: F,
) -> Result<Value, ValidationError>
where
    T: Serialize + DeserializeOwned + Indexed,
    F: FnMut(&mut T),
{
    let mut items: Vec<T> = serde_json::from_value(payload.clone())
        .map_err(|source| ValidationError::MalformedPayload { phase, source })?;
    let mut touched = false;
    for item in items
        .iter_mut()
        .filter(|item| only_index.is_none_or(|index| item.index() == index))
    {
        f(item);
        touched = true;
    }
    match only_index {
        Some(index) if !touched => Err(ValidationError::IndexOutOfRange { phase, index }),
        _ => serde_json::to_value(items)
            .map_err(|source| ValidationError::MalformedPayload { phase, source }),
    }
}

/// Drop generated media references so a regeneration refills them.
///
/// With `only_index` set, only that item is cleared. Text phases pass through.
pub fn clear_assets(
    phase: Phase,
    payload: &Value,
    only_index: Option<usize>,
) -> Result<Value, ValidationError> {
    match phase.data_key() {
        DataKey::RoleImages | DataKey::FirstFrameImages => {
            map_items(phase, payload, only_index, |item: &mut ImageSet| {
                item.images.clear()
            })
        }
        DataKey::Videos => map_items(phase, payload, only_index, |item: &mut Video| {
            item.content_generation_task_id.clear();
            item.url = None;
        }),
        DataKey::Audios => map_items(phase, payload, only_index, |item: &mut Audio| {
            item.url.clear()
        }),
        DataKey::Film => {
            let mut film: Film = serde_json::from_value(payload.clone())
                .map_err(|source| ValidationError::MalformedPayload { phase, source })?;
            film.url.clear();
            serde_json::to_value(film)
                .map_err(|source| ValidationError::MalformedPayload { phase, source })
        }
        _ => Ok(payload.clone()),
    }
}

/// Pin `url` as the chosen asset of item `index`.
pub fn select_asset(
    phase: Phase,
    payload: &Value,
    index: usize,
    url: &str,
) -> Result<Value, ValidationError> {
    let only = Some(index);
    match phase.data_key() {
        DataKey::RoleImages | DataKey::FirstFrameImages => {
            map_items(phase, payload, only, |item: &mut ImageSet| {
                item.images = vec![url.to_string()]
            })
        }
        DataKey::Videos => map_items(phase, payload, only, |item: &mut Video| {
            item.url = Some(url.to_string())
        }),
        DataKey::Audios => map_items(phase, payload, only, |item: &mut Audio| {
            item.url = url.to_string()
        }),
        _ => Err(ValidationError::Unsupported {
            phase,
            operation: "candidate selection",
        }),
    }
}

/// Replace the spoken line of tone `index`.
pub fn edit_tone_line(payload: &Value, index: usize, line: &str) -> Result<Value, ValidationError> {
    map_items(Phase::Tone, payload, Some(index), |item: &mut Tone| {
        item.line = line.to_string()
    })
}

/// Item indices present in a list payload.
pub fn item_indices(phase: Phase, payload: &Value) -> Vec<usize> {
    payload
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("index").and_then(Value::as_u64))
                .map(|i| i as usize)
                .collect()
        })
        .filter(|_| phase.is_structured())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_payload_accepts_wrapped_and_bare() {
        let wrapped = r#"{"tones":[{"index":0,"line":"hi","tone":"calm"}]}"#;
        let bare = r#"[{"index":0,"line":"hi","tone":"calm"}]"#;
        assert_eq!(
            parse_payload(Phase::Tone, wrapped).unwrap(),
            parse_payload(Phase::Tone, bare).unwrap()
        );
    }

    #[test]
    fn test_parse_payload_rejects_wrong_shape() {
        let err = parse_payload(Phase::Audio, r#"{"audios": "nope"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload { phase: Phase::Audio, .. }));
        assert!(parse_payload(Phase::Video, "not json").is_err());
    }

    #[test]
    fn test_body_round_trips_through_bundle_value() {
        let payload = json!([{"index": 1, "url": "a.mp3"}]);
        let body = body_for(Phase::Audio, &payload).unwrap();
        assert!(body.starts_with("{\"audios\""));
        assert_eq!(bundle_value(Phase::Audio, &body).unwrap(), payload);

        let text = bundle_value(Phase::Script, "T1").unwrap();
        assert_eq!(body_for(Phase::Script, &text).unwrap(), "T1");
    }

    #[test]
    fn test_clear_assets_single_index() {
        let payload = json!([
            {"index": 0, "images": ["a.png"]},
            {"index": 1, "images": ["b.png", "c.png"]}
        ]);
        let cleared = clear_assets(Phase::FirstFrameImage, &payload, Some(1)).unwrap();
        assert_eq!(cleared[0]["images"], json!(["a.png"]));
        assert_eq!(cleared[1]["images"], json!([]));
    }

    #[test]
    fn test_clear_assets_videos_drops_task_id() {
        let payload = json!([{"index": 0, "content_generation_task_id": "cgt-1", "url": "v.mp4"}]);
        let cleared = clear_assets(Phase::Video, &payload, None).unwrap();
        assert_eq!(cleared[0]["content_generation_task_id"], json!(""));
        assert!(cleared[0].get("url").is_none());
    }

    #[test]
    fn test_clear_assets_unknown_index() {
        let payload = json!([{"index": 0, "url": "a.mp3"}]);
        let err = clear_assets(Phase::Audio, &payload, Some(5)).unwrap_err();
        assert!(matches!(err, ValidationError::IndexOutOfRange { index: 5, .. }));
    }

    #[test]
    fn test_select_asset_pins_candidate() {
        let payload = json!([{"index": 0, "images": ["a.png", "b.png"]}]);
        let selected = select_asset(Phase::RoleImage, &payload, 0, "b.png").unwrap();
        assert_eq!(selected[0]["images"], json!(["b.png"]));
        assert!(select_asset(Phase::Film, &json!({"url": ""}), 0, "x").is_err());
    }

    #[test]
    fn test_edit_tone_line() {
        let payload = json!([{"index": 2, "line": "old", "tone": "happy"}]);
        let edited = edit_tone_line(&payload, 2, "new").unwrap();
        assert_eq!(edited[0]["line"], json!("new"));
        assert_eq!(edited[0]["tone"], json!("happy"));
        assert_eq!(item_indices(Phase::Tone, &edited), vec![2]);
    }
}
