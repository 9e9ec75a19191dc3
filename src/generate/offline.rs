//! Deterministic generator that needs no network or model.
//!
//! Content is derived from the upstream inputs with fixed templates, and
//! media references use the `offline://` scheme. Useful for dry runs of the
//! pipeline and for tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{GenerationMode, GenerationRequest, GenerationResult, Generator};
use crate::bundle::ConfirmationBundle;
use crate::descriptions;
use crate::errors::GenerateError;
use crate::models::{self, Audio, Film, ImageSet, Tone, Video};
use crate::phase::{DataKey, Phase};
use crate::storyboard::{self, Scene};

const CANDIDATES_PER_ITEM: usize = 2;
const DEFAULT_PREMISE: &str = "一个无题的小故事";

#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

impl OfflineGenerator {
    pub fn new() -> Self {
        Self
    }

    fn scenes(inputs: &ConfirmationBundle) -> Vec<Scene> {
        inputs
            .read_text(DataKey::Storyboards)
            .map(storyboard::parse_content)
            .unwrap_or_default()
    }

    fn item_count(inputs: &ConfirmationBundle, key: DataKey) -> usize {
        inputs
            .read_text(key)
            .map(|text| descriptions::parse_items(text).len())
            .unwrap_or(0)
    }

    fn script(prompt: Option<&str>) -> String {
        let premise = prompt.map(str::trim).filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PREMISE);
        format!(
            "《{premise}》\n清晨，主角在森林里醒来，决定出发寻找答案。\n一路上遇到了新朋友，两人一起克服了困难。\n傍晚，他们回到家中，分享今天的收获。"
        )
    }

    fn storyboard(script: &str) -> String {
        let title = script.lines().next().unwrap_or(DEFAULT_PREMISE).trim();
        let scenes = [
            Scene::new("主角", &format!("{title}：清晨的森林"), "新的一天开始了！"),
            Scene::new("主角、朋友", "林间小路上相遇", "我们一起走吧。"),
            Scene::new("主角、朋友", "傍晚的小屋", "今天真开心。"),
        ];
        storyboard::build_content(&scenes)
    }

    fn role_descriptions(scenes: &[Scene]) -> String {
        let mut names: Vec<String> = Vec::new();
        for scene in scenes {
            for name in scene.characters.split(['、', '，', ',']) {
                let name = name.trim();
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("角色{}：{}，卡通风格，表情生动", i + 1, name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn frame_descriptions(scenes: &[Scene]) -> String {
        scenes
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!("画面{}：{}，出场角色：{}", i + 1, s.scene, s.characters)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn video_descriptions(scenes: &[Scene]) -> String {
        scenes
            .iter()
            .enumerate()
            .map(|(i, s)| format!("镜头{}：镜头缓慢推进，{}", i + 1, s.scene))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn image_sets(kind: &str, count: usize) -> Vec<ImageSet> {
        (0..count)
            .map(|index| ImageSet {
                index,
                images: (1..=CANDIDATES_PER_ITEM)
                    .map(|n| format!("offline://{kind}/{index}/{n}.png"))
                    .collect(),
            })
            .collect()
    }

    fn videos(count: usize) -> Vec<Video> {
        (0..count)
            .map(|index| Video {
                index,
                content_generation_task_id: format!("offline-video-{index}"),
                url: Some(format!("offline://video/{index}.mp4")),
            })
            .collect()
    }

    fn tones(scenes: &[Scene]) -> Vec<Tone> {
        scenes
            .iter()
            .enumerate()
            .map(|(index, s)| Tone {
                index,
                line: s.dialogue.clone(),
                tone: "温和".to_string(),
            })
            .collect()
    }

    fn audios(count: usize) -> Vec<Audio> {
        (0..count)
            .map(|index| Audio {
                index,
                url: format!("offline://audio/{index}.mp3"),
            })
            .collect()
    }

    fn fresh(request: &GenerationRequest) -> Result<Value, GenerateError> {
        let inputs = &request.inputs;
        let encode = |value: Result<Value, serde_json::Error>| {
            value.map_err(|e| GenerateError::Protocol(format!("failed to encode payload: {}", e)))
        };
        let text = match request.phase {
            Phase::Script => Self::script(request.prompt.as_deref()),
            Phase::StoryBoard => {
                Self::storyboard(&Self::script_or_prompt(inputs, request.prompt.as_deref()))
            }
            Phase::RoleDescription => Self::role_descriptions(&Self::scenes(inputs)),
            Phase::FirstFrameDescription => Self::frame_descriptions(&Self::scenes(inputs)),
            Phase::VideoDescription => Self::video_descriptions(&Self::scenes(inputs)),
            Phase::RoleImage => {
                let count = Self::item_count(inputs, DataKey::RoleDescriptions);
                return encode(serde_json::to_value(Self::image_sets("role", count)));
            }
            Phase::FirstFrameImage => {
                let count = Self::item_count(inputs, DataKey::FirstFrameDescriptions);
                return encode(serde_json::to_value(Self::image_sets("frame", count)));
            }
            Phase::Video => {
                let count = Self::item_count(inputs, DataKey::VideoDescriptions);
                return encode(serde_json::to_value(Self::videos(count)));
            }
            Phase::Tone => return encode(serde_json::to_value(Self::tones(&Self::scenes(inputs)))),
            Phase::Audio => {
                let count = inputs
                    .read_as::<Vec<Tone>>(DataKey::Tones)
                    .map_or(0, |tones| tones.len());
                return encode(serde_json::to_value(Self::audios(count)));
            }
            Phase::Film => {
                return encode(serde_json::to_value(Film {
                    url: "offline://film.mp4".to_string(),
                }));
            }
        };
        if text.trim().is_empty() {
            return Err(GenerateError::Protocol(format!(
                "no upstream content to generate {} from",
                request.phase.label()
            )));
        }
        Ok(Value::String(text))
    }

    fn script_or_prompt(inputs: &ConfirmationBundle, prompt: Option<&str>) -> String {
        inputs
            .read_text(DataKey::Script)
            .map(str::to_string)
            .unwrap_or_else(|| Self::script(prompt))
    }

    /// Fill only the cleared media items of the phase's current payload.
    fn refill(request: &GenerationRequest, fresh: Value) -> Value {
        let Some(current) = request.inputs.read(request.phase.data_key()) else {
            return fresh;
        };
        let (Value::Array(current), Value::Array(fresh_items)) = (current, &fresh) else {
            return fresh;
        };
        let merged: Vec<Value> = current
            .iter()
            .map(|item| {
                let index = item.get("index").and_then(Value::as_u64);
                let wanted = request
                    .only_index
                    .is_none_or(|only| index == Some(only as u64));
                let replacement = fresh_items
                    .iter()
                    .find(|f| f.get("index").and_then(Value::as_u64) == index);
                match replacement {
                    Some(replacement) if wanted && Self::is_cleared(item) => replacement.clone(),
                    _ => item.clone(),
                }
            })
            .collect();
        json!(merged)
    }

    fn is_cleared(item: &Value) -> bool {
        let empty = |field: &str| match item.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            Some(_) => false,
        };
        if item.get("images").is_some() {
            empty("images")
        } else if item.get("content_generation_task_id").is_some() {
            empty("content_generation_task_id") || empty("url")
        } else {
            empty("url")
        }
    }
}

#[async_trait]
impl Generator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        let fresh = Self::fresh(request)?;
        let phase = request.phase;
        let payload = if request.mode == GenerationMode::Regeneration
            && phase.has_media_asset()
            && phase != Phase::Film
        {
            Self::refill(request, fresh)
        } else {
            fresh
        };
        debug!(%phase, mode = ?request.mode, "Offline generation");
        let payload = if phase.is_structured() {
            models::wrap(phase.data_key(), payload)
        } else {
            payload
        };
        Ok(GenerationResult::success(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        phase: Phase,
        mode: GenerationMode,
        inputs: ConfirmationBundle,
    ) -> GenerationRequest {
        GenerationRequest {
            phase,
            mode,
            inputs,
            only_index: None,
            prompt: Some("小兔子找胡萝卜".into()),
        }
    }

    async fn text_of(phase: Phase, inputs: ConfirmationBundle) -> String {
        let result = OfflineGenerator::new()
            .generate(&request(phase, GenerationMode::Confirmation, inputs))
            .await
            .unwrap();
        result.payload.as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_script_uses_prompt() {
        let script = text_of(Phase::Script, ConfirmationBundle::new()).await;
        assert!(script.starts_with("《小兔子找胡萝卜》"));
    }

    #[tokio::test]
    async fn test_storyboard_is_valid() {
        let mut inputs = ConfirmationBundle::new();
        inputs.set(DataKey::Script, json!("《测试》\n故事"));
        let board = text_of(Phase::StoryBoard, inputs).await;
        let scenes = storyboard::parse_content(&board);
        assert_eq!(scenes.len(), 3);
        assert!(storyboard::validate_scenes(&scenes).is_ok());
        assert!(!storyboard::normalize_numbering(&board).unwrap().renumbered);
    }

    #[tokio::test]
    async fn test_descriptions_follow_storyboard() {
        let mut inputs = ConfirmationBundle::new();
        inputs.set(DataKey::Script, json!("《测试》"));
        let board = text_of(Phase::StoryBoard, inputs.clone()).await;
        inputs.set(DataKey::Storyboards, json!(board));

        let roles = text_of(Phase::RoleDescription, inputs.clone()).await;
        let items = descriptions::parse_items(&roles);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].subject(), "主角");
        assert_eq!(items[1].subject(), "朋友");

        let frames = text_of(Phase::FirstFrameDescription, inputs).await;
        assert_eq!(descriptions::parse_items(&frames).len(), 3);
    }

    #[tokio::test]
    async fn test_media_payload_is_wrapped_and_valid() {
        let mut inputs = ConfirmationBundle::new();
        inputs.set(DataKey::RoleDescriptions, json!("角色1：主角\n角色2：朋友"));
        let result = OfflineGenerator::new()
            .generate(&request(Phase::RoleImage, GenerationMode::Confirmation, inputs))
            .await
            .unwrap();
        let payload = models::parse_payload(Phase::RoleImage, &result.payload.to_string()).unwrap();
        let sets: Vec<ImageSet> = serde_json::from_value(payload).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].images[0], "offline://role/1/1.png");
    }

    #[tokio::test]
    async fn test_regeneration_fills_only_cleared_items() {
        let mut inputs = ConfirmationBundle::new();
        inputs.set(DataKey::RoleDescriptions, json!("角色1：主角\n角色2：朋友"));
        inputs.set(
            DataKey::RoleImages,
            json!([
                {"index": 0, "images": ["https://cdn/chosen.png"]},
                {"index": 1, "images": []}
            ]),
        );
        let result = OfflineGenerator::new()
            .generate(&request(Phase::RoleImage, GenerationMode::Regeneration, inputs))
            .await
            .unwrap();
        let sets: Vec<ImageSet> =
            serde_json::from_value(models::unwrap(DataKey::RoleImages, result.payload)).unwrap();
        assert_eq!(sets[0].images, vec!["https://cdn/chosen.png".to_string()]);
        assert_eq!(sets[1].images.len(), CANDIDATES_PER_ITEM);
    }

    #[tokio::test]
    async fn test_missing_upstream_is_protocol_error() {
        let err = OfflineGenerator::new()
            .generate(&request(
                Phase::RoleDescription,
                GenerationMode::Confirmation,
                ConfirmationBundle::new(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Protocol(_)));
    }
}
