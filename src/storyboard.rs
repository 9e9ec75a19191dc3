//! Storyboard text format: parsing, building and numbering validation.
//!
//! A storyboard is a sequence of scene blocks:
//!
//! ```text
//! 分镜1：
//! 角色：小兔子
//! 画面：森林里的清晨
//! 台词：早上好！
//! ```
//!
//! Blocks are separated by blank lines and numbered contiguously from 1.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::errors::ValidationError;

static SCENE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"分镜(\d+)[：:]").expect("scene header pattern is valid"));

const CHARACTERS_LABEL: &str = "角色";
const PICTURE_LABEL: &str = "画面";
const DIALOGUE_LABELS: [&str; 2] = ["中文台词", "台词"];

/// One scene block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: usize,
    pub characters: String,
    pub scene: String,
    pub dialogue: String,
}

impl Scene {
    pub fn new(characters: &str, scene: &str, dialogue: &str) -> Self {
        Self {
            id: 0,
            characters: characters.to_string(),
            scene: scene.to_string(),
            dialogue: dialogue.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.characters.trim().is_empty()
            && !self.scene.trim().is_empty()
            && !self.dialogue.trim().is_empty()
    }
}

/// Result of numbering validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub content: String,
    pub renumbered: bool,
}

fn labelled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(label)?;
    let rest = rest.strip_prefix('：').or_else(|| rest.strip_prefix(':'))?;
    Some(rest.trim())
}

/// Split storyboard text into scenes. Text before the first header is ignored.
pub fn parse_content(text: &str) -> Vec<Scene> {
    let headers: Vec<_> = SCENE_HEADER.find_iter(text).collect();
    headers
        .iter()
        .enumerate()
        .map(|(position, header)| {
            let end = headers
                .get(position + 1)
                .map_or(text.len(), |next| next.start());
            let block = &text[header.end()..end];
            let mut scene = Scene {
                id: position + 1,
                ..Scene::default()
            };
            for line in block.lines() {
                if let Some(value) = labelled_value(line, CHARACTERS_LABEL) {
                    scene.characters = value.to_string();
                } else if let Some(value) = labelled_value(line, PICTURE_LABEL) {
                    scene.scene = value.to_string();
                } else if let Some(value) = DIALOGUE_LABELS
                    .iter()
                    .find_map(|label| labelled_value(line, label))
                {
                    scene.dialogue = value.to_string();
                }
            }
            scene
        })
        .collect()
}

/// Render scenes in order, renumbering from 1.
pub fn build_content(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "分镜{}：\n{}：{}\n{}：{}\n台词：{}",
                i + 1,
                CHARACTERS_LABEL,
                s.characters,
                PICTURE_LABEL,
                s.scene,
                s.dialogue
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Check scene numbering and rewrite headers to `1..=n` in order of appearance.
///
/// Empty text and text without any scene header are rejected.
pub fn normalize_numbering(text: &str) -> Result<Normalized, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty {
            phase: crate::phase::Phase::StoryBoard,
        });
    }

    let numbers: Vec<Option<usize>> = SCENE_HEADER
        .captures_iter(trimmed)
        .map(|caps| caps.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect();
    if numbers.is_empty() {
        return Err(ValidationError::MalformedStoryboard);
    }

    let contiguous = numbers
        .iter()
        .enumerate()
        .all(|(i, n)| *n == Some(i + 1));
    if contiguous {
        return Ok(Normalized {
            content: trimmed.to_string(),
            renumbered: false,
        });
    }

    let mut next = 0usize;
    let content = SCENE_HEADER
        .replace_all(trimmed, |_: &regex::Captures<'_>| {
            next += 1;
            format!("分镜{}：", next)
        })
        .into_owned();
    Ok(Normalized {
        content,
        renumbered: true,
    })
}

/// Reject scenes missing any of their three fields.
pub fn validate_scenes(scenes: &[Scene]) -> Result<(), ValidationError> {
    if scenes.is_empty() {
        return Err(ValidationError::Empty {
            phase: crate::phase::Phase::StoryBoard,
        });
    }
    match scenes.iter().position(|s| !s.is_complete()) {
        Some(position) => Err(ValidationError::IncompleteScene { id: position + 1 }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SCENES: &str = concat!(
        "分镜1：\n角色：小兔子\n画面：森林\n台词：早上好\n\n",
        "分镜2：\n角色：狐狸\n画面：河边\n台词：你好",
    );

    #[test]
    fn test_parse_extracts_fields() {
        let scenes = parse_content(TWO_SCENES);
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].characters, "小兔子");
        assert_eq!(scenes[1].scene, "河边");
        assert_eq!(scenes[1].dialogue, "你好");
        assert_eq!(scenes[1].id, 2);
    }

    #[test]
    fn test_parse_accepts_ascii_colon_and_chinese_dialogue_label() {
        let scenes = parse_content("分镜1:\n角色:兔子\n画面:草地\n中文台词:跑！");
        assert_eq!(scenes[0].characters, "兔子");
        assert_eq!(scenes[0].dialogue, "跑！");
    }

    #[test]
    fn test_build_then_parse_preserves_scenes() {
        assert_eq!(build_content(&parse_content(TWO_SCENES)), TWO_SCENES);
    }

    #[test]
    fn test_normalize_keeps_contiguous_numbering() {
        let result = normalize_numbering(TWO_SCENES).unwrap();
        assert!(!result.renumbered);
        assert_eq!(result.content, TWO_SCENES);
    }

    #[test]
    fn test_normalize_renumbers_gaps() {
        let gapped = "分镜1：\n角色：A\n画面：x\n台词：y\n\n分镜3：\n角色：B\n画面：z\n台词：w";
        let result = normalize_numbering(gapped).unwrap();
        assert!(result.renumbered);
        assert!(result.content.contains("分镜2："));
        assert!(!result.content.contains("分镜3："));
    }

    #[test]
    fn test_normalize_renumbers_duplicates() {
        let duplicated = "分镜1：\n角色：A\n\n分镜1：\n角色：B";
        let result = normalize_numbering(duplicated).unwrap();
        assert!(result.renumbered);
        assert_eq!(parse_content(&result.content).len(), 2);
        assert!(result.content.contains("分镜2："));
    }

    #[test]
    fn test_normalize_rejects_empty_and_headerless() {
        assert!(matches!(
            normalize_numbering("   \n"),
            Err(ValidationError::Empty { .. })
        ));
        assert!(matches!(
            normalize_numbering("just some prose"),
            Err(ValidationError::MalformedStoryboard)
        ));
    }

    #[test]
    fn test_validate_scenes_reports_first_incomplete() {
        let scenes = vec![Scene::new("A", "x", "y"), Scene::new("B", "", "w")];
        assert!(matches!(
            validate_scenes(&scenes),
            Err(ValidationError::IncompleteScene { id: 2 })
        ));
        assert!(validate_scenes(&scenes[..1]).is_ok());
    }
}
