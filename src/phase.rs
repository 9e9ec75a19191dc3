//! Pipeline phase identifiers and the confirmation keys they own.
//!
//! This module provides:
//! - `Phase`, the fixed, totally ordered list of pipeline stages
//! - `DataKey`, the confirmation bundle key each phase writes
//! - Helpers for the `phase=<Name>` marker that prefixes phase content

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the marker line that tags a content fragment with its phase.
pub const MARKER_PREFIX: &str = "phase=";

/// One stage of the story-to-film pipeline.
///
/// Declaration order is pipeline order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Script,
    StoryBoard,
    RoleDescription,
    RoleImage,
    FirstFrameDescription,
    FirstFrameImage,
    VideoDescription,
    Video,
    Tone,
    Audio,
    Film,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Script,
        Phase::StoryBoard,
        Phase::RoleDescription,
        Phase::RoleImage,
        Phase::FirstFrameDescription,
        Phase::FirstFrameImage,
        Phase::VideoDescription,
        Phase::Video,
        Phase::Tone,
        Phase::Audio,
        Phase::Film,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn first() -> Phase {
        Phase::Script
    }

    pub fn last() -> Phase {
        Phase::Film
    }

    pub fn next(self) -> Option<Phase> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<Phase> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Every phase strictly after this one, in order.
    pub fn successors(self) -> Vec<Phase> {
        Self::ALL[self.index() + 1..].to_vec()
    }

    /// Every phase strictly before this one, in order.
    pub fn predecessors(self) -> Vec<Phase> {
        Self::ALL[..self.index()].to_vec()
    }

    /// Wire name used in content markers and generation requests.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Script => "Script",
            Phase::StoryBoard => "StoryBoard",
            Phase::RoleDescription => "RoleDescription",
            Phase::RoleImage => "RoleImage",
            Phase::FirstFrameDescription => "FirstFrameDescription",
            Phase::FirstFrameImage => "FirstFrameImage",
            Phase::VideoDescription => "VideoDescription",
            Phase::Video => "Video",
            Phase::Tone => "Tone",
            Phase::Audio => "Audio",
            Phase::Film => "Film",
        }
    }

    /// Human-readable label for progress display.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Script => "Story script",
            Phase::StoryBoard => "Storyboard",
            Phase::RoleDescription => "Character descriptions",
            Phase::RoleImage => "Character images",
            Phase::FirstFrameDescription => "First-frame descriptions",
            Phase::FirstFrameImage => "First-frame images",
            Phase::VideoDescription => "Video descriptions",
            Phase::Video => "Video clips",
            Phase::Tone => "Voice tones",
            Phase::Audio => "Voice audio",
            Phase::Film => "Final film",
        }
    }

    pub fn data_key(self) -> DataKey {
        match self {
            Phase::Script => DataKey::Script,
            Phase::StoryBoard => DataKey::Storyboards,
            Phase::RoleDescription => DataKey::RoleDescriptions,
            Phase::RoleImage => DataKey::RoleImages,
            Phase::FirstFrameDescription => DataKey::FirstFrameDescriptions,
            Phase::FirstFrameImage => DataKey::FirstFrameImages,
            Phase::VideoDescription => DataKey::VideoDescriptions,
            Phase::Video => DataKey::Videos,
            Phase::Tone => DataKey::Tones,
            Phase::Audio => DataKey::Audios,
            Phase::Film => DataKey::Film,
        }
    }

    /// Phases whose content carries media produced by the generation collaborator.
    pub fn has_media_asset(self) -> bool {
        matches!(
            self,
            Phase::RoleImage | Phase::FirstFrameImage | Phase::Video | Phase::Audio | Phase::Film
        )
    }

    /// Phases whose content is a JSON payload rather than free text.
    pub fn is_structured(self) -> bool {
        self.has_media_asset() || self == Phase::Tone
    }

    /// Numbered free-text lists that support per-item edits.
    pub fn is_description_list(self) -> bool {
        matches!(
            self,
            Phase::RoleDescription | Phase::FirstFrameDescription | Phase::VideoDescription
        )
    }

    /// `phase=<Name>` marker line for this phase.
    pub fn marker(self) -> String {
        format!("{}{}", MARKER_PREFIX, self.name())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name().to_lowercase() == wanted)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid phase '{}'. Valid values: {}",
                    s,
                    Self::ALL.map(|p| p.name()).join(", ")
                )
            })
    }
}

/// Key under which a phase's confirmed content lives in the confirmation bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKey {
    Script,
    Storyboards,
    RoleDescriptions,
    RoleImages,
    FirstFrameDescriptions,
    FirstFrameImages,
    VideoDescriptions,
    Videos,
    Tones,
    Audios,
    Film,
}

impl DataKey {
    pub fn as_str(self) -> &'static str {
        match self {
            DataKey::Script => "script",
            DataKey::Storyboards => "storyboards",
            DataKey::RoleDescriptions => "role_descriptions",
            DataKey::RoleImages => "role_images",
            DataKey::FirstFrameDescriptions => "first_frame_descriptions",
            DataKey::FirstFrameImages => "first_frame_images",
            DataKey::VideoDescriptions => "video_descriptions",
            DataKey::Videos => "videos",
            DataKey::Tones => "tones",
            DataKey::Audios => "audios",
            DataKey::Film => "film",
        }
    }

    /// The phase that owns this key.
    pub fn phase(self) -> Phase {
        Phase::ALL
            .into_iter()
            .find(|p| p.data_key() == self)
            .unwrap_or(Phase::Script)
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .map(Phase::data_key)
            .find(|k| k.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown data key '{}'", s))
    }
}

/// Prefix `body` with the phase marker line.
pub fn with_marker(phase: Phase, body: &str) -> String {
    format!("{}\n{}", phase.marker(), body)
}

/// Phase named by a leading `phase=<Name>` marker, if any.
pub fn marker_of(content: &str) -> Option<Phase> {
    let rest = content.trim_start().strip_prefix(MARKER_PREFIX)?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    name.parse().ok()
}

/// Content with any leading phase marker removed and surrounding whitespace trimmed.
pub fn strip_marker(content: &str) -> String {
    let trimmed = content.trim_start();
    match trimmed.strip_prefix(MARKER_PREFIX) {
        Some(rest) => {
            let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            body.trim().to_string()
        }
        None => trimmed.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_total() {
        for pair in Phase::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert_eq!(pair[1].prev(), Some(pair[0]));
        }
        assert_eq!(Phase::first().prev(), None);
        assert_eq!(Phase::last().next(), None);
    }

    #[test]
    fn test_successors_exclude_self() {
        let after = Phase::VideoDescription.successors();
        assert_eq!(after, vec![Phase::Video, Phase::Tone, Phase::Audio, Phase::Film]);
        assert!(Phase::Film.successors().is_empty());
        assert_eq!(Phase::StoryBoard.predecessors(), vec![Phase::Script]);
    }

    #[test]
    fn test_parse_phase_is_lenient() {
        assert_eq!("storyboard".parse::<Phase>().unwrap(), Phase::StoryBoard);
        assert_eq!("first-frame-image".parse::<Phase>().unwrap(), Phase::FirstFrameImage);
        assert_eq!("role_description".parse::<Phase>().unwrap(), Phase::RoleDescription);
        assert!("poster".parse::<Phase>().is_err());
    }

    #[test]
    fn test_data_keys_round_trip_to_owner() {
        for phase in Phase::ALL {
            assert_eq!(phase.data_key().phase(), phase);
        }
        assert_eq!(Phase::StoryBoard.data_key().as_str(), "storyboards");
        assert_eq!(
            serde_json::to_string(&DataKey::FirstFrameImages).unwrap(),
            "\"first_frame_images\""
        );
    }

    #[test]
    fn test_marker_helpers() {
        let content = with_marker(Phase::StoryBoard, "分镜1：\n角色：兔子");
        assert!(content.starts_with("phase=StoryBoard\n"));
        assert_eq!(marker_of(&content), Some(Phase::StoryBoard));
        assert_eq!(strip_marker(&content), "分镜1：\n角色：兔子");
        assert_eq!(marker_of("no marker here"), None);
        assert_eq!(strip_marker("  plain text \n"), "plain text");
    }

    #[test]
    fn test_structured_phases() {
        assert!(Phase::Tone.is_structured());
        assert!(!Phase::Tone.has_media_asset());
        assert!(Phase::Film.has_media_asset());
        assert!(!Phase::Script.is_structured());
        assert!(Phase::VideoDescription.is_description_list());
    }
}
