//! Token-overlap check between a cached edit and freshly streamed content.
//!
//! A cached edit is considered to belong to the current content when at
//! least half of its significant tokens also appear in the fresh text.

use std::collections::BTreeSet;

use crate::phase;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "were", "has",
    "have", "not", "but", "you", "his", "her", "its", "our", "they", "them",
];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Significant tokens of `text`.
///
/// Latin words of three or more letters (lowercased, minus common stopwords)
/// and character bigrams of CJK runs. A lone CJK character counts as a token.
pub fn significant_tokens(text: &str) -> BTreeSet<String> {
    let text = phase::strip_marker(text);
    let mut tokens = BTreeSet::new();
    let mut word = String::new();
    let mut cjk: Vec<char> = Vec::new();

    let flush_word = |word: &mut String, tokens: &mut BTreeSet<String>| {
        if word.chars().count() >= 3 && !STOPWORDS.contains(&word.as_str()) {
            tokens.insert(std::mem::take(word));
        } else {
            word.clear();
        }
    };
    let flush_cjk = |run: &mut Vec<char>, tokens: &mut BTreeSet<String>| {
        match run.len() {
            0 => {}
            1 => {
                tokens.insert(run[0].to_string());
            }
            _ => {
                for pair in run.windows(2) {
                    tokens.insert(pair.iter().collect());
                }
            }
        }
        run.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            cjk.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut cjk, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut cjk, &mut tokens);
    tokens
}

/// Fraction of the cached text's significant tokens found in `fresh`.
///
/// A cached text without significant tokens overlaps fully.
pub fn overlap_ratio(cached: &str, fresh: &str) -> f64 {
    let cached = significant_tokens(cached);
    if cached.is_empty() {
        return 1.0;
    }
    let fresh = significant_tokens(fresh);
    let shared = cached.intersection(&fresh).count();
    shared as f64 / cached.len() as f64
}

pub fn is_similar(cached: &str, fresh: &str, threshold: f64) -> bool {
    overlap_ratio(cached, fresh) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_tokens_skip_short_and_stopwords() {
        let tokens = significant_tokens("The rabbit and a fox go to the river");
        assert!(tokens.contains("rabbit"));
        assert!(tokens.contains("river"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("go"));
    }

    #[test]
    fn test_cjk_bigrams() {
        let tokens = significant_tokens("小兔子，森");
        assert!(tokens.contains("小兔"));
        assert!(tokens.contains("兔子"));
        assert!(tokens.contains("森"));
    }

    #[test]
    fn test_marker_is_ignored() {
        let tokens = significant_tokens("phase=StoryBoard\nrabbit");
        assert!(!tokens.iter().any(|t| t.contains("storyboard")));
    }

    #[test]
    fn test_overlap_ratio_thresholds() {
        let cached = "a rabbit hunts carrots in the forest";
        assert!(is_similar(cached, "The rabbit hunts for carrots at dawn", 0.5));
        assert!(!is_similar(cached, "A spaceship lands on Mars", 0.5));
        assert_eq!(overlap_ratio("", "anything"), 1.0);
    }

    #[test]
    fn test_overlap_ratio_chinese() {
        let cached = "分镜1：\n角色：小兔子\n画面：森林";
        let fresh = "分镜1：\n角色：小兔子\n画面：森林里的早晨";
        assert!(is_similar(cached, fresh, DEFAULT_SIMILARITY_THRESHOLD));
        assert!(!is_similar(cached, "宇航员降落在火星上", DEFAULT_SIMILARITY_THRESHOLD));
    }
}
