//! Numbered description lists (characters, first frames, video shots).
//!
//! Each item starts at the beginning of a line with a short label and a
//! number, e.g. `角色1：小兔子，白色长耳朵` or `画面2：清晨的森林`. The body
//! runs until the next item header.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::ValidationError;
use crate::phase::Phase;

static ITEM_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*([^\d\s：:]{1,12})(\d+)[：:]").expect("item header pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionItem {
    pub label: String,
    pub number: usize,
    pub body: String,
    body_start: usize,
    body_end: usize,
}

impl DescriptionItem {
    /// Leading name of the item: body text up to the first separator.
    pub fn subject(&self) -> &str {
        self.body
            .split(['，', ',', '：', ':', '。', '\n'])
            .next()
            .unwrap_or("")
            .trim()
    }
}

pub fn parse_items(text: &str) -> Vec<DescriptionItem> {
    let headers: Vec<_> = ITEM_HEADER.captures_iter(text).collect();
    headers
        .iter()
        .enumerate()
        .filter_map(|(position, caps)| {
            let whole = caps.get(0)?;
            let end = headers
                .get(position + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());
            Some(DescriptionItem {
                label: caps.get(1)?.as_str().to_string(),
                number: caps.get(2)?.as_str().parse().ok()?,
                body: text[whole.end()..end].trim().to_string(),
                body_start: whole.end(),
                body_end: end,
            })
        })
        .collect()
}

/// Replace the body of the item at zero-based `index`, leaving the rest of the text intact.
pub fn replace_item(
    phase: Phase,
    text: &str,
    index: usize,
    body: &str,
) -> Result<String, ValidationError> {
    let items = parse_items(text);
    let item = items
        .get(index)
        .ok_or(ValidationError::IndexOutOfRange { phase, index })?;
    let trailing = if index + 1 < items.len() { "\n" } else { "" };
    Ok(format!(
        "{}{}{}{}",
        &text[..item.body_start],
        body.trim(),
        trailing,
        &text[item.body_end..]
    ))
}

/// Zero-based positions of items whose body mentions `name`.
pub fn items_mentioning(text: &str, name: &str) -> Vec<usize> {
    if name.is_empty() {
        return Vec::new();
    }
    parse_items(text)
        .iter()
        .enumerate()
        .filter(|(_, item)| item.body.contains(name))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: &str = "角色1：小兔子，白色长耳朵\n角色2：狐狸，红色尾巴";

    #[test]
    fn test_parse_items_and_subjects() {
        let items = parse_items(ROLES);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "角色");
        assert_eq!(items[1].number, 2);
        assert_eq!(items[0].subject(), "小兔子");
        assert_eq!(items[1].body, "狐狸，红色尾巴");
    }

    #[test]
    fn test_replace_item_keeps_neighbours() {
        let edited = replace_item(Phase::RoleDescription, ROLES, 0, "大兔子，灰色").unwrap();
        assert_eq!(edited, "角色1：大兔子，灰色\n角色2：狐狸，红色尾巴");
        let last = replace_item(Phase::RoleDescription, ROLES, 1, "老狐狸").unwrap();
        assert_eq!(last, "角色1：小兔子，白色长耳朵\n角色2：老狐狸");
    }

    #[test]
    fn test_replace_item_out_of_range() {
        let err = replace_item(Phase::RoleDescription, ROLES, 4, "x").unwrap_err();
        assert!(matches!(err, ValidationError::IndexOutOfRange { index: 4, .. }));
    }

    #[test]
    fn test_items_mentioning() {
        let frames = "画面1：小兔子在森林里\n画面2：狐狸在河边\n画面3：小兔子和狐狸";
        assert_eq!(items_mentioning(frames, "小兔子"), vec![0, 2]);
        assert_eq!(items_mentioning(frames, "熊"), Vec::<usize>::new());
        assert!(items_mentioning(frames, "").is_empty());
    }
}
