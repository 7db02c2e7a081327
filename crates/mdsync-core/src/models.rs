//! Data models for mdsync
//!
//! Defines the render-ready content blocks produced by the converter and
//! the slug helper used as the reconciliation key.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Character-run annotations derived from inline Markdown markers
///
/// Color is never represented; it always encodes as the store default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
}

impl InlineStyle {
    /// Whether no annotation is set
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// One render-ready content unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading {
        /// Always within 1..=3
        level: u8,
        text: String,
        style: InlineStyle,
    },
    Paragraph {
        text: String,
        style: InlineStyle,
    },
    BulletedItem {
        text: String,
        style: InlineStyle,
    },
    NumberedItem {
        text: String,
        style: InlineStyle,
    },
    Quote {
        text: String,
        style: InlineStyle,
    },
    Code {
        text: String,
        language: String,
    },
    Divider,
    Image {
        url: String,
        caption: String,
    },
    Todo {
        text: String,
        checked: bool,
    },
}

impl Block {
    /// Create a heading, clamping the level to 1..=3
    pub fn heading(level: usize, text: impl Into<String>, style: InlineStyle) -> Self {
        Block::Heading {
            level: level.clamp(1, 3) as u8,
            text: text.into(),
            style,
        }
    }

    /// Plain paragraph with no annotations
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            text: text.into(),
            style: InlineStyle::default(),
        }
    }

    /// The user text carried by this block (`None` for dividers)
    pub fn text(&self) -> Option<&str> {
        match self {
            Block::Heading { text, .. }
            | Block::Paragraph { text, .. }
            | Block::BulletedItem { text, .. }
            | Block::NumberedItem { text, .. }
            | Block::Quote { text, .. }
            | Block::Code { text, .. }
            | Block::Todo { text, .. } => Some(text),
            Block::Image { caption, .. } => Some(caption),
            Block::Divider => None,
        }
    }

    /// Short name of the variant, matching the serialized tag
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Heading { .. } => "heading",
            Block::Paragraph { .. } => "paragraph",
            Block::BulletedItem { .. } => "bulleted_item",
            Block::NumberedItem { .. } => "numbered_item",
            Block::Quote { .. } => "quote",
            Block::Code { .. } => "code",
            Block::Divider => "divider",
            Block::Image { .. } => "image",
            Block::Todo { .. } => "todo",
        }
    }
}

fn slug_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // \w is Unicode-aware, so CJK ideographs count as word characters
    RE.get_or_init(|| Regex::new(r"[^\w\p{Han}]+").expect("valid slug regex"))
}

/// Generate a stable slug from a title
///
/// Lowercases, collapses every run of non-word characters into a single
/// `-`, and strips leading/trailing separators.
pub fn generate_slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    slug_separator()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}
