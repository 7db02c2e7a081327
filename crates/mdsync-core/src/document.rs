//! Logical documents built from Markdown files
//!
//! A `Document` is rebuilt from the current file content on every pass and
//! never mutated afterwards.

use serde::Serialize;

use crate::convert::{convert, ConvertContext};
use crate::error::{SyncError, SyncResult};
use crate::frontmatter::{split_front_matter, text_field, Metadata};
use crate::models::{generate_slug, Block};

/// How much of the page the converter produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConvertMode {
    /// Body blocks only
    #[default]
    ContentOnly,
    /// Title heading, author/date byline and divider before the body
    FullPage,
}

/// A unit of content to synchronize
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub title: String,
    /// Sole reconciliation key
    pub slug: String,
    pub metadata: Metadata,
    pub blocks: Vec<Block>,
}

impl Document {
    /// Build a document from raw file text
    ///
    /// The title comes from front matter, falling back to `fallback_title`
    /// (usually the file stem). The slug comes from front matter or is
    /// generated from the title.
    pub fn from_source(text: &str, fallback_title: &str, mode: ConvertMode) -> SyncResult<Self> {
        let (metadata, body) = split_front_matter(text)?;

        let title = text_field(&metadata, "title")
            .unwrap_or_else(|| fallback_title.trim().to_string());
        if title.is_empty() {
            return Err(SyncError::Validation("document has no title".to_string()));
        }

        let slug = text_field(&metadata, "slug").unwrap_or_else(|| generate_slug(&title));
        if slug.is_empty() {
            return Err(SyncError::Validation(format!(
                "cannot derive a slug from title '{}'",
                title
            )));
        }

        let context = match mode {
            ConvertMode::ContentOnly => ConvertContext::default(),
            ConvertMode::FullPage => ConvertContext {
                title: Some(title.clone()),
                author: text_field(&metadata, "author"),
                date: text_field(&metadata, "date"),
            },
        };
        let blocks = convert(body, &context);

        Ok(Self {
            title,
            slug,
            metadata,
            blocks,
        })
    }
}
