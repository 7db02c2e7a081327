//! Markdown to block conversion
//!
//! A single forward scan over the body's lines. Each trimmed line is
//! classified by its prefix (first match wins):
//!
//! 1. `#`..`###` headings (deeper levels clamp to 3)
//! 2. `-`/`*`/`+` bullets, including `- [ ]` / `- [x]` tasks
//! 3. `1.` numbered items
//! 4. `> ` quotes
//! 5. ```` ``` ```` fences, consumed verbatim up to the closing fence
//! 6. `![alt](url)` images
//! 7. `---` / `***` / `___` dividers
//! 8. anything else accumulates into a paragraph until a blank line
//!
//! Conversion is total: malformed syntax degrades to a paragraph.
//!
//! Inline styles are detected per block, not per span, on the raw line
//! including its block marker. A style is set for the whole block when its
//! marker appears an even number of times, and the markers stay in the text
//! as written. A `* ` bullet marker therefore counts toward italic.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Block, InlineStyle};

/// Language tag used for fences without one
pub const PLAIN_TEXT: &str = "plain text";

/// Separator between author and date in the full-page byline
const BYLINE_SEPARATOR: &str = " · ";

/// Page-level context prepended in full-page mode
///
/// An empty context converts the body only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertContext {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
}

impl ConvertContext {
    fn header_blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();

        if let Some(title) = non_empty(&self.title) {
            blocks.push(Block::heading(1, title, InlineStyle::default()));
        }

        let byline: Vec<&str> = [non_empty(&self.author), non_empty(&self.date)]
            .into_iter()
            .flatten()
            .collect();
        if !byline.is_empty() {
            blocks.push(Block::paragraph(byline.join(BYLINE_SEPARATOR)));
        }

        if !blocks.is_empty() {
            blocks.push(Block::Divider);
        }
        blocks
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Convert a Markdown body into an ordered sequence of blocks
pub fn convert(body: &str, context: &ConvertContext) -> Vec<Block> {
    let mut blocks = context.header_blocks();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut lines = body.lines();

    while let Some(raw) = lines.next() {
        let line = raw.trim();
        if line.is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
            continue;
        }

        match classify(line) {
            Line::Block(block) => {
                flush_paragraph(&mut paragraph, &mut blocks);
                blocks.push(block);
            }
            Line::Fence(language) => {
                flush_paragraph(&mut paragraph, &mut blocks);

                let mut text = String::new();
                for inner in lines.by_ref() {
                    if inner.trim_start().starts_with("```") {
                        break;
                    }
                    text.push_str(inner);
                    text.push('\n');
                }
                if text.ends_with('\n') {
                    text.pop();
                }

                blocks.push(Block::Code {
                    text,
                    language: language.to_string(),
                });
            }
            Line::Text => paragraph.push(line),
        }
    }

    flush_paragraph(&mut paragraph, &mut blocks);
    blocks
}

enum Line<'a> {
    Block(Block),
    Fence(&'a str),
    Text,
}

fn classify(line: &str) -> Line<'_> {
    if let Some(block) = heading(line) {
        return Line::Block(block);
    }
    if let Some(block) = bullet(line) {
        return Line::Block(block);
    }
    if let Some(block) = numbered(line) {
        return Line::Block(block);
    }
    if let Some(rest) = line.strip_prefix("> ") {
        let text = rest.trim();
        return Line::Block(Block::Quote {
            text: text.to_string(),
            style: detect_inline_style(line),
        });
    }
    if let Some(rest) = line.strip_prefix("```") {
        let language = rest.split_whitespace().next().unwrap_or(PLAIN_TEXT);
        return Line::Fence(language);
    }
    if let Some(block) = image(line) {
        return Line::Block(block);
    }
    if divider_pattern().is_match(line) {
        return Line::Block(Block::Divider);
    }
    Line::Text
}

fn heading(line: &str) -> Option<Block> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 {
        return None;
    }

    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some(Block::heading(hashes, text, detect_inline_style(line)))
}

fn bullet(line: &str) -> Option<Block> {
    let rest = ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))?
        .trim();

    if let Some(todo) = task(rest) {
        return Some(todo);
    }

    Some(Block::BulletedItem {
        text: rest.to_string(),
        style: detect_inline_style(line),
    })
}

fn task(item: &str) -> Option<Block> {
    let (checked, rest) = if let Some(rest) = item.strip_prefix("[ ]") {
        (false, rest)
    } else if let Some(rest) = item
        .strip_prefix("[x]")
        .or_else(|| item.strip_prefix("[X]"))
    {
        (true, rest)
    } else {
        return None;
    };

    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }

    Some(Block::Todo {
        text: text.to_string(),
        checked,
    })
}

fn numbered(line: &str) -> Option<Block> {
    let caps = numbered_pattern().captures(line)?;
    let text = caps.get(1)?.as_str().trim();
    if text.is_empty() {
        return None;
    }
    Some(Block::NumberedItem {
        text: text.to_string(),
        style: detect_inline_style(line),
    })
}

fn image(line: &str) -> Option<Block> {
    let caps = image_pattern().captures(line)?;
    Some(Block::Image {
        caption: caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
        url: caps.get(2)?.as_str().to_string(),
    })
}

fn flush_paragraph(lines: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if lines.is_empty() {
        return;
    }
    let text = lines.join("\n");
    lines.clear();
    blocks.push(Block::Paragraph {
        style: detect_inline_style(&text),
        text,
    });
}

/// Whole-text inline style detection
///
/// `**` sets bold, a lone `*` sets italic, `~~` sets strikethrough and a
/// backtick sets code, each only when the marker count is even and non-zero.
pub fn detect_inline_style(text: &str) -> InlineStyle {
    let balanced = |count: usize| count >= 2 && count % 2 == 0;

    InlineStyle {
        bold: balanced(text.matches("**").count()),
        italic: balanced(text.replace("**", "").matches('*').count()),
        strikethrough: balanced(text.matches("~~").count()),
        code: balanced(text.matches('`').count()),
    }
}

fn numbered_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s+(.*)$").expect("valid numbered-item regex"))
}

fn image_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)$"#)
            .expect("valid image regex")
    })
}

fn divider_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*_]{3,}$").expect("valid divider regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(body: &str) -> Vec<Block> {
        convert(body, &ConvertContext::default())
    }

    fn plain() -> InlineStyle {
        InlineStyle::default()
    }

    #[test]
    fn test_heading_levels() {
        let blocks = content("# One\n## Two\n### Three");
        assert_eq!(
            blocks,
            vec![
                Block::heading(1, "One", plain()),
                Block::heading(2, "Two", plain()),
                Block::heading(3, "Three", plain()),
            ]
        );
    }

    #[test]
    fn test_heading_clamped_to_three() {
        let blocks = content("#### Too Deep");
        assert_eq!(blocks, vec![Block::heading(3, "Too Deep", plain())]);
    }

    #[test]
    fn test_hashtag_is_not_heading() {
        let blocks = content("#rust is fun");
        assert_eq!(blocks, vec![Block::paragraph("#rust is fun")]);
    }

    #[test]
    fn test_code_fence_integrity() {
        let blocks = content("```js\nconsole.log(1)\n```");
        assert_eq!(
            blocks,
            vec![Block::Code {
                text: "console.log(1)".to_string(),
                language: "js".to_string(),
            }]
        );
    }

    #[test]
    fn test_code_fence_preserves_inner_lines() {
        let blocks = content("```python\ndef f():\n    return 1\n\nprint(f())\n```\nafter");
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            Block::Code {
                text: "def f():\n    return 1\n\nprint(f())".to_string(),
                language: "python".to_string(),
            }
        );
        assert_eq!(blocks[1], Block::paragraph("after"));
    }

    #[test]
    fn test_unterminated_fence_consumes_rest() {
        let blocks = content("```\nabc");
        assert_eq!(
            blocks,
            vec![Block::Code {
                text: "abc".to_string(),
                language: PLAIN_TEXT.to_string(),
            }]
        );
    }

    #[test]
    fn test_list_paragraph_boundary() {
        let blocks = content("line one\nline two\n\n- item");
        assert_eq!(
            blocks,
            vec![
                Block::paragraph("line one\nline two"),
                Block::BulletedItem {
                    text: "item".to_string(),
                    style: plain(),
                },
            ]
        );
    }

    #[test]
    fn test_bullet_markers_and_indent() {
        let blocks = content("- dash\n* star\n+ plus\n - indented");
        let texts: Vec<_> = blocks.iter().filter_map(Block::text).collect();
        assert_eq!(texts, vec!["dash", "star", "plus", "indented"]);
        assert!(blocks
            .iter()
            .all(|b| matches!(b, Block::BulletedItem { .. })));
    }

    #[test]
    fn test_todo_items() {
        let blocks = content("- [ ] write tests\n- [x] ship\n- [link] not a task");
        assert_eq!(
            blocks,
            vec![
                Block::Todo {
                    text: "write tests".to_string(),
                    checked: false,
                },
                Block::Todo {
                    text: "ship".to_string(),
                    checked: true,
                },
                Block::BulletedItem {
                    text: "[link] not a task".to_string(),
                    style: plain(),
                },
            ]
        );
    }

    #[test]
    fn test_numbered_and_quote() {
        let blocks = content("1. first\n12. twelfth\n> wise words");
        assert_eq!(
            blocks,
            vec![
                Block::NumberedItem {
                    text: "first".to_string(),
                    style: plain(),
                },
                Block::NumberedItem {
                    text: "twelfth".to_string(),
                    style: plain(),
                },
                Block::Quote {
                    text: "wise words".to_string(),
                    style: plain(),
                },
            ]
        );
    }

    #[test]
    fn test_image_and_malformed_image() {
        let blocks = content("![A cat](https://example.com/cat.png)\n\n![no url]");
        assert_eq!(
            blocks,
            vec![
                Block::Image {
                    url: "https://example.com/cat.png".to_string(),
                    caption: "A cat".to_string(),
                },
                Block::paragraph("![no url]"),
            ]
        );
    }

    #[test]
    fn test_image_with_empty_caption() {
        let blocks = content("![](https://example.com/a.png)");
        assert_eq!(
            blocks,
            vec![Block::Image {
                url: "https://example.com/a.png".to_string(),
                caption: String::new(),
            }]
        );
    }

    #[test]
    fn test_dividers() {
        let blocks = content("---\n***\n___\n--");
        assert_eq!(
            blocks,
            vec![
                Block::Divider,
                Block::Divider,
                Block::Divider,
                Block::paragraph("--"),
            ]
        );
    }

    #[test]
    fn test_blank_lines_never_produce_blocks() {
        let blocks = content("\n\n   \npara\n\n\n");
        assert_eq!(blocks, vec![Block::paragraph("para")]);
        assert!(content("").is_empty());
    }

    #[test]
    fn test_block_interrupts_paragraph() {
        let blocks = content("intro\n## Section\nbody");
        assert_eq!(
            blocks,
            vec![
                Block::paragraph("intro"),
                Block::heading(2, "Section", plain()),
                Block::paragraph("body"),
            ]
        );
    }

    #[test]
    fn test_inline_style_whole_block() {
        let blocks = content("some **bold** and `code` here");
        assert_eq!(
            blocks,
            vec![Block::Paragraph {
                text: "some **bold** and `code` here".to_string(),
                style: InlineStyle {
                    bold: true,
                    italic: false,
                    strikethrough: false,
                    code: true,
                },
            }]
        );
    }

    #[test]
    fn test_inline_style_counts_block_marker() {
        let blocks = content("* a *b*\n- **loud** item\n# *Title*\n> ~~old~~");
        assert!(matches!(&blocks[0], Block::BulletedItem { style, .. } if !style.italic));
        assert!(matches!(&blocks[1], Block::BulletedItem { style, .. } if style.bold));
        assert!(matches!(&blocks[2], Block::Heading { style, .. } if style.italic));
        assert!(matches!(&blocks[3], Block::Quote { style, .. } if style.strikethrough));
    }

    #[test]
    fn test_detect_inline_style() {
        assert!(detect_inline_style("*soft* voice").italic);
        assert!(!detect_inline_style("5 * 3").italic);
        assert!(detect_inline_style("~~gone~~").strikethrough);
        assert!(!detect_inline_style("**unbalanced").bold);
        let both = detect_inline_style("***loud***");
        assert!(both.bold && both.italic);
        assert!(detect_inline_style("plain").is_plain());
    }

    #[test]
    fn test_full_page_header() {
        let context = ConvertContext {
            title: Some("My Post".to_string()),
            author: Some("Ada".to_string()),
            date: Some("2024-05-01".to_string()),
        };
        let blocks = convert("Hello", &context);
        assert_eq!(
            blocks,
            vec![
                Block::heading(1, "My Post", plain()),
                Block::paragraph("Ada · 2024-05-01"),
                Block::Divider,
                Block::paragraph("Hello"),
            ]
        );
    }

    #[test]
    fn test_full_page_header_partial_context() {
        let context = ConvertContext {
            title: Some("Only Title".to_string()),
            author: None,
            date: Some("  ".to_string()),
        };
        let blocks = convert("", &context);
        assert_eq!(
            blocks,
            vec![Block::heading(1, "Only Title", plain()), Block::Divider]
        );
    }
}
