//! Notion block and property encoding

use serde_json::{json, Map, Value};

use super::{Properties, PropertyValue};
use crate::convert::PLAIN_TEXT;
use crate::models::{Block, InlineStyle};

/// Notion rejects rich-text runs longer than this many characters
pub const MAX_TEXT_LENGTH: usize = 2000;

/// Languages the Notion code block accepts
const LANGUAGES: &[&str] = &[
    "abap", "arduino", "bash", "basic", "c", "clojure", "coffeescript", "c++", "c#", "css",
    "dart", "diff", "docker", "elixir", "elm", "erlang", "flow", "fortran", "f#", "gherkin",
    "glsl", "go", "graphql", "groovy", "haskell", "html", "java", "javascript", "json", "julia",
    "kotlin", "latex", "less", "lisp", "livescript", "lua", "makefile", "markdown", "markup",
    "matlab", "mermaid", "nix", "objective-c", "ocaml", "pascal", "perl", "php", "plain text",
    "powershell", "prolog", "protobuf", "python", "r", "reason", "ruby", "rust", "sass", "scala",
    "scheme", "scss", "shell", "sql", "swift", "typescript", "vb.net", "verilog", "vhdl",
    "visual basic", "webassembly", "xml", "yaml",
];

/// Map a fence language tag onto a Notion code language
///
/// Common short aliases are expanded; unknown tags become `plain text`.
pub fn notion_language(tag: &str) -> &'static str {
    let tag = tag.trim().to_lowercase();
    let alias = match tag.as_str() {
        "js" | "jsx" | "mjs" | "node" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" | "python3" => "python",
        "sh" | "zsh" | "console" | "shell-session" => "shell",
        "yml" => "yaml",
        "rs" => "rust",
        "md" => "markdown",
        "cpp" | "cc" | "cxx" | "hpp" => "c++",
        "cs" | "csharp" => "c#",
        "fs" | "fsharp" => "f#",
        "golang" => "go",
        "rb" => "ruby",
        "kt" | "kts" => "kotlin",
        "dockerfile" => "docker",
        "objc" | "objectivec" => "objective-c",
        "proto" => "protobuf",
        "tex" => "latex",
        "make" => "makefile",
        "ps" | "ps1" | "pwsh" => "powershell",
        "htm" => "html",
        "text" | "txt" | "plaintext" | "plain" => PLAIN_TEXT,
        other => other,
    };

    LANGUAGES
        .iter()
        .find(|lang| **lang == alias)
        .copied()
        .unwrap_or(PLAIN_TEXT)
}

fn annotations(style: InlineStyle) -> Value {
    json!({
        "bold": style.bold,
        "italic": style.italic,
        "strikethrough": style.strikethrough,
        "underline": false,
        "code": style.code,
        "color": "default",
    })
}

/// Split text into runs no longer than `max` characters
fn chunks(text: &str, max: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max {
            parts.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

/// Encode text as Notion rich-text runs sharing one style
///
/// Empty text yields no runs.
pub fn rich_text(text: &str, style: InlineStyle) -> Vec<Value> {
    chunks(text, MAX_TEXT_LENGTH)
        .into_iter()
        .map(|part| {
            json!({
                "type": "text",
                "text": { "content": part },
                "annotations": annotations(style),
            })
        })
        .collect()
}

fn text_block(kind: &str, text: &str, style: InlineStyle) -> Value {
    let mut block = Map::new();
    block.insert("object".to_string(), json!("block"));
    block.insert("type".to_string(), json!(kind));
    block.insert(
        kind.to_string(),
        json!({ "rich_text": rich_text(text, style) }),
    );
    Value::Object(block)
}

/// Encode a block as a Notion block object
pub fn block_to_json(block: &Block) -> Value {
    match block {
        Block::Heading { level, text, style } => {
            let kind = format!("heading_{}", (*level).clamp(1, 3));
            text_block(&kind, text, *style)
        }
        Block::Paragraph { text, style } => text_block("paragraph", text, *style),
        Block::BulletedItem { text, style } => text_block("bulleted_list_item", text, *style),
        Block::NumberedItem { text, style } => text_block("numbered_list_item", text, *style),
        Block::Quote { text, style } => text_block("quote", text, *style),
        Block::Code { text, language } => json!({
            "object": "block",
            "type": "code",
            "code": {
                "rich_text": rich_text(text, InlineStyle::default()),
                "language": notion_language(language),
            },
        }),
        Block::Divider => json!({
            "object": "block",
            "type": "divider",
            "divider": {},
        }),
        Block::Image { url, caption } => json!({
            "object": "block",
            "type": "image",
            "image": {
                "type": "external",
                "external": { "url": url },
                "caption": rich_text(caption, InlineStyle::default()),
            },
        }),
        Block::Todo { text, checked } => json!({
            "object": "block",
            "type": "to_do",
            "to_do": {
                "rich_text": rich_text(text, InlineStyle::default()),
                "checked": checked,
            },
        }),
    }
}

/// Encode one property value
pub fn property_to_json(value: &PropertyValue) -> Value {
    let plain = InlineStyle::default();
    match value {
        PropertyValue::Title(text) => json!({ "title": rich_text(text, plain) }),
        PropertyValue::RichText(text) => json!({ "rich_text": rich_text(text, plain) }),
        PropertyValue::Date(start) => json!({ "date": { "start": start } }),
        PropertyValue::Select(name) => json!({ "select": { "name": name } }),
        PropertyValue::MultiSelect(names) => {
            let options: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
            json!({ "multi_select": options })
        }
        PropertyValue::Checkbox(checked) => json!({ "checkbox": checked }),
        PropertyValue::Raw(raw) => raw.clone(),
    }
}

/// Encode a full property set
pub fn properties_to_json(properties: &Properties) -> Value {
    let map: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), property_to_json(value)))
        .collect();
    Value::Object(map)
}

/// Concatenated plain text of a title or rich-text property from a page
pub fn property_plain_text(property: &Value) -> Option<String> {
    let runs = property
        .get("rich_text")
        .or_else(|| property.get("title"))?
        .as_array()?;

    let text: String = runs
        .iter()
        .filter_map(|run| {
            run.get("plain_text")
                .or_else(|| run.pointer("/text/content"))
                .and_then(Value::as_str)
        })
        .collect();
    Some(text)
}
