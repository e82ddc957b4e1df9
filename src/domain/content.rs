use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed content item returned to the remote caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentItem {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    #[must_use]
    pub fn success(content: Vec<ContentItem>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Tool failures travel as ordinary results so the caller sees them as content.
    #[must_use]
    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            content: vec![ContentItem::text(format!("Error: {}", message.as_ref()))],
            is_error: true,
        }
    }
}

/// Normalizes a peer `content` value into typed items.
///
/// Strings become one text item, objects and arrays are read item by item, and
/// anything unrecognized is rendered as a text item holding its JSON.
#[must_use]
pub fn content_from_value(value: &Value) -> Vec<ContentItem> {
    match value {
        Value::Null => Vec::new(),
        Value::String(text) => vec![ContentItem::text(text.clone())],
        Value::Array(items) => items.iter().map(read_item).collect(),
        other => vec![read_item(other)],
    }
}

/// Text of an error payload, which the peer sends either as a string or as content items.
#[must_use]
pub fn error_message_from_value(value: &Value) -> String {
    let text = content_from_value(value)
        .into_iter()
        .filter_map(|item| match item {
            ContentItem::Text { text } => Some(text),
            ContentItem::Image { .. } => None,
        })
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        "tool execution failed".to_owned()
    } else {
        text
    }
}

fn read_item(value: &Value) -> ContentItem {
    if let Value::String(text) = value {
        return ContentItem::text(text.clone());
    }

    let Some(obj) = value.as_object() else {
        return ContentItem::text(value.to_string());
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("text") => match obj.get("text").and_then(Value::as_str) {
            Some(text) => ContentItem::text(text),
            None => ContentItem::text(value.to_string()),
        },
        Some("image") => {
            let data = obj.get("data").and_then(Value::as_str);
            let mime_type = obj
                .get("mimeType")
                .or_else(|| obj.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            match data {
                Some(data) => ContentItem::Image {
                    data: data.to_owned(),
                    mime_type: mime_type.to_owned(),
                },
                None => ContentItem::text(value.to_string()),
            }
        }
        _ => ContentItem::text(value.to_string()),
    }
}
