use serde_json::{Value, json};

use crate::peer::tab_group::TAB_CONTEXT_TOOL;

/// Tools advertised through `tools/list`. Invocations are forwarded to the
/// browser host unchanged, so this list is declarative only.
#[must_use]
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": TAB_CONTEXT_TOOL,
            "description": "Get context about the tabs in the shared tab group. Creates the group if it does not exist yet.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "createIfEmpty": {
                        "type": "boolean",
                        "description": "Create a tab group when none exists"
                    }
                }
            }
        }),
        json!({
            "name": "tabs_create_mcp",
            "description": "Open a new empty tab in the shared tab group.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "navigate",
            "description": "Navigate a tab to a URL, or go back/forward in its history.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "URL, or \"back\" / \"forward\""},
                    "tabId": {"type": "number"}
                },
                "required": ["url", "tabId"]
            }
        }),
        json!({
            "name": "read_page",
            "description": "Return an accessibility tree of the page.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tabId": {"type": "number"},
                    "filter": {"type": "string", "enum": ["interactive", "all"]}
                },
                "required": ["tabId"]
            }
        }),
        json!({
            "name": "find",
            "description": "Find elements on the page with a natural language query.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "tabId": {"type": "number"}
                },
                "required": ["query", "tabId"]
            }
        }),
        json!({
            "name": "form_input",
            "description": "Set the value of a form element.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "ref": {"type": "string"},
                    "value": {},
                    "tabId": {"type": "number"}
                },
                "required": ["ref", "value", "tabId"]
            }
        }),
        json!({
            "name": "computer",
            "description": "Mouse, keyboard and screenshot actions on a tab.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": {"type": "string"},
                    "coordinate": {"type": "array", "items": {"type": "number"}},
                    "text": {"type": "string"},
                    "tabId": {"type": "number"}
                },
                "required": ["action", "tabId"]
            }
        }),
        json!({
            "name": "get_page_text",
            "description": "Extract the main text content of the page.",
            "inputSchema": {
                "type": "object",
                "properties": {"tabId": {"type": "number"}},
                "required": ["tabId"]
            }
        }),
        json!({
            "name": "javascript_tool",
            "description": "Execute JavaScript in the page context.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "tabId": {"type": "number"}
                },
                "required": ["text", "tabId"]
            }
        }),
    ]
}
