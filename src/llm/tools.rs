use serde_json::{json, Map, Value};

use crate::executor::actions::{ActionName, ActionVocabulary, ScrollMode};
use crate::llm::types::{FunctionDef, ToolDef};

pub const COMPUTER_TOOL: &str = "computer";

/// The single `computer` tool, shaped by the vocabulary and scroll mode.
pub fn computer_tool(vocabulary: &ActionVocabulary, scroll: ScrollMode) -> ToolDef {
    let mut properties = Map::new();
    properties.insert(
        "action".into(),
        json!({
            "type": "string",
            "enum": vocabulary.names(),
            "description": "The action to perform on the desktop.",
        }),
    );
    properties.insert(
        "coordinate".into(),
        json!({
            "type": "array",
            "items": { "type": "number" },
            "minItems": 2,
            "maxItems": 2,
            "description": "[x, y] pixel coordinate, required by mouse_move.",
        }),
    );
    properties.insert(
        "text".into(),
        json!({
            "type": "string",
            "description": text_description(vocabulary),
        }),
    );

    if vocabulary.contains(ActionName::MouseScroll) {
        let (key, schema) = match scroll {
            ScrollMode::Direction => (
                "scroll_direction",
                json!({
                    "type": "string",
                    "enum": ["up", "down"],
                    "description": "Scroll direction for mouse_scroll; defaults to down.",
                }),
            ),
            ScrollMode::Amount => (
                "scroll_amount",
                json!({
                    "type": "integer",
                    "description": "Scroll clicks for mouse_scroll; negative scrolls up.",
                }),
            ),
        };
        properties.insert(key.into(), schema);
    }

    if vocabulary.contains(ActionName::RunCommand) {
        properties.insert(
            "command".into(),
            json!({ "type": "string", "description": "Shell command for run_command." }),
        );
        properties.insert(
            "background".into(),
            json!({
                "type": "boolean",
                "description": "Run the command without waiting for it to finish.",
            }),
        );
    }

    ToolDef {
        def_type: "function".into(),
        function: FunctionDef {
            name: COMPUTER_TOOL.into(),
            description: "Use a mouse and keyboard to interact with the computer and take screenshots."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": Value::Object(properties),
                "required": ["action"],
            }),
        },
    }
}

fn text_description(vocabulary: &ActionVocabulary) -> String {
    let mut users = vec!["type (text to enter)", "key (e.g. \"ctrl+l\", \"Return\")"];
    if vocabulary.contains(ActionName::LocateItem) {
        users.push("locate_item (description of the item to find)");
    }
    format!("Required by {}.", users.join(", "))
}
