use serde::{Deserialize, Serialize};

use crate::executor::actions::{ActionResult, ModelContent};
use crate::llm::types::{ChatMessage, ContentPart, FunctionCall, ImageUrl, MessageContent, ToolCall};
use crate::perception::screenshot::Screenshot;

pub const SCREENSHOT_CAPTION: &str = "Screenshot taken";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        mime_type: String,
    },
    ToolCall {
        call_id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }
}

/// Ordered, append-only record of one exchange. Lives for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Appends a user turn carrying exactly one Image Part.
    pub fn push_screenshot(&mut self, frame: &Screenshot) {
        self.turns.push(Turn {
            role: Role::User,
            parts: vec![
                Part::Text {
                    text: SCREENSHOT_CAPTION.to_string(),
                },
                Part::Image {
                    data: frame.bytes.clone(),
                    mime_type: frame.mime_type.clone(),
                },
            ],
        });
    }

    pub fn push_assistant(&mut self, text: String, calls: Vec<Part>) {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text { text });
        }
        parts.extend(calls);
        self.turns.push(Turn {
            role: Role::Assistant,
            parts,
        });
    }

    /// Records a tool result. An image result becomes a short textual tool
    /// result plus one screenshot turn, so the frame enters the conversation
    /// exactly once.
    pub fn record_result(&mut self, call_id: &str, result: &ActionResult) {
        self.record_step(&[(call_id.to_string(), result.clone())]);
    }

    /// Records every result of one step. The tool results stay directly
    /// after the assistant turn that issued them; frames follow in order.
    pub fn record_step(&mut self, results: &[(String, ActionResult)]) {
        let mut frames = Vec::new();
        for (call_id, result) in results {
            match result.clone().into_content() {
                ModelContent::Text(content) => {
                    self.push_tool_result(call_id, content, result.is_error())
                }
                ModelContent::Image(frame) => {
                    self.push_tool_result(call_id, SCREENSHOT_CAPTION.to_string(), false);
                    frames.push(frame);
                }
            }
        }
        for frame in &frames {
            self.push_screenshot(frame);
        }
    }

    fn push_tool_result(&mut self, call_id: &str, content: String, is_error: bool) {
        self.turns.push(Turn {
            role: Role::Tool,
            parts: vec![Part::ToolResult {
                call_id: call_id.to_string(),
                content,
                is_error,
            }],
        });
    }

    pub fn image_count(&self) -> usize {
        self.turns
            .iter()
            .flat_map(|t| t.parts.iter())
            .filter(|p| matches!(p, Part::Image { .. }))
            .count()
    }

    /// Wire form for OpenAI-compatible chat completions. Tool messages are
    /// text-only there, so images always travel in user messages.
    pub fn to_chat_messages(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.turns.len() + 1);
        out.push(ChatMessage {
            role: "system".into(),
            content: MessageContent::Text(system_prompt.to_string()),
            tool_call_id: None,
            tool_calls: None,
        });

        for turn in &self.turns {
            match turn.role {
                Role::User => out.push(user_message(&turn.parts)),
                Role::Assistant => out.push(assistant_message(&turn.parts)),
                Role::Tool => {
                    for part in &turn.parts {
                        if let Part::ToolResult { call_id, content, .. } = part {
                            out.push(ChatMessage {
                                role: "tool".into(),
                                content: MessageContent::Text(content.clone()),
                                tool_call_id: Some(call_id.clone()),
                                tool_calls: None,
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

fn user_message(parts: &[Part]) -> ChatMessage {
    let content = match parts {
        [Part::Text { text }] => MessageContent::Text(text.clone()),
        _ => MessageContent::Parts(
            parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(ContentPart::Text { text: text.clone() }),
                    Part::Image { data, mime_type } => Some(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{mime_type};base64,{}", base64_bytes::encode(data)),
                        },
                    }),
                    _ => None,
                })
                .collect(),
        ),
    };
    ChatMessage {
        role: "user".into(),
        content,
        tool_call_id: None,
        tool_calls: None,
    }
}

fn assistant_message(parts: &[Part]) -> ChatMessage {
    let mut text = String::new();
    let mut calls = Vec::new();
    for part in parts {
        match part {
            Part::Text { text: t } => text.push_str(t),
            Part::ToolCall { call_id, name, args } => calls.push(ToolCall {
                id: call_id.clone(),
                call_type: "function".into(),
                function: FunctionCall {
                    name: name.clone(),
                    arguments: args.to_string(),
                },
            }),
            _ => {}
        }
    }
    ChatMessage {
        role: "assistant".into(),
        content: MessageContent::Text(text),
        tool_call_id: None,
        tool_calls: (!calls.is_empty()).then_some(calls),
    }
}

/// Serde adapter storing binary payloads as standard base64 strings.
pub mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::actions::ActionErrorKind;
    use crate::perception::screenshot::png_fixture;

    #[test]
    fn image_result_adds_exactly_one_image_part() {
        let mut conv = Conversation::new();
        conv.push(Turn::user_text("open firefox"));
        let frame = Screenshot::from_png(png_fixture(4, 4));
        conv.record_result("call_1", &ActionResult::Image(frame));

        assert_eq!(conv.image_count(), 1);
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.turns()[1].role, Role::Tool);
        assert_eq!(conv.turns()[2].role, Role::User);
    }

    #[test]
    fn error_result_is_flagged_and_textual() {
        let mut conv = Conversation::new();
        conv.record_result(
            "call_2",
            &ActionResult::Error {
                kind: ActionErrorKind::InvalidArgument,
                message: "no text provided".into(),
            },
        );
        match &conv.turns()[0].parts[0] {
            Part::ToolResult { content, is_error, .. } => {
                assert!(*is_error);
                assert_eq!(content, "error[invalid_argument]: no text provided");
            }
            other => panic!("unexpected part {other:?}"),
        }
        assert_eq!(conv.image_count(), 0);
    }

    #[test]
    fn wire_form_orders_tool_before_screenshot() {
        let mut conv = Conversation::new();
        conv.push(Turn::user_text("hi"));
        conv.push_assistant(
            "taking a look".into(),
            vec![Part::ToolCall {
                call_id: "c1".into(),
                name: "computer".into(),
                args: serde_json::json!({ "action": "screenshot" }),
            }],
        );
        conv.record_result("c1", &ActionResult::Image(Screenshot::from_png(png_fixture(2, 2))));

        let msgs = conv.to_chat_messages("sys");
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "user"]);
        assert_eq!(msgs[2].tool_calls.as_ref().unwrap()[0].function.name, "computer");
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("c1"));
        match &msgs[4].content {
            MessageContent::Parts(parts) => assert!(matches!(
                &parts[1],
                ContentPart::ImageUrl { image_url } if image_url.url.starts_with("data:image/png;base64,")
            )),
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[test]
    fn step_results_stay_adjacent_before_frames() {
        let mut conv = Conversation::new();
        conv.push(Turn::user_text("hi"));
        conv.push_assistant(
            String::new(),
            vec![
                Part::ToolCall {
                    call_id: "c1".into(),
                    name: "computer".into(),
                    args: serde_json::json!({ "action": "screenshot" }),
                },
                Part::ToolCall {
                    call_id: "c2".into(),
                    name: "computer".into(),
                    args: serde_json::json!({ "action": "left_click" }),
                },
            ],
        );
        conv.record_step(&[
            ("c1".into(), ActionResult::Image(Screenshot::from_png(png_fixture(2, 2)))),
            ("c2".into(), ActionResult::invalid("not executed")),
        ]);

        let msgs = conv.to_chat_messages("sys");
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "tool", "user"]);
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msgs[4].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(conv.image_count(), 1);
    }

    #[test]
    fn serde_round_trip_keeps_image_bytes() {
        let mut conv = Conversation::new();
        conv.push_screenshot(&Screenshot::from_png(vec![1, 2, 3]));
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json[0]["parts"][1]["data"], "AQID");
        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back, conv);
    }
}
