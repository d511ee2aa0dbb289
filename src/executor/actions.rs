use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::input::normalize_key_combo;
use crate::perception::screenshot::Screenshot;
use crate::perception::types::Point;
use crate::sandbox::types::{ClickKind, ScrollDirection};

/// Every action name the `computer` tool can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    Screenshot,
    Type,
    CursorPosition,
    LeftClick,
    RightClick,
    DoubleClick,
    MiddleClick,
    Key,
    MouseMove,
    MouseScroll,
    LocateItem,
    RunCommand,
}

impl ActionName {
    /// Offered to every model.
    pub const BASE: [ActionName; 10] = [
        ActionName::Screenshot,
        ActionName::Type,
        ActionName::CursorPosition,
        ActionName::LeftClick,
        ActionName::RightClick,
        ActionName::DoubleClick,
        ActionName::MiddleClick,
        ActionName::Key,
        ActionName::MouseMove,
        ActionName::MouseScroll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Screenshot => "screenshot",
            ActionName::Type => "type",
            ActionName::CursorPosition => "cursor_position",
            ActionName::LeftClick => "left_click",
            ActionName::RightClick => "right_click",
            ActionName::DoubleClick => "double_click",
            ActionName::MiddleClick => "middle_click",
            ActionName::Key => "key",
            ActionName::MouseMove => "mouse_move",
            ActionName::MouseScroll => "mouse_scroll",
            ActionName::LocateItem => "locate_item",
            ActionName::RunCommand => "run_command",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::BASE
            .iter()
            .chain([ActionName::LocateItem, ActionName::RunCommand].iter())
            .find(|a| a.as_str() == name)
            .copied()
    }
}

/// Ordered set of actions a model may issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionVocabulary(Vec<ActionName>);

impl ActionVocabulary {
    pub fn new(actions: Vec<ActionName>) -> Self {
        Self(actions)
    }

    pub fn contains(&self, action: ActionName) -> bool {
        self.0.contains(&action)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|a| a.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionName> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrollMode {
    /// `scroll_direction` (optional, defaults to down).
    #[default]
    Direction,
    /// `scroll_amount` (required, negative scrolls up).
    Amount,
}

#[derive(Debug, Clone, Copy)]
pub struct ScrollPolicy {
    pub mode: ScrollMode,
    pub default_amount: u32,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            mode: ScrollMode::Direction,
            default_amount: 1,
        }
    }
}

/// A validated model-issued action. Consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Screenshot,
    Type { text: String },
    Key { combo: String },
    CursorPosition,
    Click(ClickKind),
    MouseMove(Point),
    MouseScroll { direction: ScrollDirection, amount: u32 },
    LocateItem { description: String },
    RunCommand { command: String, background: bool },
}

#[derive(Debug, Default, Deserialize)]
struct RawArgs {
    action: Option<String>,
    coordinate: Option<Vec<serde_json::Value>>,
    text: Option<String>,
    scroll_direction: Option<String>,
    scroll_amount: Option<i64>,
    command: Option<String>,
    background: Option<bool>,
}

impl ActionRequest {
    pub fn name(&self) -> ActionName {
        match self {
            ActionRequest::Screenshot => ActionName::Screenshot,
            ActionRequest::Type { .. } => ActionName::Type,
            ActionRequest::Key { .. } => ActionName::Key,
            ActionRequest::CursorPosition => ActionName::CursorPosition,
            ActionRequest::Click(ClickKind::Left) => ActionName::LeftClick,
            ActionRequest::Click(ClickKind::Right) => ActionName::RightClick,
            ActionRequest::Click(ClickKind::Middle) => ActionName::MiddleClick,
            ActionRequest::Click(ClickKind::Double) => ActionName::DoubleClick,
            ActionRequest::MouseMove(_) => ActionName::MouseMove,
            ActionRequest::MouseScroll { .. } => ActionName::MouseScroll,
            ActionRequest::LocateItem { .. } => ActionName::LocateItem,
            ActionRequest::RunCommand { .. } => ActionName::RunCommand,
        }
    }

    /// Validates raw `computer` tool arguments against `vocabulary`.
    /// Failures are `InvalidArgument` with a message the model can act on.
    pub fn parse(
        args: &serde_json::Value,
        vocabulary: &ActionVocabulary,
        scroll: &ScrollPolicy,
    ) -> DeskPilotResult<Self> {
        let raw: RawArgs = serde_json::from_value(args.clone())
            .map_err(|e| invalid(format!("malformed arguments: {e}")))?;

        let action_str = raw.action.as_deref().unwrap_or_default();
        let action = ActionName::parse(action_str)
            .filter(|a| vocabulary.contains(*a))
            .ok_or_else(|| {
                invalid(format!(
                    "action `{action_str}` is not available; use one of: {}",
                    vocabulary.names().join(", ")
                ))
            })?;

        let text = raw.text.filter(|t| !t.is_empty());

        Ok(match action {
            ActionName::Screenshot => ActionRequest::Screenshot,
            ActionName::CursorPosition => ActionRequest::CursorPosition,
            ActionName::LeftClick => ActionRequest::Click(ClickKind::Left),
            ActionName::RightClick => ActionRequest::Click(ClickKind::Right),
            ActionName::MiddleClick => ActionRequest::Click(ClickKind::Middle),
            ActionName::DoubleClick => ActionRequest::Click(ClickKind::Double),
            ActionName::Type => ActionRequest::Type {
                text: text.ok_or_else(|| invalid("no text provided"))?,
            },
            ActionName::Key => {
                let combo = text.ok_or_else(|| invalid("no key provided"))?;
                ActionRequest::Key {
                    combo: normalize_key_combo(&combo)?,
                }
            }
            ActionName::MouseMove => {
                ActionRequest::MouseMove(parse_coordinate(raw.coordinate.as_deref())?)
            }
            ActionName::MouseScroll => parse_scroll(
                raw.scroll_direction.as_deref(),
                raw.scroll_amount,
                scroll,
            )?,
            ActionName::LocateItem => ActionRequest::LocateItem {
                description: text.ok_or_else(|| invalid("no search text provided"))?,
            },
            ActionName::RunCommand => ActionRequest::RunCommand {
                command: raw
                    .command
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| invalid("no command provided"))?,
                background: raw.background.unwrap_or(false),
            },
        })
    }
}

fn invalid(msg: impl Into<String>) -> DeskPilotError {
    DeskPilotError::InvalidArgument(msg.into())
}

fn parse_coordinate(raw: Option<&[serde_json::Value]>) -> DeskPilotResult<Point> {
    let values = raw.ok_or_else(|| invalid("no coordinate provided"))?;
    let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    match nums.as_slice() {
        [x, y] if values.len() == 2 && *x >= 0.0 && *y >= 0.0 => {
            Ok(Point::new(x.round() as i32, y.round() as i32))
        }
        _ => Err(invalid("coordinate must be [x, y] with non-negative numbers")),
    }
}

fn parse_scroll(
    direction: Option<&str>,
    amount: Option<i64>,
    policy: &ScrollPolicy,
) -> DeskPilotResult<ActionRequest> {
    match policy.mode {
        ScrollMode::Direction => {
            let direction = match direction {
                None => ScrollDirection::default(),
                Some("up") => ScrollDirection::Up,
                Some("down") => ScrollDirection::Down,
                Some(other) => {
                    return Err(invalid(format!(
                        "scroll_direction must be \"up\" or \"down\", got \"{other}\""
                    )))
                }
            };
            Ok(ActionRequest::MouseScroll {
                direction,
                amount: policy.default_amount,
            })
        }
        ScrollMode::Amount => {
            let amount = amount
                .filter(|a| *a != 0)
                .ok_or_else(|| invalid("no scroll_amount provided"))?;
            let direction = if amount < 0 {
                ScrollDirection::Up
            } else {
                ScrollDirection::Down
            };
            Ok(ActionRequest::MouseScroll {
                direction,
                amount: u32::try_from(amount.unsigned_abs()).unwrap_or(u32::MAX),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    InvalidArgument,
    NotFound,
    Sandbox,
    Grounding,
}

impl ActionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionErrorKind::InvalidArgument => "invalid_argument",
            ActionErrorKind::NotFound => "not_found",
            ActionErrorKind::Sandbox => "sandbox",
            ActionErrorKind::Grounding => "grounding",
        }
    }
}

/// Outcome of one dispatched action, in model-consumable form.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Text(String),
    Coordinate(Point),
    Image(Screenshot),
    Error { kind: ActionErrorKind, message: String },
}

/// What the model is shown for a result.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelContent {
    Text(String),
    Image(Screenshot),
}

impl ActionResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        ActionResult::Error {
            kind: ActionErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ActionErrorKind> {
        match self {
            ActionResult::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Text form; images are summarized.
    pub fn to_text(&self) -> String {
        match self {
            ActionResult::Text(text) => text.clone(),
            ActionResult::Coordinate(p) => serde_json::json!({
                "coordinate": [p.x, p.y],
                "message": format!("Found item at coordinates: {}, {}", p.x, p.y),
            })
            .to_string(),
            ActionResult::Image(_) => "Screenshot taken".to_string(),
            ActionResult::Error { kind, message } => format!("error[{}]: {message}", kind.as_str()),
        }
    }

    pub fn into_content(self) -> ModelContent {
        match self {
            ActionResult::Image(frame) => ModelContent::Image(frame),
            other => ModelContent::Text(other.to_text()),
        }
    }
}
