//! Supported models and what each one can do.
//!
//! Everything model-specific (action vocabulary, system prompt, tool schema)
//! is derived from one row of [`CAPABILITIES`]; nothing else branches on
//! model identifiers.

use serde::Serialize;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::{ActionName, ActionVocabulary, ScrollMode};
use crate::sandbox::types::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Sonnet,
    Gpt4o,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Can point at on-screen items by itself; otherwise `locate_item` is offered.
    pub has_native_grounding: bool,
    /// Gets the `run_command` action.
    pub supports_background_commands: bool,
}

/// Model picker entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub kind: ModelKind,
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const CAPABILITIES: [(ModelKind, Capabilities); 3] = [
    (
        ModelKind::Sonnet,
        Capabilities {
            has_native_grounding: true,
            supports_background_commands: true,
        },
    ),
    (
        ModelKind::Gpt4o,
        Capabilities {
            has_native_grounding: false,
            supports_background_commands: true,
        },
    ),
    (
        ModelKind::Gemini,
        Capabilities {
            has_native_grounding: false,
            supports_background_commands: false,
        },
    ),
];

const CATALOGUE: [ModelInfo; 3] = [
    ModelInfo {
        kind: ModelKind::Sonnet,
        id: "sonnet",
        name: "Claude 3.5 Sonnet",
        description: "Anthropic Claude 3.5 Sonnet Model",
    },
    ModelInfo {
        kind: ModelKind::Gpt4o,
        id: "gpt4o",
        name: "GPT-4o",
        description: "OpenAI's GPT-4o Model",
    },
    ModelInfo {
        kind: ModelKind::Gemini,
        id: "gemini",
        name: "Gemini 2.0 Flash",
        description: "Google Gemini 2.0 Flash Model",
    },
];

/// All selectable models, in picker order.
pub fn models() -> &'static [ModelInfo] {
    &CATALOGUE
}

impl ModelKind {
    pub fn from_id(id: &str) -> DeskPilotResult<Self> {
        CATALOGUE
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.kind)
            .ok_or_else(|| DeskPilotError::Config(format!("unsupported model '{id}'")))
    }

    pub fn info(self) -> &'static ModelInfo {
        CATALOGUE
            .iter()
            .find(|m| m.kind == self)
            .unwrap_or(&CATALOGUE[0])
    }

    pub fn id(self) -> &'static str {
        self.info().id
    }

    pub fn capabilities(self) -> Capabilities {
        CAPABILITIES
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, c)| *c)
            .unwrap_or(Capabilities {
                has_native_grounding: false,
                supports_background_commands: false,
            })
    }

    pub fn vocabulary(self) -> ActionVocabulary {
        let caps = self.capabilities();
        let mut actions = ActionName::BASE.to_vec();
        if !caps.has_native_grounding {
            actions.push(ActionName::LocateItem);
        }
        if caps.supports_background_commands {
            actions.push(ActionName::RunCommand);
        }
        ActionVocabulary::new(actions)
    }

    pub fn system_prompt(self, resolution: Resolution, scroll: ScrollMode) -> String {
        system_prompt(self.capabilities(), resolution, scroll)
    }
}

/// Vocabulary for a model identifier. Depends on nothing but the identifier.
pub fn vocabulary_for(model_id: &str) -> DeskPilotResult<ActionVocabulary> {
    Ok(ModelKind::from_id(model_id)?.vocabulary())
}

fn system_prompt(caps: Capabilities, resolution: Resolution, scroll: ScrollMode) -> String {
    let mut capability_lines = vec![
        "* You can interact with the GUI using mouse movements, click-based actions, and keyboard input.".to_string(),
        "* You can type text and run key commands.".to_string(),
        "* You have full access to a Linux system with internet connectivity.".to_string(),
        "* The system is already running and you can interact with it.".to_string(),
    ];
    capability_lines.push(match scroll {
        ScrollMode::Direction => {
            "* Scroll with mouse_scroll and an optional scroll_direction (\"up\" or \"down\", default down).".to_string()
        }
        ScrollMode::Amount => {
            "* Scroll with mouse_scroll and a scroll_amount (negative scrolls up).".to_string()
        }
    });
    if !caps.has_native_grounding {
        capability_lines.push(
            "* You can find items on the screen using the locate_item action of the computer tool; it returns their coordinates.".to_string(),
        );
    }
    if caps.supports_background_commands {
        capability_lines.push(
            "* You can run shell commands with run_command; set background to true for long-running programs.".to_string(),
        );
    }
    capability_lines.push(format!("* Screen resolution is {resolution}."));
    capability_lines.push("* The system uses x86_64 architecture.".to_string());
    capability_lines.push(
        "* You should execute one tool at a time and wait for its output before proceeding.".to_string(),
    );

    format!(
        "<SYSTEM>
You are a computer use agent on an Ubuntu Linux virtual machine.

<SYSTEM_CAPABILITY>
{capabilities}
</SYSTEM_CAPABILITY>

<BROWSER_USAGE>
When asked to use Firefox or perform web tasks:
1. Open Firefox if it is not already running and take a screenshot to confirm it is open.
2. Dismiss welcome screens with \"Return\" or \"Escape\"; do not import settings or change the default browser.
3. Once Firefox is ready, press \"ctrl+l\", type the URL or search query and press \"Return\".
4. Wait for pages to load before interacting further.
</BROWSER_USAGE>

<BEST_PRACTICES>
* Verify applications are open before interacting with them.
* Take screenshots to confirm important states and actions.
* Prefer keyboard shortcuts over clicking UI elements.
* Wait for elements to fully load before interacting.
* If an action does not work, try a keyboard shortcut before clicking again.
</BEST_PRACTICES>

<KEY_SHORTCUTS>
* ctrl+l: focus the browser address bar
* Return: confirm
* Escape: cancel or close dialogs
* ctrl+w: close the current tab
* alt+F4: close the application
</KEY_SHORTCUTS>
</SYSTEM>",
        capabilities = capability_lines.join("\n")
    )
}
