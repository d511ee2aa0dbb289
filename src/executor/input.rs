// Key-chord normalization for the sandbox's xdotool-style `hotkey`.
use crate::errors::{DeskPilotError, DeskPilotResult};

/// Normalizes a model-written chord (`Ctrl+L`, `enter`, `cmd + shift + t`)
/// into the keysym names the remote desktop expects (`ctrl+l`, `Return`,
/// `super+shift+t`).
pub fn normalize_key_combo(combo: &str) -> DeskPilotResult<String> {
    let keys: Vec<&str> = combo.split('+').map(str::trim).collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(DeskPilotError::InvalidArgument(format!(
            "malformed key combination \"{combo}\""
        )));
    }
    Ok(keys.into_iter().map(keysym).collect::<Vec<_>>().join("+"))
}

fn keysym(key: &str) -> String {
    let lower = key.to_ascii_lowercase();
    let mapped = match lower.as_str() {
        "ctrl" | "control" => "ctrl",
        "alt" | "option" => "alt",
        "shift" => "shift",
        "cmd" | "command" | "super" | "win" | "meta" => "super",
        "enter" | "return" => "Return",
        "esc" | "escape" => "Escape",
        "tab" => "Tab",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" => "Page_Up",
        "pagedown" | "page_down" => "Page_Down",
        "up" | "arrowup" => "Up",
        "down" | "arrowdown" => "Down",
        "left" | "arrowleft" => "Left",
        "right" | "arrowright" => "Right",
        _ => {
            // F-keys keep their case; single characters go lower-case.
            if lower.len() > 1 && lower.starts_with('f') && lower[1..].chars().all(|c| c.is_ascii_digit()) {
                return lower.to_ascii_uppercase();
            }
            if key.chars().count() == 1 {
                return lower;
            }
            return key.to_string();
        }
    };
    mapped.to_string()
}
