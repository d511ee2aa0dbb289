//! Visual grounding over an OpenAI-compatible vision endpoint.
//!
//! Grounding models (OS-Atlas, ShowUI, UI-TARS ...) answer with either a box
//! `(x1,y1),(x2,y2)` or a point `(x,y)`, optionally wrapped in
//! `<|box_start|>`/`<|box_end|>` markers, in a 0–1000 normalized space.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::GroundingConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};
use crate::perception::screenshot::Screenshot;
use crate::perception::traits::VisualLocator;
use crate::perception::types::{FrameMeta, NormalizedBox, Point};

static BOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*\)\s*,\s*\(\s*(\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*\)")
        .expect("box regex must be valid")
});

static POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*\)").expect("point regex must be valid")
});

const GROUNDING_SCALE: f32 = 1000.0;

pub struct GroundingClient {
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GroundingClient {
    pub fn new(api_base: String, model: String, api_key: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    /// API key from config, overridden by `DESKPILOT_GROUNDING_API_KEY`.
    pub fn from_config(cfg: &GroundingConfig) -> Self {
        let api_key = std::env::var("DESKPILOT_GROUNDING_API_KEY")
            .unwrap_or_else(|_| cfg.api_key.clone().unwrap_or_default());
        Self::new(cfg.api_base.clone(), cfg.model.clone(), api_key)
    }

    fn build_messages(description: &str, frame: &Screenshot) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: frame.data_url(),
                    },
                },
                ContentPart::Text {
                    text: format!(
                        "In this UI screenshot, what is the position of the element \
                         corresponding to the command \"{description}\" (with bbox)?"
                    ),
                },
            ]),
            tool_call_id: None,
            tool_calls: None,
        }]
    }
}

#[async_trait]
impl VisualLocator for GroundingClient {
    async fn locate(&self, description: &str, frame: &Screenshot) -> DeskPilotResult<Option<Point>> {
        let meta = frame
            .meta
            .ok_or_else(|| DeskPilotError::Grounding("frame dimensions unknown".into()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::build_messages(description, frame),
            "temperature": 0,
            "stream": false,
        });
        tracing::debug!(model = %self.model, description = %description, "grounding request");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Grounding(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let answer = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");
        let point = parse_grounding_answer(answer, &meta);
        tracing::info!(description = %description, answer = %answer, ?point, "grounding answer");
        Ok(point)
    }
}

/// Converts a grounding model's answer to pixel coordinates of the frame.
/// Anything unparseable is "no match".
pub fn parse_grounding_answer(answer: &str, meta: &FrameMeta) -> Option<Point> {
    if let Some(caps) = BOX_RE.captures(answer) {
        let raw: Vec<&str> = (1..=4).filter_map(|i| caps.get(i)).map(|m| m.as_str()).collect();
        let v: Vec<f32> = raw.iter().filter_map(|r| r.parse().ok()).collect();
        if v.len() == 4 {
            let scale = detect_scale(&raw, &v);
            let bbox = NormalizedBox([v[0] / scale, v[1] / scale, v[2] / scale, v[3] / scale]);
            return clamp(bbox.center_physical(meta), meta);
        }
    }
    if let Some(caps) = POINT_RE.captures(answer) {
        let raw = [caps.get(1)?.as_str(), caps.get(2)?.as_str()];
        let x: f32 = raw[0].parse().ok()?;
        let y: f32 = raw[1].parse().ok()?;
        let scale = detect_scale(&raw, &[x, y]);
        let bbox = NormalizedBox([x / scale, y / scale, x / scale, y / scale]);
        return clamp(bbox.center_physical(meta), meta);
    }
    None
}

/// Some servers already return 0–1 floats. Integer answers are always on
/// the 0–1000 grid, even near the origin.
fn detect_scale(raw: &[&str], values: &[f32]) -> f32 {
    if raw.iter().any(|r| r.contains('.')) && values.iter().all(|v| *v <= 1.0) {
        1.0
    } else {
        GROUNDING_SCALE
    }
}

fn clamp(p: Point, meta: &FrameMeta) -> Option<Point> {
    let inside = p.x >= 0 && p.y >= 0 && (p.x as u32) <= meta.width && (p.y as u32) <= meta.height;
    inside.then_some(p)
}
