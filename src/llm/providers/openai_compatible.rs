use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::sync::mpsc;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::{LlmProvider, ModelStream};
use crate::llm::sse_parser::{self, SseFrame};
use crate::llm::types::{
    CallConfig, ChatMessage, FinishReason, FunctionCall, ModelEvent, ToolCall, ToolDef,
};

const STREAM_BUFFER: usize = 64;

/// Tool call accumulator: delta index → (id, type, name, accumulated_arguments)
type ToolCallBuilders = BTreeMap<usize, (String, String, String, String)>;

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> DeskPilotResult<ModelStream> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": true,
            "temperature": cfg.temperature,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(&tools)?;
            body["tool_choice"] = serde_json::json!("auto");
        }

        tracing::debug!(provider = %self.id, model = %cfg.model, "sending LLM request");
        tracing::trace!(body = %sanitized_for_log(&body), "request body (base64 omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeskPilotError::LlmProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(classify_failure(Some(status), &format!("{status}: {err_body}")));
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let provider = self.id.clone();
        tokio::spawn(async move {
            pump_stream(response, tx, &provider).await;
        });
        Ok(rx)
    }
}

/// Reads the SSE body and forwards events until `[DONE]`, an error, or the
/// receiver going away.
async fn pump_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<DeskPilotResult<ModelEvent>>,
    provider: &str,
) {
    let mut byte_stream = response.bytes_stream();
    let mut line_buf: Vec<u8> = Vec::new();
    let mut tc_builders = ToolCallBuilders::new();
    let mut finish: Option<FinishReason> = None;
    let mut saw_done = false;
    let mut content_len = 0usize;

    'stream: while let Some(result) = byte_stream.next().await {
        let bytes = match result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(Err(DeskPilotError::LlmProvider(e.to_string()))).await;
                return;
            }
        };
        line_buf.extend_from_slice(&bytes);

        while let Some(pos) = line_buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = line_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let frames = match sse_parser::parse_sse_line(line) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::debug!("SSE parse skipped: {e}");
                    continue;
                }
            };
            for frame in frames {
                match frame {
                    SseFrame::Content(text) => {
                        content_len += text.len();
                        if tx.send(Ok(ModelEvent::TextDelta(text))).await.is_err() {
                            tracing::debug!(provider, "stream receiver dropped");
                            return;
                        }
                    }
                    SseFrame::ToolCallDeltas(deltas) => merge_tool_call_deltas(&deltas, &mut tc_builders),
                    SseFrame::Finish(reason) => finish = Some(FinishReason::from_wire(&reason)),
                    SseFrame::Error { message, code } => {
                        let status = code
                            .as_deref()
                            .and_then(|c| c.parse::<u16>().ok())
                            .and_then(|c| StatusCode::from_u16(c).ok());
                        let _ = tx.send(Err(classify_failure(status, &message))).await;
                        return;
                    }
                    SseFrame::Done => {
                        saw_done = true;
                        break 'stream;
                    }
                }
            }
        }
    }

    let tool_calls = build_tool_calls(tc_builders);
    tracing::info!(
        provider,
        content_len,
        tool_calls = tool_calls.len(),
        tools = ?tool_calls.iter().map(|tc| tc.function.name.as_str()).collect::<Vec<_>>(),
        "LLM stream complete"
    );

    let reason = match end_of_stream(finish, saw_done, !tool_calls.is_empty()) {
        Ok(reason) => reason,
        Err(e) => {
            tracing::warn!(provider, content_len, "stream closed without a finish reason");
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    for call in tool_calls {
        if tx.send(Ok(ModelEvent::ToolCall(call))).await.is_err() {
            return;
        }
    }
    let _ = tx.send(Ok(ModelEvent::Finished(reason))).await;
}

/// A body that closes with neither `[DONE]` nor a `finish_reason` was cut off.
fn end_of_stream(
    finish: Option<FinishReason>,
    saw_done: bool,
    has_tool_calls: bool,
) -> DeskPilotResult<FinishReason> {
    match finish {
        Some(reason) => Ok(reason),
        None if !saw_done => Err(DeskPilotError::LlmProvider(
            "model stream ended before completion".into(),
        )),
        None if has_tool_calls => Ok(FinishReason::ToolCalls),
        None => Ok(FinishReason::Stop),
    }
}

/// Rate limiting is the one provider failure an operator can act on.
pub fn classify_failure(status: Option<StatusCode>, message: &str) -> DeskPilotError {
    let lower = message.to_ascii_lowercase();
    if status == Some(StatusCode::TOO_MANY_REQUESTS)
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
    {
        DeskPilotError::ProviderRateLimited(message.to_string())
    } else {
        DeskPilotError::LlmProvider(message.to_string())
    }
}

/// Copy of the request body with image payloads replaced, for logging only.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for part in msgs
            .iter_mut()
            .filter_map(|m| m.get_mut("content").and_then(|c| c.as_array_mut()))
            .flatten()
        {
            if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                part["image_url"]["url"] = serde_json::Value::String("<omitted_base64_image>".into());
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

/// Merge streaming tool-call delta fragments into the accumulator map (keyed by delta index).
fn merge_tool_call_deltas(deltas: &[serde_json::Value], builders: &mut ToolCallBuilders) {
    for delta in deltas {
        let idx = delta["index"].as_u64().unwrap_or(0) as usize;
        let entry = builders.entry(idx).or_default();

        if let Some(id) = delta["id"].as_str().filter(|s| !s.is_empty()) {
            entry.0 = id.to_string();
        }
        if let Some(t) = delta["type"].as_str().filter(|s| !s.is_empty()) {
            entry.1 = t.to_string();
        }
        if let Some(name) = delta["function"]["name"].as_str() {
            entry.2.push_str(name);
        }
        if let Some(args) = delta["function"]["arguments"].as_str() {
            entry.3.push_str(args);
        }
    }
}

/// Convert accumulated tool-call builders into typed `ToolCall` structs.
/// Providers that omit ids get a generated one so results can be paired.
fn build_tool_calls(builders: ToolCallBuilders) -> Vec<ToolCall> {
    builders
        .into_values()
        .filter(|(_, _, name, _)| !name.is_empty())
        .map(|(id, call_type, name, arguments)| ToolCall {
            id: if id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                id
            },
            call_type: if call_type.is_empty() {
                "function".to_string()
            } else {
                call_type
            },
            function: FunctionCall {
                name,
                arguments: if arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    arguments
                },
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fragments_merge_by_index() {
        let mut builders = ToolCallBuilders::new();
        merge_tool_call_deltas(
            &[json!({"index":0,"id":"c1","type":"function","function":{"name":"computer","arguments":"{\"action\":"}})],
            &mut builders,
        );
        merge_tool_call_deltas(
            &[json!({"index":0,"function":{"arguments":"\"screenshot\"}"}})],
            &mut builders,
        );
        let calls = build_tool_calls(builders);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.arguments, r#"{"action":"screenshot"}"#);
    }

    #[test]
    fn missing_id_is_generated() {
        let mut builders = ToolCallBuilders::new();
        merge_tool_call_deltas(&[json!({"function":{"name":"computer"}})], &mut builders);
        let calls = build_tool_calls(builders);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn truncated_stream_is_an_error() {
        assert!(matches!(
            end_of_stream(None, false, false),
            Err(DeskPilotError::LlmProvider(_))
        ));
        assert!(end_of_stream(None, false, true).is_err());
        assert_eq!(end_of_stream(None, true, true).unwrap(), FinishReason::ToolCalls);
        assert_eq!(end_of_stream(None, true, false).unwrap(), FinishReason::Stop);
        assert_eq!(
            end_of_stream(Some(FinishReason::Length), false, false).unwrap(),
            FinishReason::Length
        );
    }

    #[test]
    fn rate_limits_are_distinct() {
        assert!(classify_failure(Some(StatusCode::TOO_MANY_REQUESTS), "slow down").is_rate_limited());
        assert!(classify_failure(None, "Rate limit exceeded for model").is_rate_limited());
        assert!(!classify_failure(Some(StatusCode::BAD_GATEWAY), "upstream").is_rate_limited());
    }

    #[test]
    fn log_body_hides_images() {
        let body = json!({"messages":[{"role":"user","content":[{"type":"image_url","image_url":{"url":"data:image/png;base64,AAAA"}}]}]});
        let out = sanitized_for_log(&body);
        assert!(out.contains("<omitted_base64_image>"));
        assert!(!out.contains("AAAA"));
    }
}
