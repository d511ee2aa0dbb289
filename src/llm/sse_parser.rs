use crate::errors::{DeskPilotError, DeskPilotResult};

/// Pieces of one OpenAI-compatible SSE `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Content(String),
    /// Raw `delta.tool_calls` fragments, merged by index downstream.
    ToolCallDeltas(Vec<serde_json::Value>),
    Finish(String),
    /// In-band `{"error": ...}` object.
    Error { message: String, code: Option<String> },
    Done,
}

/// Parses a raw SSE line. Keep-alives and non-data lines yield nothing.
/// A single line may carry content and a finish reason together.
pub fn parse_sse_line(line: &str) -> DeskPilotResult<Vec<SseFrame>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(Vec::new());
    };

    if data == "[DONE]" {
        return Ok(vec![SseFrame::Done]);
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| DeskPilotError::SseParsing(e.to_string()))?;

    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        let message = err["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        let code = match &err["code"] {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => err["type"].as_str().map(str::to_string),
        };
        return Ok(vec![SseFrame::Error { message, code }]);
    }

    let mut frames = Vec::new();
    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(frames);
    };
    let delta = &first["delta"];

    if let Some(tool_calls) = delta["tool_calls"].as_array().filter(|t| !t.is_empty()) {
        frames.push(SseFrame::ToolCallDeltas(tool_calls.clone()));
    }
    if let Some(content) = delta["content"].as_str().filter(|c| !c.is_empty()) {
        frames.push(SseFrame::Content(content.to_string()));
    }
    if let Some(reason) = first["finish_reason"].as_str() {
        frames.push(SseFrame::Finish(reason.to_string()));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_keepalives_and_comments() {
        assert!(parse_sse_line("").unwrap().is_empty());
        assert!(parse_sse_line(": ping").unwrap().is_empty());
        assert!(parse_sse_line("event: message").unwrap().is_empty());
    }

    #[test]
    fn content_and_finish_in_one_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":"stop"}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            vec![SseFrame::Content("Hi".into()), SseFrame::Finish("stop".into())]
        );
    }

    #[test]
    fn tool_call_fragments_pass_through() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"computer","arguments":""}}]}}]}"#;
        match parse_sse_line(line).unwrap().as_slice() {
            [SseFrame::ToolCallDeltas(d)] => assert_eq!(d[0]["id"], "c1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn in_band_error_object() {
        let line = r#"data: {"error":{"message":"Rate limit exceeded","code":429}}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            vec![SseFrame::Error {
                message: "Rate limit exceeded".into(),
                code: Some("429".into())
            }]
        );
    }

    #[test]
    fn done_marker_and_bad_json() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), vec![SseFrame::Done]);
        assert!(parse_sse_line("data: {not json").is_err());
    }
}
