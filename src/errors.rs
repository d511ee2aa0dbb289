use thiserror::Error;

pub const RATE_LIMIT_NOTICE: &str = "Rate limit reached. Please wait a few seconds and try again.";
pub const SESSION_ENDED_NOTICE: &str =
    "The desktop session has ended. Start a new session to continue.";
pub const GENERIC_NOTICE: &str = "An error occurred. Please try again.";

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session gone: {0}")]
    SessionGone(String),

    #[error("Provider rate limited: {0}")]
    ProviderRateLimited(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Grounding error: {0}")]
    Grounding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl DeskPilotError {
    /// Ends the current turn; the operator has to start a new session.
    pub fn is_session_gone(&self) -> bool {
        matches!(self, DeskPilotError::SessionGone(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DeskPilotError::ProviderRateLimited(_))
    }

    /// The only text an operator ever sees for a failed turn.
    pub fn operator_notice(&self) -> &'static str {
        match self {
            DeskPilotError::ProviderRateLimited(_) => RATE_LIMIT_NOTICE,
            DeskPilotError::SessionGone(_) => SESSION_ENDED_NOTICE,
            _ => GENERIC_NOTICE,
        }
    }
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_never_leak_transport_text() {
        let err = DeskPilotError::LlmProvider("connection reset by peer".into());
        assert_eq!(err.operator_notice(), GENERIC_NOTICE);

        let err = DeskPilotError::ProviderRateLimited("429".into());
        assert_eq!(err.operator_notice(), RATE_LIMIT_NOTICE);
        assert!(err.is_rate_limited());

        let err = DeskPilotError::SessionGone("sbx-1".into());
        assert_eq!(err.operator_notice(), SESSION_ENDED_NOTICE);
        assert!(err.is_session_gone());
    }

    #[test]
    fn serializes_as_display_string() {
        let err = DeskPilotError::NotFound("sbx-9".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Session not found: sbx-9\"");
    }
}
