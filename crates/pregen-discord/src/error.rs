use pregen_engine::EngineError;

/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("no bot token configured")]
    NoToken,
}

impl From<DiscordError> for EngineError {
    fn from(e: DiscordError) -> Self {
        EngineError::Platform(e.to_string())
    }
}
