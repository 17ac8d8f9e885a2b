use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A credential needed to talk to the platform is not set.
    #[error("Missing credential: {name} (set it in pregen.toml or the {env} environment variable)")]
    MissingCredential { name: &'static str, env: &'static str },
}

impl CoreError {
    /// Short error code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::MissingCredential { .. } => "MISSING_CREDENTIAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
