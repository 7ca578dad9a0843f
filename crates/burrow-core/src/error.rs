use thiserror::Error;

#[derive(Debug, Error)]
pub enum BurrowError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BurrowError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            BurrowError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BurrowError>;
