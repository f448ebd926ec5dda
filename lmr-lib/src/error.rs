#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A message constructor is already registered for the discriminator.
    #[error("constructor already registered for {0}")]
    DuplicateDiscriminator(String),

    #[error("invalid sync pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown message class: {0}")]
    UnknownClass(String),

    #[error("unknown detector variant: {0}")]
    UnknownVariant(String),

    #[error("calibration failed: {0}")]
    Calibration(String),

    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
