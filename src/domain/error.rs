use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BotError {
    #[error("Not a valid magnet or torrent URL")]
    InvalidInput,

    #[error("A download is already running for this user")]
    SessionActive,

    #[error("Failed to launch download engine: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authorization store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for BotError {
    fn from(e: std::io::Error) -> Self {
        BotError::Io(e.to_string())
    }
}
