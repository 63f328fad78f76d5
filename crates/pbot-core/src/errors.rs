/// Core error type for the persona bot.
///
/// Adapter crates map their specific errors into this type so the router can
/// degrade every failure into a user-facing text instead of crashing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Session creation failed; nothing was stored for the user.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A send on an existing session failed.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("image decode error: {0}")]
    ImageDecode(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
