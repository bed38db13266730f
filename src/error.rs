// Error types shared by the library modules.
//
// The binaries convert these into `anyhow::Error` at the edge; inside the
// library every fallible operation returns `crate::Result<T>`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The operation needs a logged-in session and none is active.
    #[error("authentication required: log in with --session-string, --login-username/--login-password or --browser-login")]
    AuthenticationRequired,

    /// The upstream lookup for a user reported failure.
    #[error("failed to fetch data for user '{username}': {reason}")]
    Retrieval { username: String, reason: String },

    #[error("{0}")]
    Login(String),

    #[error("session string could not be decoded")]
    InvalidSessionString,

    #[error("no username provided")]
    NoUsername,

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
