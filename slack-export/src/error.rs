use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlackError>;

/// Errors raised while talking to the Slack Web API or writing its data.
#[derive(Debug, Error)]
pub enum SlackError {
    /// The token was rejected. No channel can succeed after this.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Throttled by the server, retried by the pagination loop.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// `ok: false` with an error code that is neither auth nor throttling.
    #[error("API error: {0}")]
    Api(String),

    #[error("unexpected response format: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlackError {
    /// Whether the whole run must stop, rather than just the current channel.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SlackError::Auth(_))
    }

    /// Maps an `error` code from a `{"ok": false}` body.
    pub fn from_api_code(code: &str, retry_after: Option<Duration>) -> Self {
        match code {
            "invalid_auth" | "not_authed" | "token_revoked" | "token_expired"
            | "account_inactive" | "no_permission" | "missing_scope" => {
                SlackError::Auth(code.to_string())
            }
            "ratelimited" => SlackError::RateLimited { retry_after },
            _ => SlackError::Api(code.to_string()),
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(e: serde_json::Error) -> Self {
        SlackError::Format(e.to_string())
    }
}
