use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Timed out after {seconds:.1}s waiting for {what}")]
    Timeout { what: String, seconds: f64 },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Cache store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for ScraperError {
    fn from(err: rusqlite::Error) -> Self {
        ScraperError::Store(err.to_string())
    }
}

impl ScraperError {
    pub fn timeout(what: impl Into<String>, after: std::time::Duration) -> Self {
        ScraperError::Timeout {
            what: what.into(),
            seconds: after.as_secs_f64(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
