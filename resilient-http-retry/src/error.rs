use thiserror::Error;

/// Errors raised while reading a retry policy document.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid retry policy document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid url pattern `{pattern}`: {source}")]
    InvalidUrlPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
