use std::time::Duration;

/// Reasons a fetch produced no usable content.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed waiting for command: {source}")]
    Wait { source: std::io::Error },

    #[error("command exited with {status}: {stderr}")]
    Command { status: String, stderr: String },

    #[error("{name}: timed out after {}s", after.as_secs_f64())]
    Timeout { name: String, after: Duration },

    #[error("{name}: request failed: {source}")]
    Http {
        name: String,
        source: reqwest::Error,
    },

    #[error("{name}: upstream answered {status}")]
    Status {
        name: String,
        status: reqwest::StatusCode,
    },

    #[error("{name}: nothing matched selector `{selector}`")]
    NothingExtracted { name: String, selector: String },

    #[error("{name}: summarizer failed: {reason}")]
    Summarize { name: String, reason: String },

    #[error("fetch produced no content")]
    Empty,

    #[error("all {count} sources failed: {summary}")]
    AllSourcesFailed { count: usize, summary: String },
}

/// Invalid command line or environment settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid source `{0}`, expected NAME=URL [SELECTOR]")]
    InvalidSource(String),

    #[error("invalid URL for source `{name}`: {reason}")]
    InvalidUrl { name: String, reason: String },

    #[error("invalid selector `{selector}` for source `{name}`")]
    InvalidSelector { name: String, selector: String },

    #[error("unknown time zone `{0}`")]
    InvalidTimezone(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
