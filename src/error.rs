use std::path::PathBuf;
use thiserror::Error;

/// Failure fetching a remote script, require or profile.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{scheme}' (only http and https are allowed)")]
    UnsupportedScheme { scheme: String },

    #[error("failed to create HTTP client: {0}")]
    ClientInit(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("failed to connect to {url}")]
    Connect { url: String },

    #[error("HTTP {status} from {url}: {reason}")]
    Status {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("network error: {0}")]
    Network(String),

    #[error("script has no update URL")]
    NoUpdateUrl,
}

/// Failure writing or reading a bundle artifact.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to write bundle artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read bundle artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejected mutation of the launcher configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("profile '{0}' is locked and cannot be modified")]
    Locked(String),

    #[error("unknown game '{0}'")]
    UnknownGame(String),

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("no script at index {0}")]
    UnknownScript(usize),

    #[error("a game with id '{0}' already exists")]
    DuplicateGame(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("no {0} selected")]
    NothingSelected(&'static str),
}

/// Failure persisting the configuration document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure preparing a launch or importing a profile.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to read profile from {path}: {source}")]
    ReadProfile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid profile JSON: {0}")]
    ParseProfile(#[from] serde_json::Error),
}
