use thiserror::Error;

pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors that abort a whole merge call.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no items to merge")]
    NoItems,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("jpeg encode failed: {0}")]
    Encode(String),

    #[error("render task failed: {0}")]
    Task(String),

    #[error("invalid config file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        MergeError::InvalidConfiguration(msg.into())
    }
}

/// A single source that could not be turned into a drawable surface.
/// Logged and isolated to its slot; never returned from `merge`.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("fetch failed: {0}")]
    Remote(String),

    #[error("remote sources require the `remote` feature")]
    RemoteUnsupported,

    #[error("image has no pixels")]
    EmptySurface,
}

/// A single cell that could not be painted.
#[derive(Debug, Error, PartialEq)]
pub enum DrawError {
    #[error("source surface is empty")]
    EmptySurface,

    #[error("invalid placement {width}x{height} at ({x}, {y})")]
    InvalidPlacement {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

/// Font data that failed to parse.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid font data for {0}")]
    Invalid(String),
}
