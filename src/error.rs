//! Error types shared across the indexing engine.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by every public operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures reported by an index backend.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("sqlite index error: {0}")]
    Sqlite(String),

    #[error("index entry {variant_identity} could not be decoded: {reason}")]
    Corrupt {
        variant_identity: String,
        reason: String,
    },

    #[error("index backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures caused by the shape of the content tree or its names.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The ancestry of a node did not terminate within the configured depth.
    #[error("malformed tree: ancestry of node {identity} exceeds {max_depth} levels")]
    MalformedTree { identity: String, max_depth: usize },

    #[error("invalid workspace name {name:?}: {reason}")]
    InvalidWorkspaceName { name: String, reason: &'static str },
}

/// Failures while loading configuration or node type definitions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Error {
    /// Whether this error only affects a single node and a batch may continue.
    pub fn is_node_local(&self) -> bool {
        matches!(self, Error::Tree(_))
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(error: sqlx::Error) -> Self {
        IndexError::Sqlite(error.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::Index(error.into())
    }
}
