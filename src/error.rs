use std::fmt;

/// Typed errors for flow table operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtError {
    /// The entry pool is exhausted or a resource could not be produced
    Resource,
    /// A flow with this id is already in the table
    Exists,
    /// No flow matched the given id
    NotFound,
    /// Invalid internal state, e.g. a malformed message
    Unknown,
}

impl fmt::Display for FtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtError::Resource => write!(f, "Out of resources"),
            FtError::Exists => write!(f, "Flow id already exists"),
            FtError::NotFound => write!(f, "Flow not found"),
            FtError::Unknown => write!(f, "Invalid internal state"),
        }
    }
}

impl std::error::Error for FtError {}
