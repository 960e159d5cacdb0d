use thiserror::Error;

/// All errors produced by vrb-core.
///
/// Only construction paths return these. Ring transfers and arena allocation
/// report exhaustion through counts and `Option` instead.
#[derive(Debug, Error)]
pub enum VrbError {
    #[error("requested ring capacity {requested} cannot be rounded to a power of two")]
    CapacityOverflow { requested: usize },

    #[error("memory arena could not obtain a backing region of {size} bytes")]
    ArenaAllocation { size: usize },

    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VrbError>;
