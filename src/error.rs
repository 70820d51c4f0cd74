use thiserror::Error;

/// Allocation failure. This is the only way heap operations, weak counter creation included,
/// can fail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("Out of memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },
    #[error("Unsupported alignment: {align} bytes")]
    UnsupportedAlignment { align: usize },
}

pub type AllocResult<T> = Result<T, AllocError>;
