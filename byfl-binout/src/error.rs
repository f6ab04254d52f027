use std::io;

/// Failure taxonomy for writing and parsing Byfl binary-output files
/// (spec.md §7: `IoError`, `FormatError`, `OutOfMemory`).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum BinoutError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("malformed binary output: {0}")]
    Format(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl BinoutError {
    pub fn format(message: impl Into<String>) -> Self {
        BinoutError::Format(message.into())
    }
}
