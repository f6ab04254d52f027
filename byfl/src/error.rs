use std::io;

/// Top-level failure for the `byfl` binary: wraps every error this crate's
/// library dependencies can raise, so `main` has a single `Result` to match
/// on (`samply/src/main.rs`'s pattern of one `eprintln!` + `exit(1)` site
/// per action, rather than several).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Pass(#[from] byfl_pass::PassError),

    #[error(transparent)]
    Binout(#[from] byfl_binout::BinoutError),
}
