/// Failures that can arise while driving a module through the pass: either
/// a bad configuration caught up front, or a [`byfl_runtime::RuntimeError`]
/// surfaced while executing the instrumented instruction stream.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum PassError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("runtime error")]
    Runtime(#[from] byfl_runtime::RuntimeError),
}

/// Configuration failures raised at pass initialization (spec.md §4.1
/// "Fails with ConfigError if both include and exclude lists are
/// non-empty, or if call-stack tracking is enabled without per-function
/// tracking").
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("--include and --exclude are mutually exclusive, but both were given")]
    IncludeExcludeConflict,

    #[error("call-stack tracking requires per-function tracking to also be enabled")]
    CallStackWithoutPerFunc,

    #[error("reuse-distance tracking requires a maximum window, but none was given")]
    ReuseDistanceWithoutWindow,
}
