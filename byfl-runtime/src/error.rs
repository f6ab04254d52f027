use thiserror::Error;

/// Errors raised by the counter and aggregation engine and the memory
/// tracking engines it owns.
///
/// Per spec.md §7, `InternalError` is the only kind of failure these
/// engines can produce in normal operation; allocation failure is left to
/// abort the process rather than being modeled as a `Result`, matching the
/// original library's behavior.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A splay-tree node's `weight` field did not match
    /// `1 + weight(left) + weight(right)`. Only raised by the debug-only
    /// validation routine.
    #[error("reuse-distance splay tree weight inconsistency at node with time {time}: recorded weight {recorded}, expected {expected}")]
    SplayWeightMismatch {
        time: u64,
        recorded: u64,
        expected: u64,
    },

    /// The reuse-distance clock wrapped around and produced a timestamp
    /// already present in the tree. Per spec.md §9(c) this can only happen
    /// on `u64` overflow of the access clock.
    #[error("reuse-distance clock collided with an existing timestamp {0}; the access counter must have wrapped around")]
    DuplicateTimestamp(u64),
}
