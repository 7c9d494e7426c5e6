use thiserror::Error;

/// Invalid-state errors raised by explicit tape lifecycle checks.
///
/// Domain errors (log of a negative number, division by zero) are *not*
/// errors here — they propagate as NaN/Inf forward values like ordinary
/// floating point. `TapeError` only covers contract violations that the
/// original design left undefined: mismatched nested scopes and recovery
/// marks that no longer describe the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TapeError {
    /// `recover_nested` was called with no matching `start_nested`.
    #[error("recover_nested called with no open nested scope")]
    NoNestedScope,

    /// A mark refers to a tape region that has already been recovered.
    #[error("mark is stale: recorded lengths exceed the current tape")]
    StaleMark,

    /// A node references an operand with a creation index at or above its
    /// own — the tape is not in reverse-topological order.
    #[error("node {node} references an operand created later than itself")]
    OperandOrder {
        /// Index of the offending node in the chaining sequence.
        node: usize,
    },
}
