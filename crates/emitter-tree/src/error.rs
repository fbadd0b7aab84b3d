use thiserror::Error;

/// Errors returned by mutating operations on emitters.
///
/// All of these are immediate, synchronous failures at the call site; a
/// rejected operation leaves the emitter's contents and its pending
/// modification buffer untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitterError {
    /// A mutating call arrived on an emitter that has already been disposed.
    #[error("emitter already disposed")]
    Disposed,
    /// An index argument is outside the container's current bounds.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    /// A range argument has `start > end` or reaches past the end.
    #[error("invalid range {start}..{end} (len {len})")]
    InvalidRange { start: usize, end: usize, len: usize },
    /// A write arrived on a computed or unmodifiable-view emitter.
    #[error("write to read-only emitter")]
    ReadOnly,
    /// A list was asked to grow without a configured fill value.
    #[error("cannot grow list: no fill value configured")]
    MissingFillValue,
    /// A keyed update referenced a key that is not present.
    #[error("key not found")]
    MissingKey,
    /// A selection index does not refer to an existing element.
    #[error("selection index {index} out of bounds (len {len})")]
    InvalidSelection { index: usize, len: usize },
}
