use thiserror::Error;

/// Errors surfaced by the public API.
///
/// `E` is the backend's own error type; it is only ever wrapped, never
/// inspected by the store itself.
#[derive(Debug, Error)]
pub enum KvsError<E> {
    /// Null/unmounted store, malformed configuration, or an out-of-range
    /// offset passed to `entry_read`.
    #[error("invalid argument")]
    InvalidArg,

    /// No live (non-tombstone) entry exists for the requested key.
    #[error("key not found")]
    NotFound,

    /// The entry would not fit even after `block_count` compaction passes.
    #[error("no space left in store")]
    NoSpace,

    /// `mount` was called on an already-mounted store, or `erase` on a
    /// mounted one.
    #[error("store is already mounted")]
    AlreadyMounted,

    /// A walk callback returned the stop sentinel. Not a failure; callers
    /// that don't care can ignore it.
    #[error("walk stopped by callback")]
    UserStop,

    /// The backend's `read`/`prog`/`comp`/`sync` returned an error.
    #[error("backend I/O error: {0}")]
    Io(#[source] E),
}

pub type KvsResult<T, E> = Result<T, KvsError<E>>;
