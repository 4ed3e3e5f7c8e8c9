/// Failures of a [`CounterStore`](crate::CounterStore).
///
/// Every variant surfaces to callers of the allocator as
/// [`Error::AllocationFailed`](crate::Error::AllocationFailed).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A thread panicked while holding the counter lock.
    ///
    /// When the `parking-lot` feature is enabled, locks do **not** poison, so
    /// this variant is not available.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("counter lock poisoned")]
    LockPoisoned,

    /// The counter reached its maximum value and cannot be incremented.
    #[error("counter exhausted")]
    Overflow,

    /// The store holds data this crate did not write (negative counter,
    /// unknown entity type tag, ...).
    #[error("corrupt counter data: {0}")]
    Corrupt(String),

    /// A table or index name is not a plain SQL identifier.
    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),

    /// The store could not be reached.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The SQLite engine reported an error.
    #[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(not(feature = "parking-lot"))]
// Convert all poisoned lock errors to a simplified `LockPoisoned`
impl<G> From<std::sync::PoisonError<G>> for StoreError {
    fn from(_: std::sync::PoisonError<G>) -> Self {
        Self::LockPoisoned
    }
}
