//! The record contract

/// A uniquely identified entity stored and queried by a [`crate::store::Store`].
///
/// Identifiers must be non-zero; the store rejects 0.
pub trait Record: Send + Sync + 'static {
    /// Stable, process-unique identifier
    fn id(&self) -> i64;

    /// Caches expensive derived values on the record itself.
    ///
    /// Invoked exactly once per insert and once per update, before indexing.
    fn compute_fields(&mut self) {}
}
