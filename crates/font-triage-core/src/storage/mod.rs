pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;

/// Collection holding serialized `ReferenceRecord`s.
pub const REFERENCE_COLLECTION: &str = "reference";
/// Collection holding persisted pending intents (paths and names only).
pub const INTENT_COLLECTION: &str = "intents";

/// Minimal key/value contract the engine needs from a persistent store.
///
/// Values are opaque strings; `get_all` returns entries ordered by key so
/// that anything built from it iterates deterministically.
pub trait RecordStore: Send {
    fn put(&self, collection: &str, entries: &[(String, String)]) -> Result<usize>;

    fn get_all(&self, collection: &str) -> Result<Vec<(String, String)>>;

    fn clear(&self, collection: &str) -> Result<()>;

    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    fn put_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Clear `collection`, write `entries` and the metadata record as one
    /// unit. On error nothing previously committed may change.
    fn replace_collection(
        &self,
        collection: &str,
        entries: &[(String, String)],
        meta: (&str, &str),
    ) -> Result<usize>;
}
