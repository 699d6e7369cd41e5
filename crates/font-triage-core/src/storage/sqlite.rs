use super::RecordStore;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < 1 {
            debug!("Schema version {} < 1, creating tables", version);
        }
        self.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM record;
             DELETE FROM meta;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn put(&self, collection: &str, entries: &[(String, String)]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let count = insert_entries(&tx, collection, entries)?;
        tx.commit()?;
        debug!("Upserted {} records into '{}'", count, collection);
        Ok(count)
    }

    fn get_all(&self, collection: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM record WHERE collection = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn clear(&self, collection: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM record WHERE collection = ?1", params![collection])?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_meta(&self, key: &str, value: &str) -> Result<()> {
        write_meta(&self.conn, key, value)?;
        Ok(())
    }

    fn replace_collection(
        &self,
        collection: &str,
        entries: &[(String, String)],
        meta: (&str, &str),
    ) -> Result<usize> {
        // Dropping the transaction without commit rolls everything back.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM record WHERE collection = ?1", params![collection])?;
        let count = insert_entries(&tx, collection, entries)?;
        write_meta(&tx, meta.0, meta.1)?;
        tx.commit()?;
        debug!("Replaced '{}' with {} records", collection, count);
        Ok(count)
    }
}

fn insert_entries(
    conn: &Connection,
    collection: &str,
    entries: &[(String, String)],
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO record (collection, key, value) VALUES (?1, ?2, ?3) \
         ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value",
    )?;
    let mut count = 0;
    for (key, value) in entries {
        count += stmt.execute(params![collection, key, value])?;
    }
    Ok(count)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value, updated_at) VALUES (?1, ?2, ?3)",
        params![key, value, now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_put_and_get_all_ordered_by_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put("reference", &entries(&[("b/two", "2"), ("a/one", "1")]))
            .unwrap();
        store.put("other", &entries(&[("a/zero", "0")])).unwrap();

        let all = store.get_all("reference").unwrap();
        assert_eq!(all, entries(&[("a/one", "1"), ("b/two", "2")]));
    }

    #[test]
    fn test_replace_collection_swaps_records_and_meta() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .replace_collection("reference", &entries(&[("old", "x")]), ("index", "v1"))
            .unwrap();
        let count = store
            .replace_collection(
                "reference",
                &entries(&[("new1", "y"), ("new2", "z")]),
                ("index", "v2"),
            )
            .unwrap();

        assert_eq!(count, 2);
        let keys: Vec<String> = store
            .get_all("reference")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["new1".to_string(), "new2".to_string()]);
        assert_eq!(store.get_meta("index").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_clear_and_missing_meta() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("intents", &entries(&[("k", "v")])).unwrap();
        store.clear("intents").unwrap();
        assert!(store.get_all("intents").unwrap().is_empty());
        assert_eq!(store.get_meta("nothing").unwrap(), None);
    }

    #[test]
    fn test_truncate_all() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("reference", &entries(&[("k", "v")])).unwrap();
        store.put_meta("index", "{}").unwrap();
        store.truncate_all().unwrap();
        assert!(store.get_all("reference").unwrap().is_empty());
        assert_eq!(store.get_meta("index").unwrap(), None);
    }
}
