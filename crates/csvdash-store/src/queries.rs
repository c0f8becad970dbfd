use crate::Database;
use anyhow::Result;
use rusqlite::OptionalExtension;

impl Database {
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (key, value),
            )?;
            Ok(())
        })
    }

    pub fn remove_value(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, KeyValueStore};

    #[test]
    fn set_get_remove() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get("token").unwrap(), None);

        db.set("token", "abc").unwrap();
        assert_eq!(db.get("token").unwrap().as_deref(), Some("abc"));

        db.set("token", "def").unwrap();
        assert_eq!(db.get("token").unwrap().as_deref(), Some("def"));

        db.remove("token").unwrap();
        assert_eq!(db.get("token").unwrap(), None);
    }

    #[test]
    fn removing_a_missing_key_is_fine() {
        let db = Database::open_in_memory().unwrap();
        db.remove("user").unwrap();
    }

    #[test]
    fn survives_reopen() {
        let dir = std::env::temp_dir().join(format!("csvdash-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.db");
        {
            let db = Database::open(&path).unwrap();
            db.set("user", r#"{"id":1}"#).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get("user").unwrap().as_deref(), Some(r#"{"id":1}"#));
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
