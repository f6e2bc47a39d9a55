use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use crate::errors::KevError;
use super::schema::CREATE_TABLES;

pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &Path) -> Result<Self, KevError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| KevError::Database(format!("Failed to open checkpoint database: {}", e)))?;

        // WAL plus FULL sync: a committed checkpoint survives power loss
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(|e| KevError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, KevError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KevError::Database(format!("Failed to open in-memory db: {}", e)))?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), KevError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| KevError::Database(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self { conn: self.conn.clone() }
    }
}
