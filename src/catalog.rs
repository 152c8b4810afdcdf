//! SQLite-backed catalog of every file a run examined.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record::FileRecord;

/// One catalog row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub codec_or_mime: Option<String>,
    pub category: String,
    pub converted: bool,
}

pub struct Catalog {
    conn: Connection,
    path: PathBuf,
}

impl Catalog {
    /// Open the catalog file, creating it and its table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| write_error(path, e))?;
        let catalog = Self {
            conn,
            path: path.to_path_buf(),
        };
        catalog.initialize_schema()?;
        Ok(catalog)
    }

    /// In-memory catalog for tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|e| write_error(&path, e))?;
        let catalog = Self { conn, path };
        catalog.initialize_schema()?;
        Ok(catalog)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    codec_or_mime TEXT,
                    category TEXT NOT NULL,
                    converted INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );
                "#,
            )
            .map_err(|e| write_error(&self.path, e))
    }

    /// Upsert one row per record, keyed by path, in a single transaction.
    pub fn write(&mut self, records: &[FileRecord]) -> Result<()> {
        let path = self.path.clone();
        let now = Utc::now().to_rfc3339();

        // All rows or none
        let tx = self.conn.transaction().map_err(|e| write_error(&path, e))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO files (name, codec_or_mime, category, converted, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(name) DO UPDATE SET
                        codec_or_mime = excluded.codec_or_mime,
                        category = excluded.category,
                        converted = excluded.converted,
                        updated_at = excluded.updated_at",
                )
                .map_err(|e| write_error(&path, e))?;

            for record in records {
                stmt.execute(params![
                    record.path.to_string_lossy().into_owned(),
                    record.codec_or_mime(),
                    record.category.as_str(),
                    record.converted,
                    now,
                ])
                .map_err(|e| write_error(&path, e))?;
            }
        }
        tx.commit().map_err(|e| write_error(&path, e))?;

        Ok(())
    }

    /// All rows in insertion order.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, codec_or_mime, category, converted FROM files ORDER BY id")
            .map_err(|e| write_error(&self.path, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CatalogEntry {
                    name: row.get(0)?,
                    codec_or_mime: row.get(1)?,
                    category: row.get(2)?,
                    converted: row.get(3)?,
                })
            })
            .map_err(|e| write_error(&self.path, e))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| write_error(&self.path, e))?);
        }
        Ok(entries)
    }
}

fn write_error(path: &Path, source: rusqlite::Error) -> Error {
    Error::CatalogWrite {
        path: path.to_path_buf(),
        source,
    }
}
