#![forbid(unsafe_code)]

use super::clock::{MonotonicClock, now_ms};
use super::document::{CollectionQuery, Document, Fields, sort_documents};
use super::error::StoreError;
use super::listeners::{EventSink, Listeners, SnapshotEvent, StoreEvent, Subscription, send};
use super::{BlobStore, DocumentStore, blob_url, generate_document_id, sha256_hex, validate_blob_path};
use boost_core::paths::CollectionPath;
use rusqlite::{Connection, OptionalExtension, params};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_VERSION: i64 = 1;
const DB_FILE_NAME: &str = "boost.db";

/// Durable single-file backend. Listeners are process-local.
pub struct SqliteStore {
    conn: RefCell<Connection>,
    storage_dir: PathBuf,
    listeners: Listeners<CollectionQuery>,
    clock: MonotonicClock,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        let clock = MonotonicClock::system();
        let newest: Option<i64> =
            conn.query_row("SELECT MAX(created_at_ms) FROM documents", [], |row| row.get(0))?;
        if let Some(newest) = newest {
            clock.observe(newest);
        }

        tracing::debug!(dir = %storage_dir.display(), "sqlite store opened");
        Ok(Self {
            conn: RefCell::new(conn),
            storage_dir,
            listeners: Listeners::default(),
            clock,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn live_subscriptions(&self) -> usize {
        self.listeners.len()
    }

    fn read(&self, query: &CollectionQuery) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT id, fields_json, created_at_ms FROM documents WHERE path=?1",
        )?;
        let mut rows = stmt.query(params![query.path.as_str()])?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            let fields_json: String = row.get(1)?;
            docs.push(Document {
                id: row.get(0)?,
                fields: serde_json::from_str(&fields_json)?,
                created_at_ms: row.get(2)?,
            });
        }
        sort_documents(&mut docs, &query.order_by, query.direction);
        Ok(docs)
    }

    fn notify(&self, path: &CollectionPath) {
        for (id, query, sink) in self.listeners.matching(|q| &q.path == path) {
            let result = self.read(&query);
            if let Err(err) = &result {
                tracing::warn!(path = %query.path, error = %err, "snapshot read failed");
            }
            send(
                &sink,
                StoreEvent::Snapshot(SnapshotEvent {
                    subscription: id,
                    path: query.path,
                    result,
                }),
            );
        }
    }
}

impl DocumentStore for SqliteStore {
    fn subscribe_collection(
        &self,
        query: CollectionQuery,
        sink: EventSink,
    ) -> Result<Subscription, StoreError> {
        let docs = self.read(&query)?;
        let path = query.path.clone();
        let subscription = self.listeners.add(query, sink.clone());
        send(
            &sink,
            StoreEvent::Snapshot(SnapshotEvent {
                subscription: subscription.id(),
                path,
                result: Ok(docs),
            }),
        );
        Ok(subscription)
    }

    fn fetch_collection(&self, query: &CollectionQuery) -> Result<Vec<Document>, StoreError> {
        self.read(query)
    }

    fn create_document(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        let id = generate_document_id();
        let created_at_ms = self.clock.tick();
        let fields_json = serde_json::to_string(&fields)?;
        self.conn.borrow().execute(
            "INSERT INTO documents(path, id, fields_json, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![path.as_str(), id, fields_json, created_at_ms],
        )?;
        self.notify(path);
        Ok(id)
    }

    fn update_document(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        {
            let mut conn = self.conn.borrow_mut();
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT fields_json FROM documents WHERE path=?1 AND id=?2",
                    params![path.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(existing) = existing else {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                    id: id.to_string(),
                });
            };
            let mut merged: Fields = serde_json::from_str(&existing)?;
            merged.extend(fields);
            tx.execute(
                "UPDATE documents SET fields_json=?3 WHERE path=?1 AND id=?2",
                params![path.as_str(), id, serde_json::to_string(&merged)?],
            )?;
            tx.commit()?;
        }
        self.notify(path);
        Ok(())
    }

    fn delete_document(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let removed = self.conn.borrow().execute(
            "DELETE FROM documents WHERE path=?1 AND id=?2",
            params![path.as_str(), id],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound {
                path: path.to_string(),
                id: id.to_string(),
            });
        }
        self.notify(path);
        Ok(())
    }
}

impl BlobStore for SqliteStore {
    fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        validate_blob_path(path)?;
        self.conn.borrow().execute(
            "INSERT INTO blobs(path, bytes, sha256, created_at_ms) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(path) DO UPDATE SET bytes=excluded.bytes, sha256=excluded.sha256",
            params![path, bytes, sha256_hex(bytes), now_ms()],
        )?;
        Ok(blob_url("blob", path, bytes))
    }

    fn delete_blob(&self, path: &str) -> Result<(), StoreError> {
        let removed = self
            .conn
            .borrow()
            .execute("DELETE FROM blobs WHERE path=?1", params![path])?;
        if removed == 0 {
            return Err(StoreError::BlobNotFound {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

impl SqliteStore {
    pub fn read_blob(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.conn
            .borrow()
            .query_row("SELECT bytes FROM blobs WHERE path=?1", params![path], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| StoreError::BlobNotFound {
                path: path.to_string(),
            })
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = ["store_state", "documents", "blobs"].into_iter().collect();
    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }
    if required.iter().any(|table| !tables.contains(*table)) {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: required table is missing",
        ));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
          path TEXT NOT NULL,
          id TEXT NOT NULL,
          fields_json TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY(path, id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_path_created
          ON documents(path, created_at_ms, id);

        CREATE TABLE IF NOT EXISTS blobs (
          path TEXT PRIMARY KEY,
          bytes BLOB NOT NULL,
          sha256 TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}
