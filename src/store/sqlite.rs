//! SQLite passage store: `sqlite-vec` for k-NN cosine search, FTS5 for
//! BM25 lexical search, both over one `passages` table of record.
//!
//! Grounded on the teacher's `SqliteChunkStore`: the `Once`+`Mutex`
//! guarded `sqlite3_auto_extension` registration of `sqlite-vec`, and the
//! `conn.call(move |conn| { ... })` closure-over-blocking-connection
//! pattern via `tokio-rusqlite` for every query. Unlike the teacher, this
//! store does not route through `rig-sqlite`'s `EmbeddingModel`-keyed
//! vector index — embeddings are always computed up front by
//! [`crate::embedding::Embedder`], so raw SQL against a `vec0` virtual
//! table is simpler and matches how the teacher already does its own
//! `search_similar` for queries `rig-sqlite` doesn't cover.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use tokio_rusqlite::{ffi, Connection, OptionalExtension};

use crate::embedding::EMBEDDING_DIM;
use crate::error::StoreError;

use super::{escape_sql_literal, Backend, Passage, WhereFilter};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if absent) the sqlite file at `path`, registers the
    /// `sqlite-vec` extension, and creates the `passages`/`passages_vec`/
    /// `passages_fts` tables if they do not already exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::register_sqlite_vec()?;

        let path_display = path.as_ref().display().to_string();
        let conn = Connection::open(path).await.map_err(|e| StoreError::OpenFailed {
            path: path_display.clone(),
            reason: e.to_string(),
        })?;

        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS passages (
                    chunk_id TEXT PRIMARY KEY,
                    chunk_index INTEGER NOT NULL,
                    original_chunk TEXT NOT NULL,
                    contextual_chunk TEXT NOT NULL,
                    generated_context TEXT,
                    source_file TEXT NOT NULL,
                    source_project TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    file_type TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    indexed_at TEXT NOT NULL,
                    last_updated TEXT NOT NULL,
                    token_count INTEGER NOT NULL,
                    trust_level TEXT NOT NULL,
                    trust_score REAL NOT NULL,
                    security_risk TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_passages_project ON passages(source_project);
                CREATE INDEX IF NOT EXISTS idx_passages_file ON passages(source_project, file_path);

                CREATE VIRTUAL TABLE IF NOT EXISTS passages_vec USING vec0(
                    embedding float[768]
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS passages_fts USING fts5(
                    contextual_chunk,
                    content='passages',
                    content_rowid='rowid'
                );

                CREATE TRIGGER IF NOT EXISTS passages_ai AFTER INSERT ON passages BEGIN
                    INSERT INTO passages_fts(rowid, contextual_chunk) VALUES (new.rowid, new.contextual_chunk);
                END;
                CREATE TRIGGER IF NOT EXISTS passages_ad AFTER DELETE ON passages BEGIN
                    INSERT INTO passages_fts(passages_fts, rowid, contextual_chunk) VALUES('delete', old.rowid, old.contextual_chunk);
                    DELETE FROM passages_vec WHERE rowid = old.rowid;
                END;
                CREATE TRIGGER IF NOT EXISTS passages_au AFTER UPDATE ON passages BEGIN
                    INSERT INTO passages_fts(passages_fts, rowid, contextual_chunk) VALUES('delete', old.rowid, old.contextual_chunk);
                    INSERT INTO passages_fts(rowid, contextual_chunk) VALUES (new.rowid, new.contextual_chunk);
                END;",
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(|e| StoreError::OpenFailed {
            path: path_display,
            reason: e.to_string(),
        })?;

        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), StoreError> {
        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!("failed to register sqlite-vec extension (code {rc})"))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(|reason| StoreError::OpenFailed {
                path: "sqlite-vec extension".to_string(),
                reason,
            })
    }
}

const PASSAGE_COLUMNS: &str = "chunk_id, chunk_index, original_chunk, contextual_chunk, generated_context, \
     source_file, source_project, file_path, file_type, content_hash, indexed_at, last_updated, \
     token_count, trust_level, trust_score, security_risk";

/// Builds a `WHERE` clause fragment from an optional `source_project`
/// equality plus every caller filter, escaping each value with
/// [`escape_sql_literal`] — applied uniformly, with no exemption for
/// filters this module constructs itself. An empty `source_project`
/// (the unscoped-retrieval case: no `source_project` filter was supplied)
/// contributes no clause at all, so a bare query searches every project
/// rather than matching zero rows against an empty-string equality.
fn build_where_clause(alias: &str, source_project: &str, filters: &[WhereFilter]) -> String {
    let mut clause = "1 = 1".to_string();
    if !source_project.is_empty() {
        clause.push_str(&format!(" AND {alias}.source_project = '{}'", escape_sql_literal(source_project)));
    }
    for filter in filters {
        clause.push_str(&format!(
            " AND {alias}.{} = '{}'",
            filter.column,
            escape_sql_literal(&filter.value)
        ));
    }
    clause
}

fn row_to_passage(row: &rusqlite::Row<'_>) -> rusqlite::Result<Passage> {
    Ok(Passage {
        chunk_id: row.get("chunk_id")?,
        chunk_index: row.get::<_, i64>("chunk_index")? as usize,
        original_chunk: row.get("original_chunk")?,
        contextual_chunk: row.get("contextual_chunk")?,
        generated_context: row.get("generated_context")?,
        embedding: None,
        source_file: row.get("source_file")?,
        source_project: row.get("source_project")?,
        file_path: row.get("file_path")?,
        file_type: row.get("file_type")?,
        content_hash: row.get("content_hash")?,
        indexed_at: row.get("indexed_at")?,
        last_updated: row.get("last_updated")?,
        token_count: row.get::<_, i64>("token_count")? as usize,
        trust_level: row.get("trust_level")?,
        trust_score: row.get("trust_score")?,
        security_risk: row.get("security_risk")?,
    })
}

#[async_trait]
impl Backend for SqliteStore {
    async fn upsert_passages(&self, passages: Vec<Passage>) -> Result<(), StoreError> {
        if passages.is_empty() {
            return Ok(());
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                for passage in &passages {
                    tx.execute(
                        &format!(
                            "INSERT INTO passages ({PASSAGE_COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                             ON CONFLICT(chunk_id) DO UPDATE SET
                                original_chunk = excluded.original_chunk,
                                contextual_chunk = excluded.contextual_chunk,
                                generated_context = excluded.generated_context,
                                content_hash = excluded.content_hash,
                                last_updated = excluded.last_updated,
                                token_count = excluded.token_count,
                                trust_level = excluded.trust_level,
                                trust_score = excluded.trust_score,
                                security_risk = excluded.security_risk"
                        ),
                        rusqlite::params![
                            passage.chunk_id,
                            passage.chunk_index as i64,
                            passage.original_chunk,
                            passage.contextual_chunk,
                            passage.generated_context,
                            passage.source_file,
                            passage.source_project,
                            passage.file_path,
                            passage.file_type,
                            passage.content_hash,
                            passage.indexed_at,
                            passage.last_updated,
                            passage.token_count as i64,
                            passage.trust_level,
                            passage.trust_score,
                            passage.security_risk,
                        ],
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                    if let Some(embedding) = &passage.embedding {
                        let rowid: i64 = tx
                            .query_row("SELECT rowid FROM passages WHERE chunk_id = ?1", [&passage.chunk_id], |r| {
                                r.get(0)
                            })
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        let embedding_json = serde_json::to_string(embedding)
                            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                        tx.execute(
                            "INSERT INTO passages_vec(rowid, embedding) VALUES (?1, vec_f32(?2))
                             ON CONFLICT(rowid) DO UPDATE SET embedding = excluded.embedding",
                            rusqlite::params![rowid, embedding_json],
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "upsert_passages".to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Passage>, StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {PASSAGE_COLUMNS} FROM passages WHERE chunk_id = ?1"),
                    [&id],
                    row_to_passage,
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "get_by_id".to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_content_hash(
        &self,
        source_project: &str,
        file_path: &str,
    ) -> Result<Option<String>, StoreError> {
        let source_project = source_project.to_string();
        let file_path = file_path.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT content_hash FROM passages WHERE source_project = ?1 AND file_path = ?2 LIMIT 1",
                    rusqlite::params![source_project, file_path],
                    |row| row.get(0),
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "get_content_hash".to_string(),
                reason: e.to_string(),
            })
    }

    async fn count_by_file(&self, source_project: &str, file_path: &str) -> Result<usize, StoreError> {
        let source_project = source_project.to_string();
        let file_path = file_path.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM passages WHERE source_project = ?1 AND file_path = ?2",
                    rusqlite::params![source_project, file_path],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "count_by_file".to_string(),
                reason: e.to_string(),
            })
    }

    async fn delete_by_file(&self, source_project: &str, file_path: &str) -> Result<usize, StoreError> {
        let source_project = source_project.to_string();
        let file_path = file_path.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM passages WHERE source_project = ?1 AND file_path = ?2",
                    rusqlite::params![source_project, file_path],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "delete_by_file".to_string(),
                reason: e.to_string(),
            })
    }

    async fn delete_by_project(&self, source_project: &str) -> Result<usize, StoreError> {
        let source_project = source_project.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM passages WHERE source_project = ?1", [&source_project])
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "delete_by_project".to_string(),
                reason: e.to_string(),
            })
    }

    async fn search_vector(
        &self,
        source_project: &str,
        query_embedding: &[f32],
        top_k: usize,
        filters: &[WhereFilter],
    ) -> Result<Vec<(Passage, f32)>, StoreError> {
        let embedding_json = serde_json::to_string(query_embedding).map_err(|e| StoreError::OperationFailed {
            operation: "search_vector".to_string(),
            reason: e.to_string(),
        })?;
        let where_clause = build_where_clause("p", source_project, filters);

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {cols}, vec_distance_cosine(v.embedding, vec_f32(?1)) AS distance
                     FROM passages p
                     JOIN passages_vec v ON v.rowid = p.rowid
                     WHERE {where_clause}
                     ORDER BY distance ASC
                     LIMIT {top_k}",
                    cols = qualify_columns("p"),
                );
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&embedding_json], |row| {
                        let passage = row_to_passage(row)?;
                        let distance: f32 = row.get("distance")?;
                        Ok((passage, 1.0 - distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "search_vector".to_string(),
                reason: e.to_string(),
            })
    }

    async fn search_bm25(
        &self,
        source_project: &str,
        query: &str,
        top_k: usize,
        filters: &[WhereFilter],
    ) -> Result<Vec<(Passage, f32)>, StoreError> {
        let where_clause = build_where_clause("p", source_project, filters);
        let query = query.to_string();

        self.conn
            .call(move |conn| {
                // The FTS5 table is created eagerly in `open`, but if it
                // were ever dropped out-of-band, recreate it transparently
                // on the first failing query rather than surfacing an
                // error to the caller.
                let sql = format!(
                    "SELECT {cols}, bm25(passages_fts) AS rank
                     FROM passages_fts
                     JOIN passages p ON p.rowid = passages_fts.rowid
                     WHERE passages_fts MATCH ?1 AND {where_clause}
                     ORDER BY rank ASC
                     LIMIT {top_k}",
                    cols = qualify_columns("p"),
                );
                let run = |conn: &rusqlite::Connection| -> rusqlite::Result<Vec<(Passage, f32)>> {
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map([&query], |row| {
                        let passage = row_to_passage(row)?;
                        let rank: f32 = row.get("rank")?;
                        // bm25() returns a negative-is-better score in
                        // SQLite's FTS5; negate so callers see a
                        // conventional "higher is better" score.
                        Ok((passage, -rank))
                    })?;
                    let mut results = Vec::new();
                    for row in rows {
                        results.push(row?);
                    }
                    Ok(results)
                };

                match run(conn) {
                    Ok(results) => Ok(results),
                    Err(_) => {
                        conn.execute_batch(
                            "CREATE VIRTUAL TABLE IF NOT EXISTS passages_fts USING fts5(
                                contextual_chunk, content='passages', content_rowid='rowid'
                            );
                             INSERT INTO passages_fts(rowid, contextual_chunk)
                                SELECT rowid, contextual_chunk FROM passages;",
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        run(conn).map_err(tokio_rusqlite::Error::Rusqlite)
                    }
                }
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "search_bm25".to_string(),
                reason: e.to_string(),
            })
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|e| StoreError::OperationFailed {
                operation: "count".to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_stats(&self) -> std::collections::BTreeMap<String, serde_json::Value> {
        let result = self
            .conn
            .call(|conn| {
                let total: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |r| r.get(0))?;
                let projects: i64 =
                    conn.query_row("SELECT COUNT(DISTINCT source_project) FROM passages", [], |r| r.get(0))?;
                let files: i64 =
                    conn.query_row("SELECT COUNT(DISTINCT file_path) FROM passages", [], |r| r.get(0))?;
                Ok::<_, rusqlite::Error>((total, projects, files))
            })
            .await;

        let mut stats = std::collections::BTreeMap::new();
        match result {
            Ok((total, projects, files)) => {
                stats.insert("total_passages".to_string(), serde_json::json!(total));
                stats.insert("total_projects".to_string(), serde_json::json!(projects));
                stats.insert("total_files".to_string(), serde_json::json!(files));
            }
            Err(e) => {
                stats.insert("error".to_string(), serde_json::json!(e.to_string()));
            }
        }
        stats
    }
}

fn qualify_columns(alias: &str) -> String {
    PASSAGE_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
