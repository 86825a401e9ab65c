#[cfg(test)]
mod tests;

pub mod distance;

pub use distance::DistanceStrategy;

use crate::genai::Embedder;
use crate::{BridgeError, Result};
use pgvector::Vector;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgArguments, PgConnection, PgPool, PgQueryResult, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Canary text used to probe the embedding dimension at table creation.
const DIMENSION_PROBE_TEXT: &str = "test";

/// Postgres error codes the engine reacts to by name.
const UNDEFINED_TABLE: &str = "42P01";
const DUPLICATE_TABLE: &str = "42P07";

pub const ID_WIDTH: usize = 16;

/// Stable 16-byte record identifier, stored in the BYTEA primary key column.
pub type RecordId = [u8; ID_WIDTH];

/// One retrievable chunk: stored text plus its opaque JSON metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_content: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    #[inline]
    pub fn new(page_content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }
}

/// A search hit with its raw distance. Lower is more similar for EUCLIDEAN and
/// COSINE; callers must not assume one similarity direction across strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f64,
}

/// A single row the storage layer rejected during a batch write.
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub index: usize,
    pub id: RecordId,
    pub message: String,
}

/// Result of a batch upsert: ids actually written plus per-row failures.
/// Partial failure is surfaced here, never swallowed.
#[derive(Debug, Clone, Default)]
pub struct BatchInsertOutcome {
    pub ids: Vec<RecordId>,
    pub failures: Vec<RowFailure>,
}

impl BatchInsertOutcome {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of rows attempted: successes plus failures.
    #[inline]
    pub fn total_rows(&self) -> usize {
        self.ids.len() + self.failures.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddDocumentsOptions {
    /// Truncate the table before inserting. Destructive and untransacted with
    /// the insert that follows.
    pub clear_table: bool,
}

/// Capability adapter over either a connection pool or a single connection.
/// Anything else is unrepresentable; the enum replaces duck-typed handle
/// checks with a type.
#[derive(Clone)]
pub enum DbHandle {
    Pool(PgPool),
    Connection(Arc<Mutex<PgConnection>>),
}

impl DbHandle {
    #[inline]
    pub fn from_pool(pool: PgPool) -> Self {
        DbHandle::Pool(pool)
    }

    #[inline]
    pub fn from_connection(connection: PgConnection) -> Self {
        DbHandle::Connection(Arc::new(Mutex::new(connection)))
    }

    async fn execute(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> std::result::Result<PgQueryResult, sqlx::Error> {
        match self {
            DbHandle::Pool(pool) => query.execute(pool).await,
            DbHandle::Connection(conn) => {
                let mut guard = conn.lock().await;
                query.execute(&mut *guard).await
            }
        }
    }

    async fn fetch_all(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> std::result::Result<Vec<PgRow>, sqlx::Error> {
        match self {
            DbHandle::Pool(pool) => query.fetch_all(pool).await,
            DbHandle::Connection(conn) => {
                let mut guard = conn.lock().await;
                query.fetch_all(&mut *guard).await
            }
        }
    }

    async fn fetch_optional(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> std::result::Result<Option<PgRow>, sqlx::Error> {
        match self {
            DbHandle::Pool(pool) => query.fetch_optional(pool).await,
            DbHandle::Connection(conn) => {
                let mut guard = conn.lock().await;
                query.fetch_optional(&mut *guard).await
            }
        }
    }
}

/// Vector store over one relational engine with a vector extension
/// (Postgres + pgvector). Owns table lifecycle, id derivation, batch upsert
/// and nearest-neighbor search.
pub struct VectorStore {
    handle: DbHandle,
    table: String,
    strategy: DistanceStrategy,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    /// Resolves the handle and ensures the table exists, creating it with a
    /// vector width probed from the embedding provider if absent.
    ///
    /// The width is fixed at creation; the storage layer rejects vectors of a
    /// different width afterwards. A concurrent initializer racing on the same
    /// table name may hit `duplicate_table`, which is treated as success.
    #[inline]
    pub async fn initialize(
        handle: DbHandle,
        table: impl Into<String>,
        strategy: DistanceStrategy,
        embedder: Arc<dyn Embedder>,
        sample_query: Option<&str>,
    ) -> Result<Self> {
        let table = table.into();
        let store = Self {
            handle,
            table,
            strategy,
            embedder,
        };

        store.ensure_table(sample_query).await?;
        Ok(store)
    }

    #[inline]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[inline]
    pub fn strategy(&self) -> DistanceStrategy {
        self.strategy
    }

    async fn ensure_table(&self, sample_query: Option<&str>) -> Result<()> {
        let probe = format!("SELECT \"id\" FROM {} LIMIT 1", quote_ident(&self.table));
        match self.handle.fetch_optional(sqlx::query(&probe)).await {
            Ok(_) => {
                debug!("Table {} already exists", self.table);
                return Ok(());
            }
            Err(e) if db_error_code(&e).as_deref() == Some(UNDEFINED_TABLE) => {
                debug!("Table {} does not exist, creating", self.table);
            }
            Err(e) => {
                return Err(BridgeError::Database(format!(
                    "Failed to check table {}: {e}",
                    self.table
                )));
            }
        }

        let canary = sample_query.unwrap_or(DIMENSION_PROBE_TEXT);
        let dimension = self.embedder.embed_query(canary).await?.len();
        if dimension == 0 {
            return Err(BridgeError::Embedding(
                "Embedding provider returned a zero-length probe vector".to_string(),
            ));
        }

        let create = format!(
            "CREATE TABLE {} (\"id\" BYTEA PRIMARY KEY, \"text\" TEXT, \"metadata\" JSONB, \"embedding\" VECTOR({dimension}))",
            quote_ident(&self.table)
        );

        match self.handle.execute(sqlx::query(&create)).await {
            Ok(_) => {
                info!(
                    "Created table {} with embedding width {dimension}",
                    self.table
                );
                Ok(())
            }
            // A concurrent initializer won the race; the table is there.
            Err(e) if db_error_code(&e).as_deref() == Some(DUPLICATE_TABLE) => {
                info!("Table {} was created concurrently", self.table);
                Ok(())
            }
            Err(e) => Err(BridgeError::Database(format!(
                "Failed to create table {}: {e}",
                self.table
            ))),
        }
    }

    /// Embeds and upserts a batch of texts, deriving a stable id per record.
    ///
    /// Blank texts are rejected before anything is embedded or stored, since
    /// the embeddings service cannot produce a vector for them.
    ///
    /// Row-level storage failures do not abort the batch; they are collected
    /// in the returned outcome.
    #[inline]
    pub async fn add_texts(
        &self,
        texts: &[String],
        metadatas: Option<Vec<Map<String, Value>>>,
        ids: Option<&[String]>,
    ) -> Result<BatchInsertOutcome> {
        if texts.is_empty() {
            return Ok(BatchInsertOutcome::default());
        }
        if let Some(index) = blank_text_index(texts) {
            return Err(BridgeError::Embedding(format!(
                "Text at index {index} is blank; blank texts cannot be embedded"
            )));
        }

        let mut metadatas = metadatas.unwrap_or_default();
        metadatas.resize(texts.len(), Map::new());

        let record_ids = derive_ids(texts, &metadatas, ids);

        let embeddings = self.embedder.embed_documents(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(BridgeError::Embedding(format!(
                "Embedding count mismatch: {} texts, {} embeddings",
                texts.len(),
                embeddings.len()
            )));
        }

        debug!(
            "Upserting {} records into table {}",
            texts.len(),
            self.table
        );

        let mut builder = sqlx::QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} (\"id\", \"text\", \"metadata\", \"embedding\") ",
            quote_ident(&self.table)
        ));
        builder.push_values(
            record_ids
                .iter()
                .zip(texts.iter())
                .zip(metadatas.iter())
                .zip(embeddings.iter()),
            |mut b, (((id, text), metadata), embedding)| {
                b.push_bind(id.to_vec())
                    .push_bind(text.as_str())
                    .push_bind(Value::Object(metadata.clone()))
                    .push_bind(Vector::from(embedding.clone()));
            },
        );
        builder.push(
            " ON CONFLICT (\"id\") DO UPDATE SET \"text\" = EXCLUDED.\"text\", \
             \"metadata\" = EXCLUDED.\"metadata\", \"embedding\" = EXCLUDED.\"embedding\"",
        );

        match self.handle.execute(builder.build()).await {
            Ok(_) => Ok(BatchInsertOutcome {
                ids: record_ids,
                failures: Vec::new(),
            }),
            Err(sqlx::Error::Database(_)) => {
                // The multi-row statement is all-or-nothing; replay row by row
                // so one bad row does not sink the batch, and report each
                // failure to the caller.
                warn!(
                    "Batch upsert into {} failed; retrying row by row",
                    self.table
                );
                self.upsert_rows(&record_ids, texts, &metadatas, &embeddings)
                    .await
            }
            Err(e) => Err(BridgeError::Database(format!(
                "Batch upsert into {} failed: {e}",
                self.table
            ))),
        }
    }

    async fn upsert_rows(
        &self,
        ids: &[RecordId],
        texts: &[String],
        metadatas: &[Map<String, Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<BatchInsertOutcome> {
        let sql = format!(
            "INSERT INTO {} (\"id\", \"text\", \"metadata\", \"embedding\") VALUES ($1, $2, $3, $4) \
             ON CONFLICT (\"id\") DO UPDATE SET \"text\" = EXCLUDED.\"text\", \
             \"metadata\" = EXCLUDED.\"metadata\", \"embedding\" = EXCLUDED.\"embedding\"",
            quote_ident(&self.table)
        );

        let mut outcome = BatchInsertOutcome::default();
        for (index, ((id, text), (metadata, embedding))) in ids
            .iter()
            .zip(texts.iter())
            .zip(metadatas.iter().zip(embeddings.iter()))
            .enumerate()
        {
            let query = sqlx::query(&sql)
                .bind(id.to_vec())
                .bind(text.as_str())
                .bind(Value::Object(metadata.clone()))
                .bind(Vector::from(embedding.clone()));

            match self.handle.execute(query).await {
                Ok(_) => outcome.ids.push(*id),
                Err(sqlx::Error::Database(db)) => {
                    warn!("Row {index} rejected by table {}: {db}", self.table);
                    outcome.failures.push(RowFailure {
                        index,
                        id: *id,
                        message: db.to_string(),
                    });
                }
                Err(e) => {
                    return Err(BridgeError::Database(format!(
                        "Row upsert into {} failed: {e}",
                        self.table
                    )));
                }
            }
        }
        Ok(outcome)
    }

    /// `add_texts` over the document abstraction. `clear_table` truncates
    /// first (no transaction wraps the subsequent insert).
    #[inline]
    pub async fn add_documents(
        &self,
        documents: &[Document],
        options: AddDocumentsOptions,
    ) -> Result<BatchInsertOutcome> {
        if options.clear_table {
            self.delete_all().await?;
        }

        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let metadatas: Vec<Map<String, Value>> =
            documents.iter().map(|d| d.metadata.clone()).collect();

        self.add_texts(&texts, Some(metadatas), None).await
    }

    /// Unconditionally removes every record in the table.
    #[inline]
    pub async fn delete_all(&self) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", quote_ident(&self.table));
        self.handle
            .execute(sqlx::query(&sql))
            .await
            .map_err(|e| {
                BridgeError::Database(format!("Failed to truncate table {}: {e}", self.table))
            })?;
        info!("Cleared table {}", self.table);
        Ok(())
    }

    /// Embeds the query text and returns the top-`k` nearest documents.
    #[inline]
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let embedding = self.embedder.embed_query(query).await?;
        let scored = self
            .similarity_search_by_vector_with_score(&embedding, k, None)
            .await?;
        Ok(scored.into_iter().map(|s| s.document).collect())
    }

    /// Nearest-neighbor search by raw vector, returning raw distances.
    ///
    /// With an approximate index on the embedding column the engine may return
    /// an approximate, not exact, top-k. The optional filter is pushed down as
    /// JSONB containment on the metadata column.
    #[inline]
    pub async fn similarity_search_by_vector_with_score(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<ScoredDocument>> {
        let sql = search_sql(&self.table, self.strategy, k, filter.is_some());

        let mut query = sqlx::query(&sql).bind(Vector::from(embedding.to_vec()));
        if let Some(filter) = filter {
            query = query.bind(Value::Object(filter.clone()));
        }

        let rows = self.handle.fetch_all(query).await.map_err(|e| {
            BridgeError::Database(format!("Similarity search on {} failed: {e}", self.table))
        })?;

        rows.iter().map(decode_search_row).collect()
    }
}

/// Derives one stable 16-byte id per text:
/// explicit ids if given, else per-record metadata `id` fields if every record
/// has one, else a random uuid per text. The chosen source is hashed with
/// SHA-256 and truncated to 16 bytes, so explicit and metadata ids are
/// deterministic across runs and random ids are not.
#[inline]
pub fn derive_ids(
    texts: &[String],
    metadatas: &[Map<String, Value>],
    explicit_ids: Option<&[String]>,
) -> Vec<RecordId> {
    if let Some(ids) = explicit_ids {
        return ids.iter().map(|id| hash_id(id)).collect();
    }

    let metadata_ids: Option<Vec<String>> = metadatas
        .iter()
        .map(|m| m.get("id").map(json_id_string))
        .collect();
    if let Some(ids) = metadata_ids {
        if ids.len() == texts.len() {
            return ids.iter().map(|id| hash_id(id)).collect();
        }
    }

    texts
        .iter()
        .map(|_| hash_id(&Uuid::new_v4().to_string()))
        .collect()
}

fn json_id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SHA-256 of the input, truncated to the full first 16 raw bytes of the
/// digest (not 16 hex characters, which would carry only 8 bytes of entropy).
#[inline]
pub fn hash_id(input: &str) -> RecordId {
    let digest = Sha256::digest(input.as_bytes());
    let mut id = [0u8; ID_WIDTH];
    id.copy_from_slice(&digest[..ID_WIDTH]);
    id
}

/// Quotes an identifier for interpolation into SQL text. The name is used
/// verbatim apart from quoting; table names must not come from untrusted
/// input.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds the nearest-neighbor query. `k` is interpolated from a typed
/// integer, never from caller-supplied text.
fn search_sql(table: &str, strategy: DistanceStrategy, k: usize, with_filter: bool) -> String {
    let filter_clause = if with_filter {
        " WHERE \"metadata\" @> $2"
    } else {
        ""
    };
    format!(
        "SELECT \"text\", \"metadata\", \"embedding\" {op} $1 AS distance FROM {table}{filter_clause} ORDER BY distance LIMIT {k}",
        op = strategy.operator(),
        table = quote_ident(table),
        k = i64::try_from(k).unwrap_or(i64::MAX),
    )
}

fn decode_search_row(row: &PgRow) -> Result<ScoredDocument> {
    let text: Option<String> = row
        .try_get("text")
        .map_err(|e| BridgeError::Database(format!("Failed to decode text column: {e}")))?;
    let metadata: Option<Value> = row
        .try_get("metadata")
        .map_err(|e| BridgeError::Database(format!("Failed to decode metadata column: {e}")))?;
    let distance: f64 = row
        .try_get("distance")
        .map_err(|e| BridgeError::Database(format!("Failed to decode distance column: {e}")))?;

    let metadata = match metadata {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(BridgeError::Database(format!(
                "Metadata column holds non-object JSON: {other}"
            )));
        }
        None => Map::new(),
    };

    Ok(ScoredDocument {
        document: Document {
            page_content: text.unwrap_or_default(),
            metadata,
        },
        distance,
    })
}

/// Index of the first text that is empty or whitespace-only, if any.
fn blank_text_index(texts: &[String]) -> Option<usize> {
    texts.iter().position(|text| text.trim().is_empty())
}

fn db_error_code(error: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db) = error {
        db.code().map(|c| c.into_owned())
    } else {
        None
    }
}
