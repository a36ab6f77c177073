//! Document listing, lookup, and deletion.
//!
//! Used by both the CLI (`docqa documents`, `docqa get`, `docqa delete`) and
//! the HTTP endpoints under `/documents/`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::ingest;
use crate::models::Document;

/// One entry of `GET /documents/`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub name: String,
    /// Stored path relative to the upload directory.
    pub file: String,
    pub created_at: String, // ISO8601
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetail {
    pub id: i64,
    pub name: String,
    pub file: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: String, // ISO8601
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub order: i64,
    pub text: String,
    pub model: String,
    pub dims: i64,
}

/// All documents, newest first.
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentSummary>> {
    let rows = sqlx::query(
        "SELECT id, name, file_path, created_at FROM documents ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DocumentSummary {
            id: row.get("id"),
            name: row.get("name"),
            file: row.get("file_path"),
            created_at: format_ts_iso(row.get("created_at")),
        })
        .collect())
}

pub async fn find_document(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
    let row = sqlx::query(
        "SELECT id, name, file_path, content_type, size_bytes, created_at FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Document {
        id: row.get("id"),
        name: row.get("name"),
        file_path: row.get("file_path"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        created_at: row.get("created_at"),
    }))
}

/// A document with its chunks in order, or `None` if no such id exists.
pub async fn get_document(pool: &SqlitePool, id: i64) -> Result<Option<DocumentDetail>> {
    let doc = match find_document(pool, id).await? {
        Some(doc) => doc,
        None => return Ok(None),
    };

    let chunk_rows = sqlx::query(
        "SELECT chunk_order, content, model, dims FROM chunks WHERE document_id = ? ORDER BY chunk_order ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let chunks = chunk_rows
        .iter()
        .map(|row| ChunkResponse {
            order: row.get("chunk_order"),
            text: row.get("content"),
            model: row.get("model"),
            dims: row.get("dims"),
        })
        .collect();

    Ok(Some(DocumentDetail {
        id: doc.id,
        name: doc.name,
        file: doc.file_path,
        content_type: doc.content_type,
        size_bytes: doc.size_bytes,
        created_at: format_ts_iso(doc.created_at),
        chunks,
    }))
}

/// Delete a document, its chunks, and its stored file.
///
/// Returns `false` when the document does not exist.
pub async fn delete_document(config: &Config, pool: &SqlitePool, id: i64) -> Result<bool> {
    let doc = match find_document(pool, id).await? {
        Some(doc) => doc,
        None => return Ok(false),
    };

    ingest::remove_file_quietly(&ingest::stored_file_path(config, &doc.file_path)).await;

    // Chunks go with it via ON DELETE CASCADE
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!(doc_id = id, name = %doc.name, "document deleted");
    Ok(true)
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let docs = list_documents(&pool).await?;
    pool.close().await;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<6} {:<22} NAME", "ID", "CREATED");
    for doc in &docs {
        println!("{:<6} {:<22} {}", doc.id, doc.created_at, doc.name);
    }
    println!();
    println!("{} document(s)", docs.len());
    Ok(())
}

pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let doc = get_document(&pool, id).await?;
    pool.close().await;

    let doc = match doc {
        Some(d) => d,
        None => anyhow::bail!("document not found: {}", id),
    };

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("name:         {}", doc.name);
    println!("file:         {}", doc.file);
    println!("content_type: {}", doc.content_type);
    println!("size_bytes:   {}", doc.size_bytes);
    println!("created_at:   {}", doc.created_at);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        println!("[chunk {}]", chunk.order);
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let deleted = delete_document(config, &pool, id).await?;
    pool.close().await;

    if !deleted {
        anyhow::bail!("document not found: {}", id);
    }
    println!("deleted document {}", id);
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
