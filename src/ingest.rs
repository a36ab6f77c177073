//! Document upload pipeline.
//!
//! Coordinates the flow for a single uploaded file: storage → document row →
//! text extraction → chunking → embedding → chunk rows. A document either
//! ends up fully indexed or not at all: any failure after the row is created
//! removes the row and the stored file again.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::chunk::{chunk_text, make_chunks};
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::extract::{self, FileKind};
use crate::models::NewChunk;

/// Result of a successful upload, as returned by `POST /upload/`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub id: i64,
    pub name: String,
    pub chunks: usize,
    pub message: String,
}

/// Why an upload was rejected.
///
/// `NoText` and `NoChunks` are the caller's fault (HTTP 400); `Failed`
/// wraps everything else (HTTP 500).
#[derive(Debug)]
pub enum IngestError {
    NoText,
    NoChunks,
    Failed(anyhow::Error),
}

impl IngestError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::NoText | IngestError::NoChunks)
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::NoText => write!(
                f,
                "Could not extract text from file. File may be empty or corrupted."
            ),
            IngestError::NoChunks => write!(f, "No text chunks created from document"),
            IngestError::Failed(e) => write!(f, "Error processing document: {}", e),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<anyhow::Error> for IngestError {
    fn from(e: anyhow::Error) -> Self {
        IngestError::Failed(e)
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Failed(e.into())
    }
}

/// Store, extract, chunk, embed, and index one uploaded file.
pub async fn ingest_file(
    config: &Config,
    pool: &SqlitePool,
    original_name: &str,
    bytes: &[u8],
) -> Result<IngestOutcome, IngestError> {
    let name = display_name(original_name);
    let relative = format!("documents/{}_{}", Uuid::new_v4().simple(), sanitize_file_name(&name));
    let stored_path = config.storage.upload_dir.join(&relative);

    store_bytes(&stored_path, bytes).await?;

    let kind = FileKind::from_name(&name);
    let insert = sqlx::query(
        "INSERT INTO documents (name, file_path, content_type, size_bytes, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&name)
    .bind(&relative)
    .bind(kind.content_type())
    .bind(bytes.len() as i64)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await;

    let doc_id = match insert {
        Ok(done) => done.last_insert_rowid(),
        Err(e) => {
            remove_file_quietly(&stored_path).await;
            return Err(e.into());
        }
    };

    tracing::info!(doc_id, name = %name, bytes = bytes.len(), "stored upload");

    match index_document(config, pool, doc_id, &stored_path).await {
        Ok(count) => {
            tracing::info!(doc_id, chunks = count, "document indexed");
            Ok(IngestOutcome {
                id: doc_id,
                name,
                chunks: count,
                message: format!("Successfully processed document with {} chunks", count),
            })
        }
        Err(e) => {
            tracing::warn!(doc_id, error = %e, "upload rejected, rolling back");
            if let Err(cleanup) = sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(doc_id)
                .execute(pool)
                .await
            {
                tracing::warn!(doc_id, error = %cleanup, "could not remove document row");
            }
            remove_file_quietly(&stored_path).await;
            Err(e)
        }
    }
}

async fn index_document(
    config: &Config,
    pool: &SqlitePool,
    doc_id: i64,
    stored_path: &Path,
) -> Result<usize, IngestError> {
    let path = stored_path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || extract::extract_text_from_file(&path))
        .await
        .map_err(|e| IngestError::Failed(e.into()))?;

    if text.trim().is_empty() {
        return Err(IngestError::NoText);
    }

    let pieces = chunk_text(&text, config.chunking.max_chars, config.chunking.overlap);
    if pieces.is_empty() {
        return Err(IngestError::NoChunks);
    }

    let chunks = make_chunks(doc_id, pieces);
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

    let provider = embedding::create_provider(&config.embedding)?;
    let vectors = embedding::embed_texts(provider.as_ref(), &config.embedding, &texts).await?;

    insert_chunks(pool, &chunks, &vectors, provider.model_name()).await?;
    Ok(chunks.len())
}

async fn insert_chunks(
    pool: &SqlitePool,
    chunks: &[NewChunk],
    vectors: &[Vec<f32>],
    model: &str,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    for (chunk, vector) in chunks.iter().zip(vectors) {
        sqlx::query(
            r#"
            INSERT INTO chunks (document_id, content, embedding, model, dims, index_id, chunk_order, hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.document_id)
        .bind(&chunk.content)
        .bind(embedding::vec_to_blob(vector))
        .bind(model)
        .bind(vector.len() as i64)
        .bind(chunk.document_id.to_string())
        .bind(chunk.order)
        .bind(&chunk.hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn store_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub(crate) async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove stored file");
        }
    }
}

/// The client-supplied name without any directory part.
fn display_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

/// Reduce a file name to characters that are safe on every filesystem.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// CLI entry point: upload a local file.
pub async fn run_upload(config: &Config, path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    let pool = db::connect(config).await?;
    let result = ingest_file(config, &pool, &name, &bytes).await;
    pool.close().await;

    let outcome = result.map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("upload {}", outcome.name);
    println!("  id: {}", outcome.id);
    println!("  chunks: {}", outcome.chunks);
    println!("{}", outcome.message);
    Ok(())
}

/// Absolute path of a stored upload.
pub fn stored_file_path(config: &Config, relative: &str) -> PathBuf {
    config.storage.upload_dir.join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_directories() {
        assert_eq!(display_name("../../etc/passwd"), "passwd");
        assert_eq!(display_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(display_name("notes.txt"), "notes.txt");
        assert_eq!(display_name("dir/"), "upload");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("my report (v2).pdf"), "my_report__v2_.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("résumé.docx"), "r_sum_.docx");
        assert_eq!(sanitize_file_name("..."), "upload");
    }

    #[test]
    fn test_error_messages_and_classes() {
        assert!(IngestError::NoText.is_client_error());
        assert!(IngestError::NoChunks.is_client_error());
        let failed = IngestError::Failed(anyhow::anyhow!("boom"));
        assert!(!failed.is_client_error());
        assert_eq!(failed.to_string(), "Error processing document: boom");
        assert_eq!(
            IngestError::NoText.to_string(),
            "Could not extract text from file. File may be empty or corrupted."
        );
    }
}
