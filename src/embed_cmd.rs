//! Embedding maintenance commands.
//!
//! Chunks keep the model name and width they were embedded with. After the
//! embedding model changes, `docqa embed status` shows which chunks are
//! stale and `docqa embed rebuild` re-embeds them in place.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCount {
    pub model: String,
    pub dims: i64,
    pub chunks: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildStats {
    pub total: u64,
    pub embedded: u64,
    pub failed: u64,
}

struct ChunkText {
    id: i64,
    content: String,
}

/// Chunk counts grouped by the model that embedded them.
pub async fn embedding_status(pool: &SqlitePool) -> Result<Vec<ModelCount>> {
    let rows = sqlx::query(
        "SELECT model, dims, COUNT(*) AS n FROM chunks GROUP BY model, dims ORDER BY n DESC, model ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ModelCount {
            model: row.get("model"),
            dims: row.get("dims"),
            chunks: row.get("n"),
        })
        .collect())
}

/// Re-embed chunks with the configured provider.
///
/// With `only_stale`, chunks already embedded by the configured model are
/// skipped. A failed batch is counted and the rebuild continues.
pub async fn rebuild_embeddings(
    config: &Config,
    pool: &SqlitePool,
    batch_size: usize,
    only_stale: bool,
) -> Result<RebuildStats> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let model_name = provider.model_name().to_string();

    let rows = if only_stale {
        sqlx::query("SELECT id, content FROM chunks WHERE model != ? ORDER BY id ASC")
            .bind(&model_name)
            .fetch_all(pool)
            .await?
    } else {
        sqlx::query("SELECT id, content FROM chunks ORDER BY id ASC")
            .fetch_all(pool)
            .await?
    };

    let pending: Vec<ChunkText> = rows
        .iter()
        .map(|row| ChunkText {
            id: row.get("id"),
            content: row.get("content"),
        })
        .collect();

    let mut stats = RebuildStats {
        total: pending.len() as u64,
        ..RebuildStats::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

        match embedding::embed_texts(provider.as_ref(), &config.embedding, &texts).await {
            Ok(vectors) => {
                let mut tx = pool.begin().await?;
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    sqlx::query("UPDATE chunks SET embedding = ?, model = ?, dims = ? WHERE id = ?")
                        .bind(embedding::vec_to_blob(vec))
                        .bind(&model_name)
                        .bind(vec.len() as i64)
                        .bind(item.id)
                        .execute(&mut *tx)
                        .await?;
                    stats.embedded += 1;
                }
                tx.commit().await?;
            }
            Err(e) => {
                tracing::warn!(error = %e, size = batch.len(), "embedding batch failed");
                stats.failed += batch.len() as u64;
            }
        }
    }

    Ok(stats)
}

pub async fn run_embed_rebuild(
    config: &Config,
    batch_size_override: Option<usize>,
    only_stale: bool,
) -> Result<()> {
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);
    let pool = db::connect(config).await?;
    let stats = rebuild_embeddings(config, &pool, batch_size, only_stale).await;
    pool.close().await;
    let stats = stats?;

    println!("embed rebuild");
    if stats.total == 0 {
        println!("  no chunks to embed");
        return Ok(());
    }
    println!("  total chunks: {}", stats.total);
    println!("  embedded: {}", stats.embedded);
    println!("  failed: {}", stats.failed);
    Ok(())
}

pub async fn run_embed_status(config: &Config) -> Result<()> {
    let configured = if config.embedding.is_enabled() {
        Some(embedding::create_provider(&config.embedding)?.model_name().to_string())
    } else {
        None
    };

    let pool = db::connect(config).await?;
    let counts = embedding_status(&pool).await;
    pool.close().await;
    let counts = counts?;

    println!("embed status");
    println!(
        "  provider: {} ({})",
        config.embedding.provider,
        configured.as_deref().unwrap_or("none")
    );

    if counts.is_empty() {
        println!("  no chunks stored");
        return Ok(());
    }

    let mut stale = 0i64;
    for c in &counts {
        let current = configured.as_deref() == Some(c.model.as_str());
        if !current {
            stale += c.chunks;
        }
        println!(
            "  {:<28} dims={:<5} chunks={}{}",
            c.model,
            c.dims,
            c.chunks,
            if current { "" } else { "  (stale)" }
        );
    }
    if stale > 0 {
        println!("  {} chunk(s) need `docqa embed rebuild --stale`", stale);
    }
    Ok(())
}
