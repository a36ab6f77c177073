//! Per-request retrieval.
//!
//! Every call scans the `chunks` table (optionally restricted to a set of
//! documents), embeds the query, builds a fresh [`FlatIpIndex`] from the
//! stored vectors of the same width, and returns the top-k chunks together
//! with the context window handed to the language model.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{RetrievedChunk, StoredChunk};
use crate::vector_index::FlatIpIndex;

/// Separator placed between chunk texts in the context window.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub hits: Vec<RetrievedChunk>,
    pub context: String,
    /// Number of chunks the index was built from.
    pub chunks_searched: usize,
}

/// Load stored chunks, in document then chunk order.
///
/// An empty `document_ids` means every document.
pub async fn load_chunks(pool: &SqlitePool, document_ids: &[i64]) -> Result<Vec<StoredChunk>> {
    let mut sql = String::from(
        "SELECT id, document_id, chunk_order, content, embedding FROM chunks",
    );
    if !document_ids.is_empty() {
        let placeholders = vec!["?"; document_ids.len()].join(", ");
        sql.push_str(&format!(" WHERE document_id IN ({})", placeholders));
    }
    sql.push_str(" ORDER BY document_id ASC, chunk_order ASC");

    let mut query = sqlx::query(&sql);
    for id in document_ids {
        query = query.bind(*id);
    }
    let rows = query.fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            StoredChunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                order: row.get("chunk_order"),
                content: row.get("content"),
                embedding: embedding::blob_to_vec(&blob),
            }
        })
        .collect())
}

/// Build an index of width `dim` over `chunks`.
///
/// Chunks of any other width are skipped. Returns the index and, per index
/// position, the chunk it holds.
pub fn build_index(chunks: &[StoredChunk], dim: usize) -> (FlatIpIndex, Vec<&StoredChunk>) {
    let mut index = FlatIpIndex::new(dim);
    let mut slots = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match index.add(&chunk.embedding) {
            Ok(_) => slots.push(chunk),
            Err(e) => {
                tracing::warn!(chunk_id = chunk.id, error = %e, "skipping chunk with mismatched embedding");
            }
        }
    }

    (index, slots)
}

/// Retrieve the `k` chunks most similar to `query`.
///
/// Only chunks embedded at the query's width are searched. Fails when no
/// stored chunk has that width.
pub async fn retrieve(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
    document_ids: &[i64],
    k: usize,
) -> Result<Retrieval> {
    let chunks = load_chunks(pool, document_ids).await?;
    if chunks.is_empty() {
        return Ok(Retrieval::default());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query).await?;

    let (index, slots) = build_index(&chunks, query_vec.len());
    if index.is_empty() {
        bail!(
            "no stored chunk matches the query embedding width ({}); run `docqa embed rebuild`",
            query_vec.len()
        );
    }

    let hits: Vec<RetrievedChunk> = index
        .search(&query_vec, k)
        .into_iter()
        .map(|(pos, score)| {
            let chunk = slots[pos];
            RetrievedChunk {
                text: chunk.content.clone(),
                document_id: chunk.document_id,
                order: chunk.order,
                score,
            }
        })
        .collect();

    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    tracing::debug!(searched = index.len(), used = hits.len(), "retrieval complete");

    Ok(Retrieval {
        hits,
        context,
        chunks_searched: index.len(),
    })
}

/// CLI entry point: print the chunks retrieved for `query`.
pub async fn run_search(
    config: &Config,
    query: &str,
    document_ids: &[i64],
    k: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let k = k.unwrap_or(config.retrieval.top_k).clamp(1, config.retrieval.max_k);
    let pool = db::connect(config).await?;
    let retrieval = retrieve(config, &pool, query.trim(), document_ids, k).await;
    pool.close().await;
    let retrieval = retrieval?;

    if retrieval.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in retrieval.hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] document {} / chunk {}",
            i + 1,
            hit.score,
            hit.document_id,
            hit.order
        );
        println!("    excerpt: \"{}\"", excerpt(&hit.text, 240));
        println!();
    }
    println!(
        "searched {} chunks, returned {}",
        retrieval.chunks_searched,
        retrieval.hits.len()
    );

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        flat.to_string()
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
