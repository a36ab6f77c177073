//! Question answering over the uploaded documents.
//!
//! A chat turn validates the request, retrieves the most similar chunks,
//! and asks the selected language model to answer from them. Used by
//! `POST /chat/` and `docqa ask`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::llm;
use crate::models::RetrievedChunk;
use crate::retrieve;

pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been uploaded yet. Please upload a document first to ask questions about it.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// `gemini` or `groq`; defaults to `llm.default_provider`.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Restrict retrieval to these documents. Empty means all.
    #[serde(default)]
    pub document_ids: Vec<i64>,
    /// Accepts an integer or a numeric string.
    #[serde(default, deserialize_with = "lenient_k")]
    pub k: Option<i64>,
}

/// Deserialize an optional `k` given as a JSON integer, float (truncated),
/// or a string holding an integer.
pub(crate) fn lenient_k<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawK {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<RawK>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawK::Int(k)) => Ok(Some(k)),
        Some(RawK::Float(k)) => Ok(Some(k.trunc() as i64)),
        Some(RawK::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("k must be an integer, got {:?}", text))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_searched: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_used: Option<usize>,
}

#[derive(Debug)]
pub enum ChatError {
    EmptyMessage,
    InvalidK(i64),
    Failed(anyhow::Error),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::EmptyMessage => write!(f, "Empty message"),
            ChatError::InvalidK(k) => write!(f, "k must be >= 1 (got {})", k),
            ChatError::Failed(e) => write!(f, "Error processing chat: {}", e),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<anyhow::Error> for ChatError {
    fn from(e: anyhow::Error) -> Self {
        ChatError::Failed(e)
    }
}

/// Answer one chat request.
pub async fn answer(
    config: &Config,
    pool: &SqlitePool,
    request: ChatRequest,
) -> Result<ChatResponse, ChatError> {
    let query = request.message.trim();
    if query.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let k = match request.k {
        None => config.retrieval.top_k,
        Some(k) if k < 1 => return Err(ChatError::InvalidK(k)),
        Some(k) => (k as usize).min(config.retrieval.max_k),
    };

    let provider = request
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(&config.llm.default_provider)
        .to_lowercase();

    tracing::info!(
        provider = %provider,
        k,
        documents = ?request.document_ids,
        "chat request"
    );

    let retrieval = retrieve::retrieve(config, pool, query, &request.document_ids, k).await?;

    if retrieval.chunks_searched == 0 {
        return Ok(ChatResponse {
            answer: NO_DOCUMENTS_ANSWER.to_string(),
            sources: Vec::new(),
            chunks_searched: None,
            chunks_used: None,
        });
    }

    let answer = llm::generate_answer(
        config,
        query,
        &retrieval.context,
        &provider,
        request.model.as_deref(),
    )
    .await;

    Ok(ChatResponse {
        answer,
        chunks_searched: Some(retrieval.chunks_searched),
        chunks_used: Some(retrieval.hits.len()),
        sources: retrieval.hits,
    })
}

/// CLI entry point: ask a question and print the answer with its sources.
pub async fn run_ask(config: &Config, request: ChatRequest) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = answer(config, &pool, request).await;
    pool.close().await;

    let response = result.map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("{}", response.answer);
    if response.sources.is_empty() {
        return Ok(());
    }

    println!();
    println!("--- Sources ({}) ---", response.sources.len());
    for source in &response.sources {
        println!(
            "[{:.3}] document {} / chunk {}",
            source.score, source.document_id, source.order
        );
    }
    if let Some(searched) = response.chunks_searched {
        println!("searched {} chunks", searched);
    }
    Ok(())
}
