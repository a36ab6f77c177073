//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the upload and chat pipeline.

use serde::{Deserialize, Serialize};

/// An uploaded document as stored in SQLite.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub name: String,
    /// Path relative to `storage.upload_dir`, e.g. `documents/<uuid>_report.pdf`.
    pub file_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: i64,
}

/// A chunk of a document's text, ready to be stored with its embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: i64,
    pub order: i64,
    pub content: String,
    pub hash: String,
}

/// A stored chunk loaded back for index construction.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub order: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// One retrieval hit, as returned in chat `sources`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub document_id: i64,
    pub order: i64,
    pub score: f32,
}
