//! # docqa
//!
//! Retrieval-augmented question answering over uploaded documents.
//!
//! docqa stores uploaded files, splits their text into overlapping
//! character windows, embeds each window, and answers questions by
//! retrieving the most similar windows and handing them to a hosted LLM
//! (Gemini or Groq) as context. Operations are available from the CLI and
//! over a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Upload  │──▶│ Extract+Chunk│──▶│  SQLite   │
//! │ PDF/DOCX │   │   +Embed     │   │ text+blob │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │ scan per query
//!                                        ▼
//!                 ┌──────────┐     ┌───────────┐     ┌─────────┐
//!                 │ question │────▶│ flat IP   │────▶│   LLM   │
//!                 └──────────┘     │ index     │     │ answer  │
//!                                  └───────────┘     └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                        # create database
//! docqa upload ./handbook.pdf       # store, chunk, and embed a file
//! docqa search "vacation policy"    # inspect retrieval
//! docqa ask "How many vacation days?"
//! docqa serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`extract`] | Text extraction from PDF, DOCX, and text files |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Flat inner-product index |
//! | [`ingest`] | Upload pipeline |
//! | [`documents`] | Document listing and deletion |
//! | [`retrieve`] | Per-query retrieval |
//! | [`llm`] | Answer generation with Gemini or Groq |
//! | [`chat`] | Question answering |
//! | [`embed_cmd`] | Embedding maintenance |
//! | [`server`] | HTTP API server |
//! | [`logger`] | Tracing subscriber setup |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod documents;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod logger;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod vector_index;
