//! # docqa CLI
//!
//! The `docqa` binary uploads documents, answers questions about them, and
//! serves the same operations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa upload <path>` | Extract, chunk, embed, and store a file |
//! | `docqa documents` | List uploaded documents |
//! | `docqa get <id>` | Show a document and its chunks |
//! | `docqa delete <id>` | Delete a document and its stored file |
//! | `docqa search "<query>"` | Show the chunks most similar to a query |
//! | `docqa ask "<question>"` | Answer a question with an LLM |
//! | `docqa embed status` | Show which models embedded the stored chunks |
//! | `docqa embed rebuild` | Re-embed chunks with the configured model |
//! | `docqa serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! docqa init --config ./config/docqa.toml
//! docqa upload ./handbook.pdf
//! docqa ask "How many vacation days do I get?" --provider groq
//! docqa serve --config ./config/docqa.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{chat, config, documents, embed_cmd, ingest, logger, migrate, retrieve, server};

/// docqa: ask questions about your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: retrieval-augmented question answering over uploaded documents",
    version,
    long_about = "docqa stores uploaded PDF, DOCX, and text files, splits them into overlapping \
    chunks, embeds them, and answers questions by retrieving the most similar chunks and passing \
    them to Gemini or Groq. Everything is available from the CLI and over a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents and chunks tables.
    /// This command is idempotent; running it multiple times is safe.
    Init,

    /// Upload a file: store it, extract its text, chunk, and embed it.
    Upload {
        /// File to upload (.pdf, .docx, .txt; anything else is read as text).
        path: PathBuf,
    },

    /// List uploaded documents, newest first.
    Documents,

    /// Show a document and its chunks.
    Get {
        /// Document id.
        id: i64,
    },

    /// Delete a document, its chunks, and its stored file.
    Delete {
        /// Document id.
        id: i64,
    },

    /// Show the chunks most similar to a query, without calling an LLM.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Restrict the search to these documents (repeatable).
        #[arg(long = "doc")]
        docs: Vec<i64>,
    },

    /// Answer a question from the uploaded documents.
    Ask {
        question: String,

        /// LLM provider: `gemini` or `groq` (defaults to `[llm].default_provider`).
        #[arg(long)]
        provider: Option<String>,

        /// Model name override.
        #[arg(long)]
        model: Option<String>,

        /// Number of chunks to use as context.
        #[arg(long)]
        k: Option<i64>,

        /// Restrict retrieval to these documents (repeatable).
        #[arg(long = "doc")]
        docs: Vec<i64>,
    },

    /// Manage stored embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` unless `--bind` is given.
    Serve {
        /// Listen address override, e.g. `0.0.0.0:8000`.
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Embedding subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Count chunks per embedding model and flag stale ones.
    Status,

    /// Re-embed chunks with the configured provider and model.
    Rebuild {
        /// Override the configured batch size.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only re-embed chunks whose model differs from the configured one.
        #[arg(long)]
        stale: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init();

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Upload { path } => {
            ingest::run_upload(&cfg, &path).await?;
        }
        Commands::Documents => {
            documents::run_list(&cfg).await?;
        }
        Commands::Get { id } => {
            documents::run_get(&cfg, id).await?;
        }
        Commands::Delete { id } => {
            documents::run_delete(&cfg, id).await?;
        }
        Commands::Search { query, k, docs } => {
            retrieve::run_search(&cfg, &query, &docs, k).await?;
        }
        Commands::Ask {
            question,
            provider,
            model,
            k,
            docs,
        } => {
            let request = chat::ChatRequest {
                message: question,
                provider,
                model,
                document_ids: docs,
                k,
            };
            chat::run_ask(&cfg, request).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Status => {
                embed_cmd::run_embed_status(&cfg).await?;
            }
            EmbedAction::Rebuild { batch_size, stale } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size, stale).await?;
            }
        },
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
