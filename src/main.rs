//! # pdfchat CLI
//!
//! The `pdfchat` binary answers questions about a directory of uploaded PDF
//! documents, either one-shot from the terminal or as an HTTP service.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat serve` | Start the HTTP API server |
//! | `pdfchat ask "<question>"` | Ask a question and print the sourced answer |
//! | `pdfchat documents` | List the PDF corpus |
//! | `pdfchat chats list` | List persisted chat sessions |
//! | `pdfchat chats show <id>` | Print a session's full turn list |
//! | `pdfchat chats delete <id>` | Delete a session |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use pdfchat::chats::ChatStore;
use pdfchat::config;
use pdfchat::embedding::create_embedder;
use pdfchat::engine::ChatEngine;
use pdfchat::llm::create_chat_model;
use pdfchat::loader;
use pdfchat::models::ChatTurn;

/// pdfchat — retrieval-augmented question answering over uploaded PDFs.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Ask questions about a directory of PDF documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Ask a question and print the answer with its sources.
    ///
    /// Without `--chat`, a new session is created under the lowest free
    /// numeric ID; with it, the turn continues that session.
    Ask {
        /// The question to ask.
        question: String,

        /// Continue an existing chat session by ID (e.g. `005`).
        #[arg(long)]
        chat: Option<String>,
    },

    /// List the PDF corpus with sizes and modification times.
    Documents,

    /// Inspect and manage persisted chat sessions.
    Chats {
        #[command(subcommand)]
        action: ChatsAction,
    },
}

#[derive(Subcommand)]
enum ChatsAction {
    /// List all sessions by ascending numeric ID.
    List,
    /// Print a session's full turn list.
    Show {
        /// Chat session ID.
        id: String,
    },
    /// Delete a session.
    Delete {
        /// Chat session ID.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            pdfchat::server::run_server(&cfg).await?;
        }
        Commands::Ask { question, chat } => {
            let embedder = create_embedder(&cfg.embedding)?;
            let model = create_chat_model(&cfg.llm)?;
            let engine = ChatEngine::new(
                cfg.corpus.dir.clone(),
                &cfg.chunking,
                &cfg.retrieval,
                embedder,
                model,
            );
            let store = Arc::new(ChatStore::new(cfg.chats.dir.clone())?);

            let chat_id = match chat.as_deref() {
                Some(raw) => pdfchat::chats::canonical_id(raw)?,
                None => store.allocate_id().await?,
            };

            let result = engine.answer(&chat_id, &question).await;

            let turn = ChatTurn {
                question: question.clone(),
                answer: result.answer.clone(),
                sources: result.sources.clone(),
                timestamp: chrono::Utc::now(),
            };
            store.create_or_append(Some(&chat_id), turn).await?;

            println!("[chat {}]", chat_id);
            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!();
                println!("Sources:");
                for s in &result.sources {
                    println!("  {} (page {})", s.source, s.page);
                }
            }
        }
        Commands::Documents => {
            let docs = loader::list_documents(&cfg.corpus.dir)?;
            if docs.is_empty() {
                println!("No documents uploaded.");
            } else {
                println!("{:<40} {:>10}  MODIFIED", "NAME", "SIZE");
                for doc in docs {
                    println!(
                        "{:<40} {:>10}  {}",
                        doc.name,
                        doc.size,
                        doc.modified.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Commands::Chats { action } => {
            let store = ChatStore::new(cfg.chats.dir.clone())?;
            match action {
                ChatsAction::List => {
                    let summaries = store.list().await?;
                    if summaries.is_empty() {
                        println!("No chat sessions.");
                    } else {
                        println!("{:<6} {:<20}  FIRST QUESTION", "ID", "STARTED");
                        for s in summaries {
                            println!(
                                "{:<6} {:<20}  {}",
                                s.id,
                                s.timestamp.format("%Y-%m-%d %H:%M:%S"),
                                s.question
                            );
                        }
                    }
                }
                ChatsAction::Show { id } => {
                    let turns = store.get(&id).await?;
                    for (i, turn) in turns.iter().enumerate() {
                        println!(
                            "--- turn {} ({})",
                            i + 1,
                            turn.timestamp.format("%Y-%m-%d %H:%M:%S")
                        );
                        println!("Q: {}", turn.question);
                        println!("A: {}", turn.answer);
                        for s in &turn.sources {
                            println!("   source: {} (page {})", s.source, s.page);
                        }
                    }
                }
                ChatsAction::Delete { id } => {
                    store.delete(&id).await?;
                    println!("Chat {} deleted.", id);
                }
            }
        }
    }

    Ok(())
}
