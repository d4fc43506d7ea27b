//! # pdfchat
//!
//! Retrieval-augmented question answering over a mutable corpus of uploaded
//! PDF documents. Relevant document fragments are retrieved by semantic
//! similarity and fed, together with prior conversation turns, into a
//! language model to produce a sourced answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Chunker  │──▶│ Vector Index │  (lazy build,
//! │ PDF/page │   │ overlap  │   │  in-memory   │   invalidated on
//! └──────────┘   └──────────┘   └──────┬───────┘   corpus mutation)
//!                                      │
//!                               ┌──────▼───────┐   ┌────────────┐
//!                               │  ChatEngine  │──▶│ Chat Store │
//!                               │ retrieve+LLM │   │  NNN.json  │
//!                               └──────┬───────┘   └────────────┘
//!                                      │
//!                          ┌───────────┴──────────┐
//!                          ▼                      ▼
//!                     ┌─────────┐            ┌─────────┐
//!                     │   CLI   │            │  HTTP   │
//!                     └─────────┘            └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Per-page PDF text extraction |
//! | [`chunker`] | Fixed-size overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Language-model call contract |
//! | [`index`] | In-memory vector similarity index |
//! | [`engine`] | Conversational retrieval engine |
//! | [`chats`] | Persisted chat sessions |
//! | [`server`] | HTTP API |

pub mod chats;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod server;
