//! # ragcore
//!
//! Retrieval engine for question answering over a document corpus.
//!
//! Documents are split into chunks, each chunk is embedded, and the
//! normalized vectors are stored in an exact inner-product index. At answer
//! time the query is embedded with the same provider, the nearest chunks are
//! retrieved, and a bounded context block is assembled for an external text
//! generator.
//!
//! The engine keeps three persisted stores mutually consistent across
//! rebuilds: the chunk corpus, the embedding matrix and the index.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────────────┐
//! │ Documents │──▶│ Chunk+Embed  │──▶│ chunks.jsonl          │
//! │ (dir)     │   │ IndexBuilder │   │ embeddings.npy        │
//! └───────────┘   └──────────────┘   │ index.flat            │
//!                                    └──────────┬────────────┘
//!                                               ▼
//!                 ┌──────────┐   ┌──────────────────────────┐
//!                 │ CLI/HTTP │◀──│ SearchEngine + Retrieval │
//!                 │ (rag)    │   │ (cached snapshot)        │
//!                 └──────────┘   └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest ./docs                  # chunk, embed, build
//! rag search "password reset" --top-k 3
//! rag ask "How do I reset my password?"
//! rag serve                          # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Engine error type |
//! | [`models`] | Core data types |
//! | [`documents`] | Document discovery and loading |
//! | [`chunk`] | Word-window text chunking |
//! | [`chunk_store`] | Persisted chunk corpus |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Normalization, similarity, `.npy` codec |
//! | [`index`] | Exact inner-product index |
//! | [`builder`] | Full-replace index builds |
//! | [`search`] | Snapshot loading and nearest-neighbor search |
//! | [`cache`] | Process-wide snapshot cache |
//! | [`retrieval`] | Answer-context assembly and prompt rendering |
//! | [`service`] | Facade used by the CLI and the server |
//! | [`summarize`] | Extractive summaries |
//! | [`server`] | JSON HTTP server |
//! | [`commands`] | CLI command implementations |

mod atomic;
pub mod builder;
pub mod cache;
pub mod chunk;
pub mod chunk_store;
pub mod commands;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod retrieval;
pub mod search;
pub mod server;
pub mod service;
pub mod summarize;
pub mod vector;

pub use error::{RagError, Result};
