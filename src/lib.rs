//! # agentkb
//!
//! A multi-tenant retrieval-augmented-generation backend. Each agent owns an
//! isolated knowledge base; clients ingest web pages, PDFs, and raw text into
//! it and ask questions answered from the retrieved chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ SourceLoader │──▶│ IngestionPipeline │──▶│ KnowledgeStore │
//! │ web/pdf/text │   │ validate + chunk  │   │ SQLite + cos   │
//! └──────────────┘   └──────────────────┘   └───────┬───────┘
//!                                                   │ search
//!        ┌──────────┐   ┌────────────────────────────▼─┐
//!        │ ChatTurns │──▶│ RetrievalAugmentedAnswerer  │──▶ GenerationModel
//!        └──────────┘   └──────────────────────────────┘
//! ```
//!
//! [`service::RagService`] wires these together and is shared by the CLI
//! and the HTTP server. Models, traits, and the pure algorithms live in the
//! `agentkb-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`repository`] | Agent and chat persistence |
//! | [`loader`] / [`extract`] | Web, PDF, and text source loading |
//! | [`embedding`] / [`generation`] | Provider implementations |
//! | [`sqlite_store`] | SQLite knowledge store |
//! | [`ingest`] | Ingestion pipeline |
//! | [`service`] | Application context |
//! | [`server`] | HTTP API |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod repository;
pub mod server;
pub mod service;
pub mod sqlite_store;
