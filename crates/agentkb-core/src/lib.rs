//! # agentkb core
//!
//! Runtime-agnostic logic for agentkb: data models, the error taxonomy,
//! fingerprinting, chunking, load validation, chat-history context
//! building, confidence scoring, the embedding / generation / knowledge
//! store traits, an in-memory store, and the retrieval-augmented answerer.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete providers and the SQLite store live in the `agentkb` crate.

pub mod answer;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod models;
pub mod scoring;
pub mod store;
pub mod validate;

pub use error::{RagError, RagResult};
