#![deny(missing_docs)]

//! Core library for the docjobs document ingestion service.

/// HTTP routing and REST handlers.
pub mod api;
mod clock;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Document loading, chunking, and vector index maintenance.
pub mod index;
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Job activity counters.
pub mod metrics;
/// External document-to-Markdown conversion.
pub mod preprocess;
/// Qdrant vector store integration.
pub mod qdrant;
