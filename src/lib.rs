#![deny(missing_docs)]

//! Core library for the AI tutor service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction, adapters, and fallback table.
pub mod embedding;
/// PDF text and metadata extraction.
pub mod extract;
/// Shared transport for the Gemini REST API.
pub mod gemini;
/// Text generation clients.
pub mod generation;
/// Similarity index and its persisted slot.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Retrieval-augmented tutor pipeline.
pub mod processing;
/// FIFO task queue gateway.
pub mod queue;
