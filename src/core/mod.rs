// src/core/mod.rs

//! The resolution pipeline, from raw text to a classified outcome.

/// Cancellation helpers.
pub mod commons;
/// Text rendering of the command tree.
pub mod graph_display;
pub mod handlers;
pub mod manifest;
/// Conversion of bound tokens into typed arguments.
pub mod materializer;
pub mod matcher;
/// Value parsers and the registry that holds them.
pub mod parsers;
pub mod service;
/// Splitting raw input into tokens.
pub mod tokenizer;
pub mod tree;
