//! Hierarchical command resolution: tokenize a command line, match it against a
//! tree of command modules, bind typed arguments and run the handler, reporting
//! one of five outcomes.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared cancellation flag. Raise it with [`core::commons::cancel`].
pub type CancellationToken = Arc<AtomicBool>;

/// The `cmdtree` binary's argument parsing and demo commands.
pub mod cli;
/// Crate-wide constants.
pub mod constants;
pub mod core;
/// Tokens, values, descriptors, tree nodes and outcomes.
pub mod models;
