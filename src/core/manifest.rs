// src/core/manifest.rs

//! # Manifest
//!
//! A manifest is a TOML file that declares the command modules of an
//! application plus the options of the service that resolves them:
//!
//! ```toml
//! [options]
//! ambiguity = "reject"
//!
//! [[modules]]
//! group = "math"
//!
//! [[modules.commands]]
//! name = "sum"
//! handler = "sum"
//! parameters = [{ name = "values", type = "i64", collection = true, min = 1 }]
//! ```

use crate::{constants, models::ModuleDescriptor};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{fs, path::Path};

/// What to do when more than one candidate could run for the same input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Run the first candidate, in declaration order, whose arguments materialize.
    #[default]
    FirstMatch,
    /// Refuse to run anything and report every candidate that could.
    Reject,
}

impl std::str::FromStr for AmbiguityPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-match" | "first" => Ok(AmbiguityPolicy::FirstMatch),
            "reject" => Ok(AmbiguityPolicy::Reject),
            other => Err(anyhow!(
                "Unknown ambiguity policy '{}' (expected 'first-match' or 'reject').",
                other
            )),
        }
    }
}

/// The `[options]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceOptions {
    /// How several runnable candidates are handled.
    pub ambiguity: AmbiguityPolicy,
    /// How often a running handler is checked for cancellation.
    pub cancellation_poll_ms: u64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::default(),
            cancellation_poll_ms: constants::DEFAULT_CANCELLATION_POLL_MS,
        }
    }
}

impl ServiceOptions {
    /// Applies overrides from the environment (`CMDTREE_AMBIGUITY`).
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(std::env::var(constants::ENV_AMBIGUITY).ok().as_deref())
    }

    fn apply_overrides(mut self, ambiguity: Option<&str>) -> Result<Self> {
        if let Some(raw) = ambiguity
            && !raw.trim().is_empty()
        {
            self.ambiguity = raw
                .parse()
                .with_context(|| format!("Invalid value in {}", constants::ENV_AMBIGUITY))?;
            log::debug!("Ambiguity policy overridden to {:?}", self.ambiguity);
        }
        Ok(self)
    }
}

/// A parsed manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Service options.
    pub options: ServiceOptions,
    /// Top-level modules, in declaration order.
    pub modules: Vec<ModuleDescriptor>,
}

/// Parses manifest text.
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    toml::from_str(content).context("Failed to parse manifest")
}

/// Reads and parses the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    log::debug!("Loading manifest from '{}'", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest at '{}'", path.display()))?;
    parse_manifest(&content).with_context(|| format!("Invalid manifest '{}'", path.display()))
}
