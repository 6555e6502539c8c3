//! Tokenizer configuration, loadable from a JSON file.
//!
//! ```json
//! {
//!   "ranks": "o200k_base.tiktoken",
//!   "sha256": "446a9538cb6c348e3516120d7c08b09f57c36495e2acfffe59a5bf8b0cfb1a2d",
//!   "pattern": "o200k",
//!   "cache_capacity": 4096,
//!   "special_tokens": { "<|endoftext|>": 199999 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TokenizerResult;
use crate::pretokenize::Pattern;
use crate::ranks::Rank;
use crate::tokenizer::DEFAULT_CACHE_CAPACITY;

/// Configuration for building a [`Tokenizer`](crate::Tokenizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Rank file in the tiktoken format; `None` uses the byte-level table
    pub ranks: Option<PathBuf>,
    /// Expected SHA-256 of the rank file (hex)
    pub sha256: Option<String>,
    /// Pre-split pattern applied before merging
    pub pattern: Pattern,
    /// Maximum number of pieces kept in the merge cache (0 disables it)
    pub cache_capacity: usize,
    /// Special tokens: literal text → id
    pub special_tokens: HashMap<String, Rank>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            ranks: None,
            sha256: None,
            pattern: Pattern::None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            special_tokens: HashMap::new(),
        }
    }
}

impl TokenizerConfig {
    /// Load a config from a JSON file.
    ///
    /// A relative `ranks` path is resolved against the config file's
    /// directory.
    pub fn load(path: &Path) -> TokenizerResult<Self> {
        let json = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&json)?;
        if let (Some(ranks), Some(dir)) = (&config.ranks, path.parent()) {
            if ranks.is_relative() {
                config.ranks = Some(dir.join(ranks));
            }
        }
        Ok(config)
    }

    /// Save the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> TokenizerResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
