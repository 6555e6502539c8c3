//! tokscope tokenizer — rank-table byte-level BPE.
//!
//! This crate applies a pre-built byte-pair-encoding rank table (the
//! tiktoken format used by `cl100k_base` / `o200k_base`) to text. It supports:
//!
//! - Byte-level BPE (every byte has a rank, so any text encodes)
//! - Byte-exact decode, with typed errors for unknown ids and invalid UTF-8
//! - Optional regex pre-splitting (`cl100k`, `o200k` or a custom pattern)
//! - Special tokens (`<|endoftext|>`, etc.)
//! - A thread-safe merge cache and rayon batch encode/decode
//! - SHA-256 verified loading of rank files
//!
//! ## Architecture
//!
//! Encoding follows the GPT-2/tiktoken merge:
//! 1. Split the UTF-8 bytes into single-byte parts
//! 2. Repeatedly merge the adjacent pair whose concatenation has the lowest
//!    rank (leftmost on ties)
//! 3. Emit the rank of each remaining part as its token id
//!
//! ## Usage
//!
//! ```rust
//! use tokscope_tokenizer::{Pattern, RankTable, Tokenizer};
//!
//! let ranks = RankTable::byte_level()
//!     .extended([(b"he".to_vec(), 256), (b"ll".to_vec(), 257)])?;
//! let tokenizer = Tokenizer::new(ranks).with_pattern(&Pattern::O200k)?;
//!
//! let encoded = tokenizer.encode("hello");
//! assert_eq!(encoded, vec![256, 257, b'o' as u32]);
//! assert_eq!(tokenizer.decode(&encoded)?, "hello");
//! # Ok::<(), tokscope_tokenizer::TokenizerError>(())
//! ```

pub mod bpe;
pub mod cache;
pub mod config;
pub mod error;
pub mod pretokenize;
pub mod ranks;
pub mod tokenizer;

#[cfg(feature = "python")]
pub mod python;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module entry point
#[cfg(feature = "python")]
#[pymodule]
fn tokscope_tokenizer_rs(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::PyTokenizer>()?;
    Ok(())
}

// Re-export main types
pub use cache::MergeCache;
pub use config::TokenizerConfig;
pub use error::{TokenizerError, TokenizerResult};
pub use pretokenize::{Pattern, Splitter};
pub use ranks::{sha256_hex, Rank, RankTable};
pub use tokenizer::Tokenizer;
