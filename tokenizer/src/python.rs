use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use std::path::Path;

use crate::error::TokenizerError;
use crate::pretokenize::Pattern;
use crate::ranks::RankTable;
use crate::tokenizer::Tokenizer;

fn to_py_err(err: TokenizerError) -> PyErr {
    if err.is_decode_error() {
        PyValueError::new_err(err.to_string())
    } else {
        PyIOError::new_err(err.to_string())
    }
}

/// Python wrapper for the rank-table tokenizer
#[pyclass(name = "Tokenizer", module = "tokscope_tokenizer_rs")]
pub struct PyTokenizer {
    pub(crate) inner: Tokenizer,
}

#[pymethods]
impl PyTokenizer {
    /// Load a tiktoken rank file, optionally checking its SHA-256
    #[staticmethod]
    #[pyo3(signature = (path, sha256=None, pattern=None))]
    pub fn from_file(path: &str, sha256: Option<&str>, pattern: Option<&str>) -> PyResult<Self> {
        let ranks = match sha256 {
            Some(digest) => RankTable::load_verified(Path::new(path), digest),
            None => RankTable::load(Path::new(path)),
        }
        .map_err(to_py_err)?;

        let pattern = match pattern {
            Some(p) => p.parse::<Pattern>().map_err(PyValueError::new_err)?,
            None => Pattern::None,
        };
        let inner = Tokenizer::new(ranks)
            .with_pattern(&pattern)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Tokenizer over the 256 single-byte pieces
    #[staticmethod]
    pub fn byte_level() -> Self {
        Self {
            inner: Tokenizer::byte_level(),
        }
    }

    /// Encode text to a list of token IDs
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.inner.encode(text)
    }

    /// Decode a list of token IDs to a string
    pub fn decode(&self, ids: Vec<u32>) -> PyResult<String> {
        self.inner.decode(&ids).map_err(to_py_err)
    }

    /// Number of tokens the text encodes to
    pub fn count(&self, text: &str) -> usize {
        self.inner.count(text)
    }

    pub fn __len__(&self) -> usize {
        self.inner.vocab_size()
    }
}
