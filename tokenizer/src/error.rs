//! Error type shared by every tokenizer operation.

use std::string::FromUtf8Error;

pub type TokenizerResult<T> = Result<T, TokenizerError>;

#[derive(thiserror::Error, Debug)]
pub enum TokenizerError {
    /// A token id passed to decode has no entry in the rank table.
    #[error("unknown token id {0}")]
    UnknownToken(u32),

    /// The bytes reassembled by decode are not valid UTF-8.
    #[error("decoded bytes are not valid UTF-8: {0}")]
    InvalidEncoding(#[from] FromUtf8Error),

    #[error("invalid rank table: {0}")]
    InvalidRankTable(String),

    #[error("rank file line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("rank file checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid special token: {0}")]
    SpecialToken(String),

    #[error("invalid pre-tokenizer pattern: {0}")]
    Pattern(String),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// The config is well-formed JSON but its settings contradict each other.
    #[error("invalid config: {0}")]
    ConfigValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TokenizerError {
    /// Whether the error came from decoding caller-supplied ids, as opposed
    /// to loading or configuring the tokenizer.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            TokenizerError::UnknownToken(_) | TokenizerError::InvalidEncoding(_)
        )
    }
}
