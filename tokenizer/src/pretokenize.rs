//! Optional regex pre-splitting of text before the byte-pair merge.
//!
//! Merges never cross piece boundaries, so splitting bounds the merge cost
//! and lets the merge cache reuse work on repeated words. Splitting is
//! lossless: text between regex matches becomes its own piece.

use fancy_regex::{Regex, RegexBuilder};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TokenizerError, TokenizerResult};

/// Pre-split pattern of the `cl100k_base` encoding.
pub const CL100K_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Pre-split pattern of the `o200k_base` encoding.
pub const O200K_PATTERN: &str = concat!(
    r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|\p{N}{1,3}",
    r"| ?[^\s\p{L}\p{N}]+[\r\n/]*",
    r"|\s*[\r\n]+",
    r"|\s+(?!\S)",
    r"|\s+",
);

/// Which pre-split pattern to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// The whole input is a single piece.
    #[default]
    None,
    Cl100k,
    O200k,
    Custom(String),
}

impl Pattern {
    /// Regex source for this pattern, if any.
    pub fn as_regex(&self) -> Option<&str> {
        match self {
            Pattern::None => None,
            Pattern::Cl100k => Some(CL100K_PATTERN),
            Pattern::O200k => Some(O200K_PATTERN),
            Pattern::Custom(re) => Some(re.as_str()),
        }
    }
}

impl FromStr for Pattern {
    type Err = String;

    /// Accepts `none`, `cl100k`, `o200k`, or `custom:<regex>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Pattern::None),
            "cl100k" | "cl100k_base" => Ok(Pattern::Cl100k),
            "o200k" | "o200k_base" => Ok(Pattern::O200k),
            other => match other.strip_prefix("custom:") {
                Some(re) => Ok(Pattern::Custom(re.to_string())),
                None => Err(format!(
                    "unknown pattern {other:?} (expected none, cl100k, o200k or custom:<regex>)"
                )),
            },
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::None => f.write_str("none"),
            Pattern::Cl100k => f.write_str("cl100k"),
            Pattern::O200k => f.write_str("o200k"),
            Pattern::Custom(re) => write!(f, "custom:{re}"),
        }
    }
}

/// Compiled pre-split regex.
#[derive(Debug, Clone)]
pub struct Splitter {
    regex: Regex,
}

impl Splitter {
    pub fn new(pattern: &str) -> TokenizerResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| TokenizerError::Pattern(e.to_string()))?;
        Ok(Self { regex })
    }

    /// Compile `pattern` with a cap on backtracking steps per search.
    ///
    /// A search that exceeds the cap ends splitting early; see [`split`](Self::split).
    pub fn with_backtrack_limit(pattern: &str, limit: usize) -> TokenizerResult<Self> {
        let regex = RegexBuilder::new(pattern)
            .backtrack_limit(limit)
            .build()
            .map_err(|e| TokenizerError::Pattern(e.to_string()))?;
        Ok(Self { regex })
    }

    /// Compile `pattern`, or `None` when it disables splitting.
    pub fn from_pattern(pattern: &Pattern) -> TokenizerResult<Option<Self>> {
        pattern.as_regex().map(Self::new).transpose()
    }

    /// Split `text` into pieces whose concatenation is exactly `text`.
    ///
    /// If the regex fails at runtime, the unsplit remainder becomes the
    /// last piece.
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut pieces = Vec::new();
        let mut last = 0;

        for found in self.regex.find_iter(text) {
            let m = match found {
                Ok(m) => m,
                Err(e) => {
                    warn!("Pre-split regex failed at byte {last}, keeping remainder whole: {e}");
                    break;
                }
            };
            if m.start() > last {
                pieces.push(&text[last..m.start()]);
            }
            if !m.as_str().is_empty() {
                pieces.push(m.as_str());
            }
            last = m.end();
        }

        if last < text.len() {
            pieces.push(&text[last..]);
        }
        pieces
    }
}
