//! The encode/decode facade over a rank table.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bpe::byte_pair_encode;
use crate::cache::MergeCache;
use crate::config::TokenizerConfig;
use crate::error::{TokenizerError, TokenizerResult};
use crate::pretokenize::{Pattern, Splitter};
use crate::ranks::{Rank, RankTable};

/// Default number of pieces kept in the merge cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Byte-level BPE tokenizer.
///
/// The rank table is shared read-only, so a `Tokenizer` can be used from
/// many threads at once.
#[derive(Debug)]
pub struct Tokenizer {
    ranks: Arc<RankTable>,
    splitter: Option<Splitter>,
    cache: MergeCache,
    special_encoder: HashMap<String, Rank>,
    special_decoder: HashMap<Rank, Vec<u8>>,
}

impl Tokenizer {
    /// A tokenizer over `ranks` with no pre-splitting.
    pub fn new(ranks: RankTable) -> Self {
        Self::from_shared(Arc::new(ranks))
    }

    /// A tokenizer over a table shared with other tokenizers.
    pub fn from_shared(ranks: Arc<RankTable>) -> Self {
        Self {
            ranks,
            splitter: None,
            cache: MergeCache::new(DEFAULT_CACHE_CAPACITY),
            special_encoder: HashMap::new(),
            special_decoder: HashMap::new(),
        }
    }

    /// A tokenizer over the 256 single-byte pieces.
    pub fn byte_level() -> Self {
        Self::new(RankTable::byte_level())
    }

    /// Build a tokenizer from a config, loading (and verifying) the rank file.
    pub fn from_config(config: &TokenizerConfig) -> TokenizerResult<Self> {
        let ranks = match (&config.ranks, &config.sha256) {
            (Some(path), Some(digest)) => RankTable::load_verified(path, digest)?,
            (Some(path), None) => RankTable::load(path)?,
            (None, Some(_)) => {
                return Err(TokenizerError::ConfigValue(
                    "sha256 is set but there is no rank file to verify".into(),
                ))
            }
            (None, None) => RankTable::byte_level(),
        };

        Self::new(ranks)
            .with_pattern(&config.pattern)?
            .with_cache_capacity(config.cache_capacity)
            .with_special_tokens(config.special_tokens.clone())
    }

    /// Pre-split text with `pattern` before merging.
    pub fn with_pattern(mut self, pattern: &Pattern) -> TokenizerResult<Self> {
        self.splitter = Splitter::from_pattern(pattern)?;
        Ok(self)
    }

    /// Pre-split text with an already compiled splitter.
    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Resize the merge cache; zero disables it.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = MergeCache::new(capacity);
        self
    }

    /// Register special tokens (literal text → id).
    ///
    /// Ids must not collide with the rank table or with each other, and
    /// `Rank::MAX` is reserved.
    pub fn with_special_tokens(
        mut self,
        tokens: HashMap<String, Rank>,
    ) -> TokenizerResult<Self> {
        let mut decoder = HashMap::with_capacity(tokens.len());
        for (text, &id) in &tokens {
            if text.is_empty() {
                return Err(TokenizerError::SpecialToken(format!(
                    "token with id {id} has empty text"
                )));
            }
            if id == Rank::MAX {
                return Err(TokenizerError::SpecialToken(format!(
                    "{text:?} uses reserved id {id}"
                )));
            }
            if self.ranks.piece(id).is_some() || decoder.contains_key(&id) {
                return Err(TokenizerError::SpecialToken(format!(
                    "{text:?} reuses id {id}"
                )));
            }
            decoder.insert(id, text.as_bytes().to_vec());
        }
        self.special_encoder = tokens;
        self.special_decoder = decoder;
        Ok(self)
    }

    /// Encode text into token ids. Special-token literals are treated as
    /// ordinary text.
    pub fn encode(&self, text: &str) -> Vec<Rank> {
        let mut tokens = Vec::new();
        self.encode_ordinary_into(text, &mut tokens);
        tokens
    }

    fn encode_ordinary_into(&self, text: &str, out: &mut Vec<Rank>) {
        match &self.splitter {
            None => out.extend(self.encode_piece(text.as_bytes())),
            Some(splitter) => {
                for piece in splitter.split(text) {
                    out.extend(self.encode_piece(piece.as_bytes()));
                }
            }
        }
    }

    fn encode_piece(&self, piece: &[u8]) -> Vec<Rank> {
        if piece.len() < 2 {
            return byte_pair_encode(piece, &self.ranks);
        }
        self.cache
            .get_or_insert_with(piece, |p| byte_pair_encode(p, &self.ranks))
    }

    /// Encode text, emitting registered special tokens where their literal
    /// text appears (leftmost match, longest literal on ties).
    pub fn encode_with_special_tokens(&self, text: &str) -> Vec<Rank> {
        let mut tokens = Vec::new();
        let mut rest = text;

        while let Some((start, literal, id)) = self.find_special(rest) {
            self.encode_ordinary_into(&rest[..start], &mut tokens);
            tokens.push(id);
            rest = &rest[start + literal.len()..];
        }
        self.encode_ordinary_into(rest, &mut tokens);
        tokens
    }

    fn find_special<'a>(&'a self, text: &str) -> Option<(usize, &'a str, Rank)> {
        let mut best: Option<(usize, &str, Rank)> = None;
        for (literal, &id) in &self.special_encoder {
            if let Some(start) = text.find(literal.as_str()) {
                let better = match best {
                    None => true,
                    Some((s, l, _)) => start < s || (start == s && literal.len() > l.len()),
                };
                if better {
                    best = Some((start, literal.as_str(), id));
                }
            }
        }
        best
    }

    /// Concatenated bytes of `tokens`, without UTF-8 validation.
    pub fn decode_bytes(&self, tokens: &[Rank]) -> TokenizerResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(tokens.len() * 4);
        for &id in tokens {
            let piece = self
                .ranks
                .piece(id)
                .or_else(|| self.special_decoder.get(&id).map(Vec::as_slice))
                .ok_or(TokenizerError::UnknownToken(id))?;
            bytes.extend_from_slice(piece);
        }
        Ok(bytes)
    }

    /// Decode token ids back to text.
    pub fn decode(&self, tokens: &[Rank]) -> TokenizerResult<String> {
        Ok(String::from_utf8(self.decode_bytes(tokens)?)?)
    }

    /// Decode token ids, replacing invalid UTF-8 with U+FFFD.
    pub fn decode_lossy(&self, tokens: &[Rank]) -> TokenizerResult<String> {
        Ok(String::from_utf8_lossy(&self.decode_bytes(tokens)?).into_owned())
    }

    /// Number of tokens `encode` produces for `text`.
    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Encode many texts in parallel.
    pub fn encode_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Vec<Rank>> {
        texts.par_iter().map(|t| self.encode(t.as_ref())).collect()
    }

    /// Decode many sequences in parallel; fails on the first bad sequence.
    pub fn decode_batch(&self, batch: &[Vec<Rank>]) -> TokenizerResult<Vec<String>> {
        batch.par_iter().map(|tokens| self.decode(tokens)).collect()
    }

    /// Id of a piece or special-token literal.
    pub fn token_to_id(&self, token: &str) -> Option<Rank> {
        self.special_encoder
            .get(token)
            .copied()
            .or_else(|| self.ranks.get(token.as_bytes()))
    }

    /// Bytes of a token id (ordinary or special).
    pub fn piece(&self, id: Rank) -> Option<&[u8]> {
        self.ranks
            .piece(id)
            .or_else(|| self.special_decoder.get(&id).map(Vec::as_slice))
    }

    /// Ordinary pieces plus special tokens.
    pub fn vocab_size(&self) -> usize {
        self.ranks.len() + self.special_decoder.len()
    }

    /// Highest token id this tokenizer can emit.
    pub fn max_token_id(&self) -> Rank {
        self.special_decoder
            .keys()
            .copied()
            .fold(self.ranks.max_rank(), Rank::max)
    }

    pub fn special_tokens(&self) -> &HashMap<String, Rank> {
        &self.special_encoder
    }

    pub fn ranks(&self) -> &RankTable {
        &self.ranks
    }

    pub fn cache(&self) -> &MergeCache {
        &self.cache
    }
}
