//! The rank table: an immutable map from byte pieces to merge ranks.
//!
//! A rank is both the merge priority of a piece (lower merges earlier) and
//! the token id emitted for it. Every single byte has an entry, so any byte
//! sequence can be encoded. The inverse map (rank -> piece) is built at
//! construction time and drives decoding.
//!
//! Tables are stored on disk in the tiktoken text format: one
//! `<base64 piece> <rank>` pair per line.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::error::{TokenizerError, TokenizerResult};

/// Token id / merge priority.
pub type Rank = u32;

/// Immutable piece <-> rank mapping.
#[derive(Debug, Clone)]
pub struct RankTable {
    /// Piece bytes → rank (for encoding)
    encoder: HashMap<Vec<u8>, Rank>,
    /// Rank → piece bytes (for decoding)
    decoder: HashMap<Rank, Vec<u8>>,
    /// Rank of each single-byte piece
    byte_ranks: [Rank; 256],
    max_rank: Rank,
}

impl RankTable {
    /// Build a table from `(piece, rank)` pairs.
    ///
    /// Fails if a piece is empty, if a piece or rank appears twice, or if
    /// any of the 256 single-byte pieces is missing.
    pub fn from_pairs<I>(pairs: I) -> TokenizerResult<Self>
    where
        I: IntoIterator<Item = (Vec<u8>, Rank)>,
    {
        let pairs = pairs.into_iter();
        let (lower, _) = pairs.size_hint();
        let mut encoder = HashMap::with_capacity(lower);
        let mut decoder = HashMap::with_capacity(lower);
        let mut max_rank = 0;

        for (piece, rank) in pairs {
            if rank == Rank::MAX {
                return Err(TokenizerError::InvalidRankTable(format!(
                    "rank {rank} is reserved"
                )));
            }
            if piece.is_empty() {
                return Err(TokenizerError::InvalidRankTable(format!(
                    "rank {rank} has an empty piece"
                )));
            }
            if decoder.contains_key(&rank) {
                return Err(TokenizerError::InvalidRankTable(format!(
                    "rank {rank} is assigned to more than one piece"
                )));
            }
            if let Some(previous) = encoder.insert(piece.clone(), rank) {
                return Err(TokenizerError::InvalidRankTable(format!(
                    "piece {:?} has ranks {previous} and {rank}",
                    String::from_utf8_lossy(&piece)
                )));
            }
            decoder.insert(rank, piece);
            max_rank = max_rank.max(rank);
        }

        let mut byte_ranks = [0; 256];
        for byte in 0u8..=255 {
            match encoder.get([byte].as_slice()) {
                Some(&rank) => byte_ranks[byte as usize] = rank,
                None => {
                    return Err(TokenizerError::InvalidRankTable(format!(
                        "no entry for single byte 0x{byte:02x}"
                    )))
                }
            }
        }

        Ok(Self {
            encoder,
            decoder,
            byte_ranks,
            max_rank,
        })
    }

    /// The 256 single-byte pieces, each ranked by its byte value.
    pub fn byte_level() -> Self {
        let mut encoder = HashMap::with_capacity(256);
        let mut decoder = HashMap::with_capacity(256);
        let mut byte_ranks = [0; 256];
        for byte in 0u8..=255 {
            encoder.insert(vec![byte], byte as Rank);
            decoder.insert(byte as Rank, vec![byte]);
            byte_ranks[byte as usize] = byte as Rank;
        }
        Self {
            encoder,
            decoder,
            byte_ranks,
            max_rank: 255,
        }
    }

    /// Return a new table with extra `(piece, rank)` entries appended.
    pub fn extended<I>(self, pieces: I) -> TokenizerResult<Self>
    where
        I: IntoIterator<Item = (Vec<u8>, Rank)>,
    {
        Self::from_pairs(self.encoder.into_iter().chain(pieces))
    }

    /// Parse the tiktoken text format.
    ///
    /// Blank lines are skipped; line numbers in errors are 1-based.
    pub fn parse_tiktoken(data: &[u8]) -> TokenizerResult<Self> {
        let mut pairs = Vec::new();

        for (idx, raw) in data.split(|&b| b == b'\n').enumerate() {
            let line = idx + 1;
            let text = std::str::from_utf8(raw).map_err(|_| TokenizerError::Parse {
                line,
                reason: "line is not valid UTF-8".into(),
            })?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            let mut fields = text.split_ascii_whitespace();
            let (Some(encoded), Some(rank), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(TokenizerError::Parse {
                    line,
                    reason: "expected `<base64 piece> <rank>`".into(),
                });
            };

            let piece = STANDARD.decode(encoded).map_err(|e| TokenizerError::Parse {
                line,
                reason: format!("bad base64 piece: {e}"),
            })?;
            let rank = rank.parse::<Rank>().map_err(|e| TokenizerError::Parse {
                line,
                reason: format!("bad rank {rank:?}: {e}"),
            })?;
            pairs.push((piece, rank));
        }

        Self::from_pairs(pairs)
    }

    /// Load a tiktoken rank file.
    pub fn load(path: &Path) -> TokenizerResult<Self> {
        let data = fs::read(path)?;
        Self::parse_loaded(path, &data)
    }

    /// Load a tiktoken rank file after checking its SHA-256 digest.
    ///
    /// The digest is compared before parsing; `expected` is hex and
    /// case-insensitive.
    pub fn load_verified(path: &Path, expected: &str) -> TokenizerResult<Self> {
        let data = fs::read(path)?;
        let actual = sha256_hex(&data);
        let expected = expected.trim().to_ascii_lowercase();
        if actual != expected {
            return Err(TokenizerError::ChecksumMismatch { expected, actual });
        }
        debug!("Checksum verified for {}: {}", path.display(), actual);
        Self::parse_loaded(path, &data)
    }

    fn parse_loaded(path: &Path, data: &[u8]) -> TokenizerResult<Self> {
        let start = Instant::now();
        let table = Self::parse_tiktoken(data)?;
        info!(
            "Loaded rank table {}: {} entries, max rank {} ({:.1?})",
            path.display(),
            table.len(),
            table.max_rank,
            start.elapsed()
        );
        Ok(table)
    }

    /// Render the table in the tiktoken text format, ordered by rank.
    pub fn to_tiktoken(&self) -> String {
        let mut ranks: Vec<Rank> = self.decoder.keys().copied().collect();
        ranks.sort_unstable();

        let mut out = String::with_capacity(ranks.len() * 12);
        for rank in ranks {
            let _ = writeln!(out, "{} {}", STANDARD.encode(&self.decoder[&rank]), rank);
        }
        out
    }

    /// Save the table to a tiktoken rank file.
    pub fn save(&self, path: &Path) -> TokenizerResult<()> {
        fs::write(path, self.to_tiktoken())?;
        Ok(())
    }

    /// Rank of a piece, if the piece is in the table.
    #[inline]
    pub fn get(&self, piece: &[u8]) -> Option<Rank> {
        self.encoder.get(piece).copied()
    }

    /// Rank of a single byte. Always present.
    #[inline]
    pub fn byte_rank(&self, byte: u8) -> Rank {
        self.byte_ranks[byte as usize]
    }

    /// Piece bytes for a rank.
    #[inline]
    pub fn piece(&self, rank: Rank) -> Option<&[u8]> {
        self.decoder.get(&rank).map(Vec::as_slice)
    }

    /// Number of pieces in the table.
    pub fn len(&self) -> usize {
        self.decoder.len()
    }

    /// Always false for a constructed table (the 256 bytes are mandatory).
    pub fn is_empty(&self) -> bool {
        self.decoder.is_empty()
    }

    /// Highest rank in the table.
    pub fn max_rank(&self) -> Rank {
        self.max_rank
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_pairs() -> Vec<(Vec<u8>, Rank)> {
        (0u8..=255).map(|b| (vec![b], b as Rank)).collect()
    }

    #[test]
    fn test_byte_level_has_256_entries() {
        let table = RankTable::byte_level();
        assert_eq!(table.len(), 256);
        assert_eq!(table.max_rank(), 255);
        assert_eq!(table.get(b"a"), Some(97));
        assert_eq!(table.piece(0xff), Some([0xffu8].as_slice()));
    }

    #[test]
    fn test_extended_adds_pieces() {
        let table = RankTable::byte_level()
            .extended([(b"ab".to_vec(), 256)])
            .unwrap();
        assert_eq!(table.len(), 257);
        assert_eq!(table.get(b"ab"), Some(256));
        assert_eq!(table.piece(256), Some(b"ab".as_slice()));
        assert_eq!(table.max_rank(), 256);
    }

    #[test]
    fn test_missing_byte_rejected() {
        let pairs = byte_pairs().into_iter().filter(|(p, _)| p[0] != b'z');
        let err = RankTable::from_pairs(pairs).unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidRankTable(ref m) if m.contains("0x7a")));
    }

    #[test]
    fn test_duplicate_rank_rejected() {
        let mut pairs = byte_pairs();
        pairs.push((b"ab".to_vec(), 5));
        assert!(matches!(
            RankTable::from_pairs(pairs),
            Err(TokenizerError::InvalidRankTable(_))
        ));
    }

    #[test]
    fn test_duplicate_piece_rejected() {
        let mut pairs = byte_pairs();
        pairs.push((b"a".to_vec(), 300));
        assert!(matches!(
            RankTable::from_pairs(pairs),
            Err(TokenizerError::InvalidRankTable(_))
        ));
    }

    #[test]
    fn test_reserved_rank_rejected() {
        let mut pairs = byte_pairs();
        pairs.push((b"ab".to_vec(), Rank::MAX));
        assert!(RankTable::from_pairs(pairs).is_err());
    }

    #[test]
    fn test_byte_rank_follows_table() {
        let pairs = (0u8..=255).map(|b| (vec![b], 255 - b as Rank));
        let table = RankTable::from_pairs(pairs).unwrap();
        assert_eq!(table.byte_rank(0), 255);
        assert_eq!(table.byte_rank(b'a'), 255 - 97);
    }

    #[test]
    fn test_empty_piece_rejected() {
        let mut pairs = byte_pairs();
        pairs.push((Vec::new(), 300));
        assert!(RankTable::from_pairs(pairs).is_err());
    }

    #[test]
    fn test_tiktoken_text_roundtrip() {
        let table = RankTable::byte_level()
            .extended([(b"he".to_vec(), 256), (b"llo".to_vec(), 257)])
            .unwrap();
        let text = table.to_tiktoken();
        assert!(text.starts_with("AA== 0\n"));
        assert!(text.ends_with("bGxv 257\n"));

        let parsed = RankTable::parse_tiktoken(text.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 258);
        assert_eq!(parsed.get(b"llo"), Some(257));
    }

    #[test]
    fn test_parse_reports_bad_lines() {
        let mut text = RankTable::byte_level().to_tiktoken();
        text.push_str("\n\nnot-base64! 300\n");
        match RankTable::parse_tiktoken(text.as_bytes()) {
            Err(TokenizerError::Parse { line, reason }) => {
                assert_eq!(line, 259);
                assert!(reason.contains("base64"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }

        match RankTable::parse_tiktoken(b"YQ==\n") {
            Err(TokenizerError::Parse { line: 1, .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }

        match RankTable::parse_tiktoken(b"YQ== -1\n") {
            Err(TokenizerError::Parse { line: 1, reason }) => assert!(reason.contains("rank")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_verified_checks_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranks.tiktoken");
        let table = RankTable::byte_level();
        table.save(&path).unwrap();

        let digest = sha256_hex(&fs::read(&path).unwrap());
        let loaded = RankTable::load_verified(&path, &digest.to_uppercase()).unwrap();
        assert_eq!(loaded.len(), 256);

        let wrong = "0".repeat(64);
        match RankTable::load_verified(&path, &wrong) {
            Err(TokenizerError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, wrong);
                assert_eq!(actual, digest);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_load_and_load_verified_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranks.tiktoken");
        RankTable::byte_level()
            .extended([(b"ab".to_vec(), 256)])
            .unwrap()
            .save(&path)
            .unwrap();

        let digest = sha256_hex(&fs::read(&path).unwrap());
        let plain = RankTable::load(&path).unwrap();
        let verified = RankTable::load_verified(&path, &digest).unwrap();
        assert_eq!(plain.to_tiktoken(), verified.to_tiktoken());
        assert_eq!(verified.get(b"ab"), Some(256));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = RankTable::load(Path::new("/nonexistent/ranks.tiktoken")).unwrap_err();
        assert!(matches!(err, TokenizerError::Io(_)));
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
