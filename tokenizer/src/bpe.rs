//! Byte-pair merge over a rank table.
//!
//! Algorithm:
//! 1. Start with one part per byte
//! 2. Find the adjacent pair whose concatenated bytes have the lowest rank
//!    (leftmost pair on ties) and merge it
//! 3. Stop when no adjacent concatenation is in the table
//!
//! The parts live in a flat-array doubly-linked list so a merge is O(1).
//! Short pieces find the minimum with a linear scan; long pieces keep the
//! candidate pairs in a min-heap with lazy invalidation.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::ranks::{Rank, RankTable};

/// Pieces longer than this use the heap-based merge.
const HEAP_THRESHOLD: usize = 32;

const NONE: usize = usize::MAX;

/// Marks "no merge possible" and removed nodes.
const NO_MERGE: Rank = Rank::MAX;

/// One part of the piece in the current merge state.
struct Node {
    /// Byte offset of the part within the piece
    start: usize,
    /// Token id of the part
    token: Rank,
    /// Rank of merging this part with its successor
    rank: Rank,
    prev: usize,
    next: usize,
}

/// Encode one piece into token ids.
pub fn byte_pair_encode(piece: &[u8], ranks: &RankTable) -> Vec<Rank> {
    match piece.len() {
        0 => Vec::new(),
        1 => vec![ranks.byte_rank(piece[0])],
        n if n <= HEAP_THRESHOLD => merge_linear(piece, ranks),
        _ => merge_heap(piece, ranks),
    }
}

fn build_nodes(piece: &[u8], ranks: &RankTable) -> Vec<Node> {
    let n = piece.len();
    piece
        .iter()
        .enumerate()
        .map(|(i, &byte)| Node {
            start: i,
            token: ranks.byte_rank(byte),
            rank: NO_MERGE,
            prev: if i > 0 { i - 1 } else { NONE },
            next: if i + 1 < n { i + 1 } else { NONE },
        })
        .collect()
}

/// Rank of merging node `i` with its successor.
#[inline]
fn pair_rank(nodes: &[Node], i: usize, piece: &[u8], ranks: &RankTable) -> Rank {
    let j = nodes[i].next;
    if j == NONE {
        return NO_MERGE;
    }
    let end = match nodes[j].next {
        NONE => piece.len(),
        k => nodes[k].start,
    };
    ranks.get(&piece[nodes[i].start..end]).unwrap_or(NO_MERGE)
}

/// Merge node `i` with its successor into a part with id `merged`.
///
/// Returns the predecessor of `i` (or `NONE`), whose pair rank is now stale.
fn merge_at(nodes: &mut [Node], i: usize, merged: Rank) -> usize {
    let j = nodes[i].next;
    let j_next = nodes[j].next;

    nodes[i].token = merged;
    nodes[i].next = j_next;
    if j_next != NONE {
        nodes[j_next].prev = i;
    }
    nodes[j].rank = NO_MERGE;
    nodes[j].next = NONE;
    nodes[j].prev = NONE;

    nodes[i].prev
}

fn collect_tokens(nodes: &[Node]) -> Vec<Rank> {
    let mut tokens = Vec::new();
    let mut cur = 0;
    while cur != NONE {
        tokens.push(nodes[cur].token);
        cur = nodes[cur].next;
    }
    tokens
}

/// Linear-scan merge: O(n) per merge step.
pub(crate) fn merge_linear(piece: &[u8], ranks: &RankTable) -> Vec<Rank> {
    if piece.is_empty() {
        return Vec::new();
    }
    let mut nodes = build_nodes(piece, ranks);
    for i in 0..nodes.len() {
        nodes[i].rank = pair_rank(&nodes, i, piece, ranks);
    }

    loop {
        // Strict `<` keeps the leftmost pair on equal ranks.
        let mut best = (NO_MERGE, NONE);
        let mut cur = 0;
        while cur != NONE {
            if nodes[cur].rank < best.0 {
                best = (nodes[cur].rank, cur);
            }
            cur = nodes[cur].next;
        }

        let (rank, i) = best;
        if rank == NO_MERGE {
            break;
        }

        let pred = merge_at(&mut nodes, i, rank);
        nodes[i].rank = pair_rank(&nodes, i, piece, ranks);
        if pred != NONE {
            nodes[pred].rank = pair_rank(&nodes, pred, piece, ranks);
        }
    }

    collect_tokens(&nodes)
}

/// Heap-based merge: O(log n) per merge step.
///
/// Heap entries are `(rank, node)`; node indices follow byte order, so the
/// smallest entry is the leftmost lowest-ranked pair. An entry is stale when
/// the node's current rank no longer matches it.
pub(crate) fn merge_heap(piece: &[u8], ranks: &RankTable) -> Vec<Rank> {
    if piece.is_empty() {
        return Vec::new();
    }
    let mut nodes = build_nodes(piece, ranks);
    let mut heap: BinaryHeap<Reverse<(Rank, usize)>> = BinaryHeap::with_capacity(nodes.len());

    for i in 0..nodes.len() {
        let rank = pair_rank(&nodes, i, piece, ranks);
        nodes[i].rank = rank;
        if rank != NO_MERGE {
            heap.push(Reverse((rank, i)));
        }
    }

    while let Some(Reverse((rank, i))) = heap.pop() {
        if nodes[i].rank != rank {
            continue;
        }

        let pred = merge_at(&mut nodes, i, rank);

        let new_rank = pair_rank(&nodes, i, piece, ranks);
        nodes[i].rank = new_rank;
        if new_rank != NO_MERGE {
            heap.push(Reverse((new_rank, i)));
        }

        if pred != NONE {
            let pred_rank = pair_rank(&nodes, pred, piece, ranks);
            nodes[pred].rank = pred_rank;
            if pred_rank != NO_MERGE {
                heap.push(Reverse((pred_rank, pred)));
            }
        }
    }

    collect_tokens(&nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(extra: &[(&str, Rank)]) -> RankTable {
        RankTable::byte_level()
            .extended(extra.iter().map(|&(p, r)| (p.as_bytes().to_vec(), r)))
            .unwrap()
    }

    /// Reference merge: rescan every adjacent pair after each merge.
    fn naive(piece: &[u8], ranks: &RankTable) -> Vec<Rank> {
        let mut parts: Vec<Vec<u8>> = piece.iter().map(|&b| vec![b]).collect();
        loop {
            let mut best: Option<(Rank, usize)> = None;
            for i in 0..parts.len().saturating_sub(1) {
                let joined = [parts[i].as_slice(), parts[i + 1].as_slice()].concat();
                if let Some(rank) = ranks.get(&joined) {
                    if best.map_or(true, |(r, _)| rank < r) {
                        best = Some((rank, i));
                    }
                }
            }
            let Some((_, i)) = best else { break };
            let right = parts.remove(i + 1);
            parts[i].extend(right);
        }
        parts.iter().map(|p| ranks.get(p).unwrap()).collect()
    }

    #[test]
    fn test_empty_and_single_byte() {
        let ranks = RankTable::byte_level();
        assert_eq!(byte_pair_encode(b"", &ranks), Vec::<Rank>::new());
        assert_eq!(byte_pair_encode(b"x", &ranks), vec![b'x' as Rank]);
    }

    #[test]
    fn test_merges_lowest_rank_first() {
        // "bc" outranks "ab", so "abc" becomes a + bc
        let ranks = table(&[("ab", 300), ("bc", 256)]);
        assert_eq!(byte_pair_encode(b"abc", &ranks), vec![b'a' as Rank, 256]);
    }

    #[test]
    fn test_chained_merges() {
        let ranks = table(&[("he", 256), ("hel", 257), ("ll", 258), ("hell", 259)]);
        // he, then hel (257) before ll (258), then hell
        let encoded = byte_pair_encode(b"hello", &ranks);
        assert_eq!(encoded, naive(b"hello", &ranks));
        assert_eq!(encoded, vec![259, b'o' as Rank]);
    }

    #[test]
    fn test_leftmost_pair_wins_tie() {
        // "aaa" has two "aa" pairs with the same rank; the left one merges
        let ranks = table(&[("aa", 256)]);
        assert_eq!(merge_linear(b"aaa", &ranks), vec![256, b'a' as Rank]);
        assert_eq!(merge_heap(b"aaa", &ranks), vec![256, b'a' as Rank]);
    }

    #[test]
    fn test_unreachable_piece_is_not_used() {
        // "abc" is in the table but neither "ab" nor "bc" is
        let ranks = table(&[("abc", 256)]);
        assert_eq!(
            byte_pair_encode(b"abc", &ranks),
            vec![b'a' as Rank, b'b' as Rank, b'c' as Rank]
        );
    }

    #[test]
    fn test_long_piece_uses_heap() {
        let ranks = table(&[("ab", 256), ("abab", 257)]);
        let piece = b"ab".repeat(40);
        let encoded = byte_pair_encode(&piece, &ranks);
        assert_eq!(encoded, vec![257; 20]);
        assert_eq!(encoded, merge_linear(&piece, &ranks));
    }

    proptest! {
        #[test]
        fn prop_heap_matches_linear_and_naive(piece in proptest::collection::vec(
            prop_oneof![Just(b'a'), Just(b'b'), Just(b'c')], 0..80)
        ) {
            let ranks = table(&[
                ("ab", 256), ("ba", 257), ("aa", 258), ("abc", 259),
                ("cc", 260), ("abab", 261), ("bc", 262), ("ccc", 263),
            ]);
            let expected = naive(&piece, &ranks);
            if piece.len() >= 2 {
                prop_assert_eq!(merge_linear(&piece, &ranks), expected.clone());
                prop_assert_eq!(merge_heap(&piece, &ranks), expected.clone());
            }
            prop_assert_eq!(byte_pair_encode(&piece, &ranks), expected);
        }
    }
}
