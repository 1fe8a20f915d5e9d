//! Byte-pair merging of a single chunk against a [`RankTable`].
//!
//! A chunk starts as one fragment per byte. At every step the adjacent pair
//! whose concatenation has the lowest rank is merged; on equal ranks the
//! leftmost pair goes first. Merging stops once no adjacent concatenation is
//! in the table.
//!
//! Fragments live in a flat-array doubly-linked list, so a merge is O(1) and
//! only the two pairs touching the merged fragment need new ranks. Two
//! strategies pick the next pair and always produce identical output:
//!
//! - [`MergeStrategy::Scan`]: rescan the list for the minimum after every
//!   merge. O(n²), but fastest for the short chunks pre-tokenization yields.
//! - [`MergeStrategy::Heap`]: a min-heap of `(rank, position)` with lazy
//!   invalidation of stale entries. O(n log n) for long unbroken runs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ops::Range;

use super::vocab::RankTable;

/// Rank of a pair that cannot merge.
const UNMERGEABLE: u32 = u32::MAX;

/// Missing link marker.
const NONE: usize = usize::MAX;

/// Chunks longer than this use the heap under [`MergeStrategy::Auto`].
const HEAP_THRESHOLD: usize = 32;

/// How the merge loop finds the next pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Scan for short chunks, heap for long ones.
    #[default]
    Auto,
    Scan,
    Heap,
}

/// A fragment in the merge list. `rank` caches the rank of merging this
/// fragment with its successor.
struct Node {
    start: usize,
    rank: u32,
    prev: usize,
    next: usize,
}

struct MergeList<'a> {
    piece: &'a [u8],
    ranks: &'a RankTable,
    nodes: Vec<Node>,
}

impl<'a> MergeList<'a> {
    fn new(piece: &'a [u8], ranks: &'a RankTable) -> Self {
        let n = piece.len();
        let nodes = (0..n)
            .map(|i| Node {
                start: i,
                rank: UNMERGEABLE,
                prev: if i > 0 { i - 1 } else { NONE },
                next: if i + 1 < n { i + 1 } else { NONE },
            })
            .collect();
        let mut list = Self {
            piece,
            ranks,
            nodes,
        };
        for i in 0..n {
            list.nodes[i].rank = list.pair_rank(i);
        }
        list
    }

    /// End offset of the fragment at node `i`.
    #[inline]
    fn end(&self, i: usize) -> usize {
        match self.nodes[i].next {
            NONE => self.piece.len(),
            next => self.nodes[next].start,
        }
    }

    /// Rank of merging node `i` with its successor.
    #[inline]
    fn pair_rank(&self, i: usize) -> u32 {
        let next = self.nodes[i].next;
        if next == NONE {
            return UNMERGEABLE;
        }
        let span = self.nodes[i].start..self.end(next);
        self.ranks.rank(&self.piece[span]).unwrap_or(UNMERGEABLE)
    }

    /// Merge node `i` with its successor and refresh the affected ranks.
    ///
    /// Returns `i` and its predecessor (if any) so a caller tracking ranks
    /// externally can requeue them.
    fn merge(&mut self, i: usize) -> (usize, Option<usize>) {
        let j = self.nodes[i].next;
        let after = self.nodes[j].next;
        self.nodes[i].next = after;
        if after != NONE {
            self.nodes[after].prev = i;
        }
        self.nodes[j].rank = UNMERGEABLE;
        self.nodes[j].next = NONE;

        self.nodes[i].rank = self.pair_rank(i);
        let prev = self.nodes[i].prev;
        if prev != NONE {
            self.nodes[prev].rank = self.pair_rank(prev);
            (i, Some(prev))
        } else {
            (i, None)
        }
    }

    /// Leftmost node holding the lowest mergeable rank.
    fn min_pair(&self) -> Option<usize> {
        let mut best: Option<(u32, usize)> = None;
        let mut cur = 0;
        while cur != NONE {
            let rank = self.nodes[cur].rank;
            if rank != UNMERGEABLE && best.map_or(true, |(r, _)| rank < r) {
                best = Some((rank, cur));
            }
            cur = self.nodes[cur].next;
        }
        best.map(|(_, i)| i)
    }

    fn run_scan(&mut self) {
        while let Some(i) = self.min_pair() {
            self.merge(i);
        }
    }

    fn run_heap(&mut self) {
        // Node indices are byte positions and never reorder, so the heap's
        // `(rank, index)` order is "lowest rank, then leftmost".
        let mut heap: BinaryHeap<Reverse<(u32, usize)>> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.rank != UNMERGEABLE)
            .map(|(i, node)| Reverse((node.rank, i)))
            .collect();

        while let Some(Reverse((rank, i))) = heap.pop() {
            if self.nodes[i].rank != rank {
                continue;
            }
            let (merged, prev) = self.merge(i);
            for k in std::iter::once(merged).chain(prev) {
                let rank = self.nodes[k].rank;
                if rank != UNMERGEABLE {
                    heap.push(Reverse((rank, k)));
                }
            }
        }
    }

    fn fragments(&self) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut cur = if self.nodes.is_empty() { NONE } else { 0 };
        while cur != NONE {
            out.push(self.nodes[cur].start..self.end(cur));
            cur = self.nodes[cur].next;
        }
        out
    }
}

/// Merge `piece` and return the byte ranges of the final fragments, left to
/// right.
///
/// Every range is either a ranked fragment or a single byte. A single byte
/// only lacks a rank when the table is a partial alphabet.
pub fn byte_pair_merge(
    piece: &[u8],
    ranks: &RankTable,
    strategy: MergeStrategy,
) -> Vec<Range<usize>> {
    match piece.len() {
        0 => return Vec::new(),
        1 => return vec![0..1],
        _ => {}
    }

    let mut list = MergeList::new(piece, ranks);
    let use_heap = match strategy {
        MergeStrategy::Auto => piece.len() > HEAP_THRESHOLD,
        MergeStrategy::Scan => false,
        MergeStrategy::Heap => true,
    };
    if use_heap {
        list.run_heap();
    } else {
        list.run_scan();
    }
    list.fragments()
}

/// Merge `piece` and return the final fragments as byte slices.
pub fn byte_pair_split<'a>(piece: &'a [u8], ranks: &RankTable) -> Vec<&'a [u8]> {
    byte_pair_merge(piece, ranks, MergeStrategy::Auto)
        .into_iter()
        .map(|range| &piece[range])
        .collect()
}

/// Merge `piece` and return the ranks of the final fragments.
///
/// Bytes that have no rank in a partial alphabet are skipped, so the ranks
/// only decode back to `piece` when every byte is ranked. Use
/// [`Tokenizer::try_encode`](super::Tokenizer::try_encode) to reject such
/// bytes instead.
pub fn byte_pair_encode(piece: &[u8], ranks: &RankTable) -> Vec<u32> {
    byte_pair_merge(piece, ranks, MergeStrategy::Auto)
        .into_iter()
        .filter_map(|range| ranks.rank(&piece[range]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// All 256 bytes at ranks 0..256, then `merges` in order.
    fn table(merges: &[&str]) -> RankTable {
        let bytes = (0u8..=255).map(|b| (vec![b], b as u32));
        let merged = merges
            .iter()
            .enumerate()
            .map(|(i, m)| (m.as_bytes().to_vec(), 256 + i as u32));
        RankTable::new(bytes.chain(merged)).unwrap()
    }

    fn split(piece: &str, ranks: &RankTable, strategy: MergeStrategy) -> Vec<String> {
        byte_pair_merge(piece.as_bytes(), ranks, strategy)
            .into_iter()
            .map(|r| piece[r].to_string())
            .collect()
    }

    #[test]
    fn test_single_merge() {
        let ranks = RankTable::new([("a", 0), ("b", 1), ("ab", 2)]).unwrap();
        assert_eq!(byte_pair_encode(b"ab", &ranks), vec![2]);
        assert_eq!(byte_pair_encode(b"ba", &ranks), vec![1, 0]);
    }

    #[test]
    fn test_empty_and_single_byte() {
        let ranks = table(&[]);
        assert!(byte_pair_encode(b"", &ranks).is_empty());
        assert_eq!(byte_pair_encode(b"x", &ranks), vec![b'x' as u32]);
    }

    #[test]
    fn test_lowest_rank_wins_over_left_to_right() {
        // "bc" outranks "ab", so a left-to-right pass would be wrong.
        let ranks = table(&["bc", "ab"]);
        for strategy in [MergeStrategy::Scan, MergeStrategy::Heap] {
            assert_eq!(split("abc", &ranks, strategy), vec!["a", "bc"]);
        }
    }

    #[test]
    fn test_leftmost_wins_ties() {
        let ranks = table(&["aa"]);
        for strategy in [MergeStrategy::Scan, MergeStrategy::Heap] {
            assert_eq!(split("aaa", &ranks, strategy), vec!["aa", "a"]);
            assert_eq!(split("aaaaa", &ranks, strategy), vec!["aa", "aa", "a"]);
        }
    }

    #[test]
    fn test_merges_cascade() {
        let ranks = table(&["ll", "he", "hell", "llo", "hello"]);
        assert_eq!(split("hello", &ranks, MergeStrategy::Scan), vec!["hello"]);
    }

    #[test]
    fn test_unreachable_fragment_never_produced() {
        // "abcd" is ranked, but no merge sequence reaches it: "bc" merges
        // first and neither "abc" nor "bcd" exists.
        let ranks = table(&["bc", "ab", "cd", "abcd"]);
        for strategy in [MergeStrategy::Scan, MergeStrategy::Heap] {
            assert_eq!(split("abcd", &ranks, strategy), vec!["a", "bc", "d"]);
        }
    }

    #[test]
    fn test_scan_and_heap_agree_on_long_input() {
        let ranks = table(&["ab", "ba", "aa", "aba", "bab", "abab", "bb", "abba"]);
        let piece = "abbabaabababbbaabaababbababababbbbaaabababaabbaabbaababa";
        assert!(piece.len() > HEAP_THRESHOLD);
        assert_eq!(
            split(piece, &ranks, MergeStrategy::Scan),
            split(piece, &ranks, MergeStrategy::Heap)
        );
    }

    #[test]
    fn test_fragments_cover_piece() {
        let ranks = table(&["th", "he", "the", " t", " the"]);
        let piece = "the other theme then";
        let frags = byte_pair_merge(piece.as_bytes(), &ranks, MergeStrategy::Auto);
        let mut expected_start = 0;
        for range in &frags {
            assert_eq!(range.start, expected_start);
            assert!(range.end > range.start);
            expected_start = range.end;
        }
        assert_eq!(expected_start, piece.len());
    }

    #[test]
    fn test_partial_alphabet_skips_unranked_bytes() {
        let ranks = RankTable::new([("a", 0), ("b", 1), ("ab", 2)]).unwrap();
        assert_eq!(byte_pair_split(b"abcab", &ranks), vec![&b"ab"[..], b"c", b"ab"]);
        assert_eq!(byte_pair_encode(b"abcab", &ranks), vec![2, 2]);
    }
}
