//! Rank table: the base vocabulary of mergeable byte fragments.
//!
//! A rank table maps every mergeable byte fragment to its rank. Lower ranks
//! were learned earlier and are merged first during BPE encoding. Ranks are
//! also the token ids of the base vocabulary, so they must form the dense
//! range `0..len`.
//!
//! # Invariants
//!
//! Checked once by [`RankTable::new`], never re-checked afterwards:
//!
//! - no fragment is empty and no fragment appears twice
//! - ranks are a permutation of `0..len`
//! - every byte that occurs in any fragment also has its own single-byte
//!   fragment, so any text over the vocabulary's alphabet can be reduced to
//!   tokens
//!
//! A table that ranks all 256 byte values is *byte complete*: every possible
//! input can be encoded.
//!
//! # Example
//!
//! ```
//! use rankbpe::RankTable;
//!
//! let table = RankTable::new([("a", 0), ("b", 1), ("ab", 2)]).unwrap();
//! assert_eq!(table.rank(b"ab"), Some(2));
//! assert_eq!(table.fragment(1), Some(&b"b"[..]));
//! assert!(!table.is_byte_complete());
//! ```

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors that can occur when building a rank table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    #[error("Empty fragment at rank {rank}")]
    EmptyFragment { rank: u32 },
    #[error("Fragment {} listed twice (ranks {first} and {second})", escape(.fragment))]
    DuplicateFragment {
        fragment: Vec<u8>,
        first: u32,
        second: u32,
    },
    #[error("Rank {rank} assigned to both {} and {}", escape(.first), escape(.second))]
    DuplicateRank {
        rank: u32,
        first: Vec<u8>,
        second: Vec<u8>,
    },
    #[error("Rank {rank} of fragment {} is outside the dense range 0..{len}", escape(.fragment))]
    RankOutOfRange {
        rank: u32,
        fragment: Vec<u8>,
        len: usize,
    },
    #[error("Byte 0x{byte:02x} in fragment {} has no single-byte rank", escape(.fragment))]
    MissingByte { byte: u8, fragment: Vec<u8> },
}

/// Render a fragment for error messages (`b"..."` with escapes).
fn escape(fragment: &[u8]) -> String {
    format!("b\"{}\"", fragment.escape_ascii())
}

/// Immutable fragment <-> rank mapping with its dense inverse.
#[derive(Debug, Clone)]
pub struct RankTable {
    encoder: FxHashMap<Vec<u8>, u32>,
    decoder: Vec<Vec<u8>>,
    byte_ranks: [Option<u32>; 256],
}

impl RankTable {
    /// Build a rank table from `(fragment, rank)` pairs.
    ///
    /// Accepts anything convertible into bytes (`&str`, `String`, `Vec<u8>`,
    /// `&[u8]`), so both a `HashMap<Vec<u8>, u32>` and an array of string
    /// literals work.
    pub fn new<I, K>(vocabulary: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<Vec<u8>>,
    {
        let mut encoder: FxHashMap<Vec<u8>, u32> = FxHashMap::default();

        for (fragment, rank) in vocabulary {
            let fragment = fragment.into();
            if fragment.is_empty() {
                return Err(VocabError::EmptyFragment { rank });
            }
            match encoder.entry(fragment) {
                Entry::Occupied(entry) => {
                    return Err(VocabError::DuplicateFragment {
                        fragment: entry.key().clone(),
                        first: *entry.get(),
                        second: rank,
                    });
                }
                Entry::Vacant(entry) => {
                    entry.insert(rank);
                }
            }
        }

        let decoder = build_decoder(&encoder)?;

        let mut byte_ranks = [None; 256];
        for (byte, slot) in byte_ranks.iter_mut().enumerate() {
            *slot = encoder.get([byte as u8].as_slice()).copied();
        }

        for fragment in encoder.keys() {
            if let Some(&byte) = fragment.iter().find(|&&b| byte_ranks[b as usize].is_none()) {
                return Err(VocabError::MissingByte {
                    byte,
                    fragment: fragment.clone(),
                });
            }
        }

        Ok(Self {
            encoder,
            decoder,
            byte_ranks,
        })
    }

    /// Rank of a fragment, or `None` if it is not mergeable.
    #[inline]
    pub fn rank(&self, fragment: &[u8]) -> Option<u32> {
        self.encoder.get(fragment).copied()
    }

    /// Rank of the single-byte fragment for `byte`.
    #[inline]
    pub fn byte_rank(&self, byte: u8) -> Option<u32> {
        self.byte_ranks[byte as usize]
    }

    /// Fragment bytes for a rank.
    #[inline]
    pub fn fragment(&self, rank: u32) -> Option<&[u8]> {
        self.decoder.get(rank as usize).map(Vec::as_slice)
    }

    /// Number of base tokens (`ranks` are `0..len`).
    pub fn len(&self) -> usize {
        self.decoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoder.is_empty()
    }

    /// Whether all 256 byte values have a rank.
    pub fn is_byte_complete(&self) -> bool {
        self.byte_ranks.iter().all(Option::is_some)
    }

    /// Get the encoder map (fragment -> rank).
    pub fn encoder(&self) -> &FxHashMap<Vec<u8>, u32> {
        &self.encoder
    }

    /// Iterate fragments in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.decoder
            .iter()
            .enumerate()
            .map(|(rank, fragment)| (rank as u32, fragment.as_slice()))
    }
}

/// Build the rank-indexed decoder (rank -> fragment) from an encoder map.
///
/// Fails unless the ranks are exactly a permutation of `0..encoder.len()`.
pub fn build_decoder(encoder: &FxHashMap<Vec<u8>, u32>) -> Result<Vec<Vec<u8>>, VocabError> {
    let len = encoder.len();
    let mut slots: Vec<Option<&Vec<u8>>> = vec![None; len];

    for (fragment, &rank) in encoder {
        let Some(slot) = slots.get_mut(rank as usize) else {
            return Err(VocabError::RankOutOfRange {
                rank,
                fragment: fragment.clone(),
                len,
            });
        };
        if let Some(first) = slot.replace(fragment) {
            // Report the pair in a stable order regardless of hash iteration.
            let (first, second) = if first <= fragment {
                (first, fragment)
            } else {
                (fragment, first)
            };
            return Err(VocabError::DuplicateRank {
                rank,
                first: first.clone(),
                second: second.clone(),
            });
        }
    }

    // `len` distinct keys with unique ranks below `len` fill every slot.
    Ok(slots.into_iter().flatten().cloned().collect())
}
