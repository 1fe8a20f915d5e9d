//! Special token table: literal markers mapped to reserved ids.
//!
//! Special tokens (`<|endoftext|>`, `<|im_start|>`, ...) are never merged.
//! They are recognised as literal substrings before pre-tokenization and
//! emitted directly as their reserved id. Matching is leftmost-longest: the
//! scan stops at the first position where any literal starts, and if several
//! literals start there the longest one wins.

use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::FxHashMap;

use super::tokenizer::TokenizerError;

/// A special token occurrence in a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialMatch {
    pub start: usize,
    pub end: usize,
    pub id: u32,
}

/// Immutable literal <-> id mapping with a compiled matcher.
#[derive(Debug, Clone)]
pub struct SpecialTokenTable {
    tokens: FxHashMap<String, u32>,
    decoder: FxHashMap<u32, String>,
    /// Matcher pattern index -> id.
    pattern_ids: Vec<u32>,
    matcher: Option<AhoCorasick>,
}

impl SpecialTokenTable {
    /// Build the table.
    ///
    /// The ids must be unique and fill `num_base_tokens..num_base_tokens + k`
    /// for `k` specials, in any order.
    pub fn new<I, T>(specials: I, num_base_tokens: usize) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = (T, u32)>,
        T: Into<String>,
    {
        let mut tokens: FxHashMap<String, u32> = FxHashMap::default();
        let mut decoder: FxHashMap<u32, String> = FxHashMap::default();

        for (token, id) in specials {
            let token = token.into();
            let conflict = |reason: String| TokenizerError::ConflictingSpecialToken {
                token: token.clone(),
                id,
                reason,
            };

            if token.is_empty() {
                return Err(conflict("empty literal".to_string()));
            }
            if (id as usize) < num_base_tokens {
                return Err(conflict(format!(
                    "id overlaps the base rank range 0..{num_base_tokens}"
                )));
            }
            if let Some(&other) = tokens.get(&token) {
                return Err(conflict(format!("literal already mapped to id {other}")));
            }
            if let Some(other) = decoder.get(&id) {
                return Err(conflict(format!("id already used by {other:?}")));
            }

            tokens.insert(token.clone(), id);
            decoder.insert(id, token);
        }

        // Order patterns by id so matcher indices are stable across builds.
        let mut by_id: Vec<(u32, &str)> =
            decoder.iter().map(|(&id, s)| (id, s.as_str())).collect();
        by_id.sort_unstable_by_key(|&(id, _)| id);
        let pattern_ids: Vec<u32> = by_id.iter().map(|&(id, _)| id).collect();

        // Ids must fill `n..n + k` exactly, so every id past the end is unknown.
        let end = num_base_tokens + by_id.len();
        if let Some((i, &(id, token))) = by_id
            .iter()
            .enumerate()
            .find(|&(i, &(id, _))| id as usize != num_base_tokens + i)
        {
            let expected = num_base_tokens + i;
            return Err(TokenizerError::ConflictingSpecialToken {
                token: token.to_string(),
                id,
                reason: format!(
                    "special ids must fill the range {num_base_tokens}..{end}; \
                     id {expected} is unused"
                ),
            });
        }

        let matcher = if by_id.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(by_id.iter().map(|&(_, literal)| literal))?,
            )
        };

        Ok(Self {
            tokens,
            decoder,
            pattern_ids,
            matcher,
        })
    }

    /// Id of a literal.
    pub fn id(&self, token: &str) -> Option<u32> {
        self.tokens.get(token).copied()
    }

    /// Literal of an id.
    pub fn literal(&self, id: u32) -> Option<&str> {
        self.decoder.get(&id).map(String::as_str)
    }

    pub fn contains_id(&self, id: u32) -> bool {
        self.decoder.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Highest reserved id, if any.
    pub fn max_id(&self) -> Option<u32> {
        self.pattern_ids.last().copied()
    }

    /// Get the special tokens map (literal -> id).
    pub fn tokens(&self) -> &FxHashMap<String, u32> {
        &self.tokens
    }

    /// Get the special tokens decoder map (id -> literal).
    pub fn decoder(&self) -> &FxHashMap<u32, String> {
        &self.decoder
    }

    /// Non-overlapping special token occurrences in `text`, left to right.
    pub fn find_iter<'a>(&'a self, text: &'a str) -> SpecialMatches<'a> {
        SpecialMatches {
            inner: self.matcher.as_ref().map(|m| m.find_iter(text)),
            pattern_ids: &self.pattern_ids,
        }
    }
}

/// Iterator returned by [`SpecialTokenTable::find_iter`].
pub struct SpecialMatches<'a> {
    inner: Option<aho_corasick::FindIter<'a, 'a>>,
    pattern_ids: &'a [u32],
}

impl Iterator for SpecialMatches<'_> {
    type Item = SpecialMatch;

    fn next(&mut self) -> Option<SpecialMatch> {
        let m = self.inner.as_mut()?.next()?;
        Some(SpecialMatch {
            start: m.start(),
            end: m.end(),
            id: self.pattern_ids[m.pattern().as_usize()],
        })
    }
}
