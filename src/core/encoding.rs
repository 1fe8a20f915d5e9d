//! Detailed encode output: ids with byte offsets and a special-token mask.

use std::ops::Range;

/// Which end of an [`Encoding`] to cut when truncating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TruncationDirection {
    /// Drop tokens from the start, keeping the most recent ones.
    Left,
    /// Drop tokens from the end.
    #[default]
    Right,
}

/// Token ids of one text together with where each came from.
///
/// All four vectors have the same length. `offsets[i]` is the byte range of
/// the input that token `i` covers; the ranges are contiguous and together
/// span the encoded input (minus bytes a partial alphabet could not encode).
/// `tokens[i]` holds the bytes of token `i`, which are exactly the input
/// bytes at `offsets[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pub ids: Vec<u32>,
    pub offsets: Vec<(usize, usize)>,
    pub tokens: Vec<Vec<u8>>,
    pub special_tokens_mask: Vec<bool>,
}

impl Encoding {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn push(&mut self, id: u32, span: Range<usize>, token: &[u8], special: bool) {
        self.ids.push(id);
        self.offsets.push((span.start, span.end));
        self.tokens.push(token.to_vec());
        self.special_tokens_mask.push(special);
    }

    /// Keep at most `max_len` tokens, cutting from `direction`.
    pub fn truncate(&mut self, max_len: usize, direction: TruncationDirection) {
        let len = self.len();
        if len <= max_len {
            return;
        }
        match direction {
            TruncationDirection::Right => {
                self.ids.truncate(max_len);
                self.offsets.truncate(max_len);
                self.tokens.truncate(max_len);
                self.special_tokens_mask.truncate(max_len);
            }
            TruncationDirection::Left => {
                let cut = len - max_len;
                self.ids.drain(..cut);
                self.offsets.drain(..cut);
                self.tokens.drain(..cut);
                self.special_tokens_mask.drain(..cut);
            }
        }
    }

    /// Byte range of the input covered by the tokens, if any.
    pub fn span(&self) -> Option<(usize, usize)> {
        let first = self.offsets.first()?;
        let last = self.offsets.last()?;
        Some((first.0, last.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Encoding {
        let mut enc = Encoding::default();
        enc.push(10, 0..2, b"ab", false);
        enc.push(99, 2..7, b"<end>", true);
        enc.push(11, 7..9, b"cd", false);
        enc
    }

    #[test]
    fn test_truncate_right() {
        let mut enc = sample();
        enc.truncate(2, TruncationDirection::Right);
        assert_eq!(enc.ids, vec![10, 99]);
        assert_eq!(enc.offsets, vec![(0, 2), (2, 7)]);
        assert_eq!(enc.tokens, vec![b"ab".to_vec(), b"<end>".to_vec()]);
        assert_eq!(enc.special_tokens_mask, vec![false, true]);
    }

    #[test]
    fn test_truncate_left() {
        let mut enc = sample();
        enc.truncate(1, TruncationDirection::Left);
        assert_eq!(enc.ids, vec![11]);
        assert_eq!(enc.offsets, vec![(7, 9)]);
        assert_eq!(enc.tokens, vec![b"cd".to_vec()]);
        assert_eq!(enc.special_tokens_mask, vec![false]);
    }

    #[test]
    fn test_truncate_longer_than_len_is_noop() {
        let mut enc = sample();
        enc.truncate(10, TruncationDirection::Left);
        assert_eq!(enc, sample());
    }

    #[test]
    fn test_span() {
        assert_eq!(sample().span(), Some((0, 9)));
        assert_eq!(Encoding::default().span(), None);
    }
}
