use std::convert::Infallible;
use std::fmt;
use std::ops::Range;
use std::string::FromUtf8Error;

use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::bpe::{byte_pair_merge, MergeStrategy};
use super::encoding::Encoding;
use super::pretokenizer::{PreTokenizer, SplitRules};
use super::special::SpecialTokenTable;
use super::vocab::{RankTable, VocabError};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Invalid vocabulary: {0}")]
    InvalidVocabulary(#[from] VocabError),
    #[error("Conflicting special token {token:?} (id {id}): {reason}")]
    ConflictingSpecialToken { token: String, id: u32, reason: String },
    #[error("Unknown token id {0}")]
    UnknownTokenId(u32),
    #[error("Byte 0x{byte:02x} at offset {offset} has no rank in this vocabulary")]
    UnencodableByte { byte: u8, offset: usize },
    #[error("Decoding error: invalid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("Regex compilation error (fancy-regex): {0}")]
    Pattern(#[from] fancy_regex::Error),
    #[cfg(feature = "pcre2")]
    #[error("Regex compilation error (PCRE2): {0}")]
    Pcre2(#[from] pcre2::Error),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
    #[error("PCRE2 feature not enabled. Compile with --features pcre2")]
    Pcre2NotEnabled,
    #[error("PCRE2 backend requires a pattern pre-tokenizer")]
    PatternRequired,
}

/// Default regex pattern for cl100k_base (GPT-4, GPT-3.5-turbo)
pub const CL100K_BASE_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Default regex pattern for o200k_base (GPT-4o)
pub const O200K_BASE_PATTERN: &str = r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Default regex pattern for Llama 3/3.1/3.2/3.3 (same as o200k_base)
pub const LLAMA3_PATTERN: &str = O200K_BASE_PATTERN;

/// Receiver for the tokens produced by one encode pass.
trait Sink {
    type Error;

    /// `token` is the slice of the input the token covers.
    fn push(&mut self, id: u32, span: Range<usize>, token: &[u8], special: bool);

    /// Called for a byte a partial alphabet cannot encode.
    fn missing(&mut self, byte: u8, offset: usize) -> Result<(), Self::Error>;
}

fn drop_missing(byte: u8, offset: usize) {
    warn!("dropping byte 0x{byte:02x} at offset {offset}: not in the vocabulary");
}

impl Sink for Vec<u32> {
    type Error = Infallible;

    #[inline]
    fn push(&mut self, id: u32, _span: Range<usize>, _token: &[u8], _special: bool) {
        Vec::push(self, id);
    }

    fn missing(&mut self, byte: u8, offset: usize) -> Result<(), Infallible> {
        drop_missing(byte, offset);
        Ok(())
    }
}

impl Sink for Encoding {
    type Error = Infallible;

    #[inline]
    fn push(&mut self, id: u32, span: Range<usize>, token: &[u8], special: bool) {
        Encoding::push(self, id, span, token, special);
    }

    fn missing(&mut self, byte: u8, offset: usize) -> Result<(), Infallible> {
        drop_missing(byte, offset);
        Ok(())
    }
}

/// Fails on the first byte that cannot be encoded.
struct Strict(Vec<u32>);

impl Sink for Strict {
    type Error = TokenizerError;

    #[inline]
    fn push(&mut self, id: u32, _span: Range<usize>, _token: &[u8], _special: bool) {
        self.0.push(id);
    }

    fn missing(&mut self, byte: u8, offset: usize) -> Result<(), TokenizerError> {
        Err(TokenizerError::UnencodableByte { byte, offset })
    }
}

/// Byte-pair-encoding tokenizer over an immutable rank table and special
/// token table.
///
/// # Encoding
///
/// [`encode`](Self::encode) scans the text for special token literals
/// (leftmost, longest literal wins) and emits their reserved ids directly.
/// The plain spans in between are split into chunks by the pre-tokenizer and
/// every chunk is merged independently by the BPE merge engine. Merges never
/// cross a chunk boundary or touch the bytes of a special token.
///
/// # Decoding
///
/// [`decode_bytes`](Self::decode_bytes) concatenates the fragment of every
/// id and fails with [`TokenizerError::UnknownTokenId`] for ids outside both
/// tables. `decode_bytes(encode(text))` restores `text` exactly.
///
/// # Concurrency
///
/// Nothing is mutated after construction, so a `Tokenizer` can be shared by
/// reference (or behind an `Arc`) across any number of threads. The batch
/// methods run independent calls on the rayon pool.
///
/// # Example
///
/// ```
/// use rankbpe::Tokenizer;
///
/// let tokenizer = Tokenizer::build([("a", 0), ("b", 1), ("ab", 2)], [("<end>", 3)]).unwrap();
/// assert_eq!(tokenizer.encode("ab<end>ab"), vec![2, 3, 2]);
/// assert_eq!(tokenizer.decode(&[2, 3]).unwrap(), "ab<end>");
/// ```
#[derive(Clone)]
pub struct Tokenizer {
    ranks: RankTable,
    specials: SpecialTokenTable,
    pre_tokenizer: PreTokenizer,
    merge_strategy: MergeStrategy,
}

impl Tokenizer {
    /// Build a tokenizer with the default rule-based pre-tokenizer.
    ///
    /// # Arguments
    /// * `vocabulary` - Mergeable byte fragments and their ranks (`0..n`)
    /// * `specials` - Special token literals and their ids (`>= n`)
    pub fn build<V, K, S, T>(vocabulary: V, specials: S) -> Result<Self, TokenizerError>
    where
        V: IntoIterator<Item = (K, u32)>,
        K: Into<Vec<u8>>,
        S: IntoIterator<Item = (T, u32)>,
        T: Into<String>,
    {
        Self::with_pre_tokenizer(vocabulary, specials, PreTokenizer::default())
    }

    /// Build a tokenizer that splits with a custom rule set.
    pub fn with_rules<V, K, S, T>(
        vocabulary: V,
        specials: S,
        rules: SplitRules,
    ) -> Result<Self, TokenizerError>
    where
        V: IntoIterator<Item = (K, u32)>,
        K: Into<Vec<u8>>,
        S: IntoIterator<Item = (T, u32)>,
        T: Into<String>,
    {
        Self::with_pre_tokenizer(vocabulary, specials, PreTokenizer::from_rules(rules))
    }

    /// Build a tokenizer that splits with a regex pattern such as
    /// [`CL100K_BASE_PATTERN`].
    ///
    /// Uses fancy-regex as the default regex backend.
    pub fn with_pattern<V, K, S, T>(
        vocabulary: V,
        specials: S,
        pattern: &str,
    ) -> Result<Self, TokenizerError>
    where
        V: IntoIterator<Item = (K, u32)>,
        K: Into<Vec<u8>>,
        S: IntoIterator<Item = (T, u32)>,
        T: Into<String>,
    {
        Self::with_pre_tokenizer(vocabulary, specials, PreTokenizer::from_pattern(pattern)?)
    }

    /// Build a tokenizer from a vocabulary and a ready pre-tokenizer.
    pub fn with_pre_tokenizer<V, K, S, T>(
        vocabulary: V,
        specials: S,
        pre_tokenizer: PreTokenizer,
    ) -> Result<Self, TokenizerError>
    where
        V: IntoIterator<Item = (K, u32)>,
        K: Into<Vec<u8>>,
        S: IntoIterator<Item = (T, u32)>,
        T: Into<String>,
    {
        let ranks = RankTable::new(vocabulary)?;
        let specials = SpecialTokenTable::new(specials, ranks.len())?;

        debug!(
            "built tokenizer: {} base tokens, {} special tokens, {} pre-tokenizer",
            ranks.len(),
            specials.len(),
            pre_tokenizer.backend_name()
        );
        if !ranks.is_byte_complete() {
            debug!("vocabulary does not rank all 256 bytes; some inputs cannot be fully encoded");
        }

        Ok(Self {
            ranks,
            specials,
            pre_tokenizer,
            merge_strategy: MergeStrategy::default(),
        })
    }

    /// Select how the merge engine picks the next pair.
    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Switch a pattern tokenizer to the PCRE2 regex backend.
    ///
    /// # Example
    /// ```ignore
    /// let tokenizer = Tokenizer::with_pattern(vocab, specials, CL100K_BASE_PATTERN)?.pcre2(true)?;
    /// ```
    ///
    /// # Errors
    /// Returns an error if the `pcre2` feature is not enabled, if the
    /// tokenizer splits by rules rather than a pattern, or if regex
    /// compilation fails.
    pub fn pcre2(mut self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        self.pre_tokenizer = self.pre_tokenizer.with_pcre2(use_pcre2)?;
        debug!("pre-tokenizer backend: {}", self.pre_tokenizer.backend_name());
        Ok(self)
    }

    /// Enable or disable JIT compilation for the PCRE2 backend.
    pub fn jit(mut self, use_jit: bool) -> Result<Self, TokenizerError> {
        self.pre_tokenizer = self.pre_tokenizer.with_jit(use_jit)?;
        Ok(self)
    }

    fn encode_into<S: Sink>(
        &self,
        text: &str,
        allow_special: bool,
        sink: &mut S,
    ) -> Result<(), S::Error> {
        let mut last_end = 0;
        if allow_special {
            for m in self.specials.find_iter(text) {
                self.encode_plain_into(text, last_end..m.start, sink)?;
                sink.push(m.id, m.start..m.end, &text.as_bytes()[m.start..m.end], true);
                last_end = m.end;
            }
        }
        self.encode_plain_into(text, last_end..text.len(), sink)
    }

    /// Pre-tokenize and merge `text[span]`, which holds no special tokens.
    fn encode_plain_into<S: Sink>(
        &self,
        text: &str,
        span: Range<usize>,
        sink: &mut S,
    ) -> Result<(), S::Error> {
        let base = span.start;
        for chunk in self.pre_tokenizer.split(&text[span]) {
            let piece = chunk.text.as_bytes();
            let start = base + chunk.offset;
            for range in byte_pair_merge(piece, &self.ranks, self.merge_strategy) {
                let token = &piece[range.clone()];
                let abs = start + range.start..start + range.end;
                match self.ranks.rank(token) {
                    Some(rank) => sink.push(rank, abs, token, false),
                    None => sink.missing(token[0], abs.start)?,
                }
            }
        }
        Ok(())
    }

    /// Encode text to token IDs, recognising special tokens.
    ///
    /// Never fails. With a vocabulary that does not rank every byte, input
    /// bytes outside its alphabet are dropped with a warning; use
    /// [`try_encode`](Self::try_encode) to reject them instead.
    ///
    /// `decode(&encode(text))` returns `text` only when
    /// [`is_byte_complete`](Self::is_byte_complete) is true. On a partial
    /// alphabet the dropped bytes are gone: with fragments `{"a", "b", "ab"}`,
    /// `"abc"` encodes to the single `"ab"` token.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();
        self.encode_into(text, true, &mut ids)
            .unwrap_or_else(|never| match never {});
        ids
    }

    /// Encode text to token IDs, treating special token literals as plain text.
    pub fn encode_ordinary(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();
        self.encode_into(text, false, &mut ids)
            .unwrap_or_else(|never| match never {});
        ids
    }

    /// Like [`encode`](Self::encode), but fails with
    /// [`TokenizerError::UnencodableByte`] instead of dropping bytes the
    /// vocabulary cannot represent.
    pub fn try_encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let mut sink = Strict(Vec::new());
        self.encode_into(text, true, &mut sink)?;
        Ok(sink.0)
    }

    /// Encode text and keep per-token bytes, byte offsets and a special-token
    /// mask.
    pub fn encode_with_details(&self, text: &str) -> Encoding {
        let mut encoding = Encoding::default();
        self.encode_into(text, true, &mut encoding)
            .unwrap_or_else(|never| match never {});
        encoding
    }

    /// Bytes of a single token.
    #[inline]
    pub fn token_bytes(&self, id: u32) -> Result<&[u8], TokenizerError> {
        self.specials
            .literal(id)
            .map(str::as_bytes)
            .or_else(|| self.ranks.fragment(id))
            .ok_or(TokenizerError::UnknownTokenId(id))
    }

    /// Decode token IDs back to bytes.
    ///
    /// The bytes are returned as-is even when they are not valid UTF-8, for
    /// example when a multi-byte character is split across a truncated
    /// sequence.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);
        for &token in tokens {
            result.extend_from_slice(self.token_bytes(token)?);
        }
        Ok(result)
    }

    /// Decode token IDs back to bytes, leaving out special tokens.
    pub fn decode_bytes_skip_special(&self, tokens: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);
        for &token in tokens {
            if self.specials.contains_id(token) {
                continue;
            }
            result.extend_from_slice(self.token_bytes(token)?);
        }
        Ok(result)
    }

    /// Decode token IDs to a string.
    ///
    /// On invalid UTF-8 the error still owns the decoded bytes
    /// (`FromUtf8Error::into_bytes`).
    pub fn decode(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        Ok(String::from_utf8(self.decode_bytes(tokens)?)?)
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode(text.as_ref())).collect()
    }

    /// Batch encode multiple texts in parallel, treating special token
    /// literals as plain text.
    pub fn encode_batch_ordinary<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Vec<u32>> {
        texts
            .par_iter()
            .map(|text| self.encode_ordinary(text.as_ref()))
            .collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Get the vocabulary size.
    ///
    /// Special ids directly follow the base ranks, so this is both the
    /// number of tokens and max_token_id + 1.
    pub fn vocab_size(&self) -> usize {
        self.ranks.len() + self.specials.len()
    }

    /// Number of base (mergeable) tokens.
    pub fn num_base_tokens(&self) -> usize {
        self.ranks.len()
    }

    pub fn num_special_tokens(&self) -> usize {
        self.specials.len()
    }

    pub fn is_special(&self, id: u32) -> bool {
        self.specials.contains_id(id)
    }

    /// Whether every possible input can be encoded without dropping bytes.
    pub fn is_byte_complete(&self) -> bool {
        self.ranks.is_byte_complete()
    }

    pub fn rank_table(&self) -> &RankTable {
        &self.ranks
    }

    /// Get the special tokens map (literal -> id).
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        self.specials.tokens()
    }

    pub fn special_token_table(&self) -> &SpecialTokenTable {
        &self.specials
    }

    pub fn pre_tokenizer(&self) -> &PreTokenizer {
        &self.pre_tokenizer
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("num_base_tokens", &self.ranks.len())
            .field("num_special_tokens", &self.specials.len())
            .field("pre_tokenizer", &self.pre_tokenizer.backend_name())
            .field("merge_strategy", &self.merge_strategy)
            .finish()
    }
}
