//! Core tokenization engine for rankbpe.
//!
//! # Architecture
//!
//! - [`RankTable`]: mergeable byte fragments and their ranks, with the dense
//!   rank -> fragment inverse
//! - [`SpecialTokenTable`]: special token literals, their reserved ids and an
//!   Aho-Corasick matcher for leftmost-longest literal search
//! - [`PreTokenizer`]: splits plain text into chunks, either with the
//!   built-in [`SplitRules`] state machine or a regex pattern
//! - [`bpe`]: the merge engine (lowest rank first, leftmost on ties)
//! - [`Tokenizer`]: encode/decode orchestration and the public API
//!
//! Everything is immutable after construction, so one [`Tokenizer`] serves
//! any number of concurrent callers without locks.

pub mod bpe;
mod encoding;
mod pretokenizer;
mod special;
mod tokenizer;
mod vocab;

pub use bpe::{byte_pair_encode, byte_pair_merge, byte_pair_split, MergeStrategy};
pub use encoding::{Encoding, TruncationDirection};
pub use pretokenizer::{
    Chunk, Chunks, PatternChunks, PreTokenizer, RuleChunks, SplitRule, SplitRules,
};
pub use special::{SpecialMatch, SpecialMatches, SpecialTokenTable};
pub use tokenizer::{
    Tokenizer, TokenizerError, CL100K_BASE_PATTERN, LLAMA3_PATTERN, O200K_BASE_PATTERN,
};
pub use vocab::{build_decoder, RankTable, VocabError};
