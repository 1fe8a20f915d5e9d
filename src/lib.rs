//! rankbpe - rank-based byte-pair-encoding tokenizer engine
//!
//! Converts UTF-8 text into token ids and back using a fixed vocabulary of
//! ranked byte fragments plus a set of literal special tokens:
//!
//! - Special tokens matched leftmost-longest with Aho-Corasick
//! - Rule-based pre-tokenizer (GPT-4 chunk classes) or regex patterns via
//!   fancy-regex, with optional PCRE2 + JIT
//! - Linked-list BPE merge engine with scan and heap strategies
//! - Rayon parallelism for batch encoding
//! - FxHashMap for fast lookups
//!
//! ```
//! use rankbpe::Tokenizer;
//!
//! let tokenizer = Tokenizer::build([("a", 0), ("b", 1), ("ab", 2)], [("<end>", 3)]).unwrap();
//! let ids = tokenizer.encode("ab<end>ab");
//! assert_eq!(ids, vec![2, 3, 2]);
//! assert_eq!(tokenizer.decode(&ids).unwrap(), "ab<end>ab");
//! ```

pub mod core;

pub use crate::core::{
    byte_pair_encode, byte_pair_merge, byte_pair_split, Chunk, Encoding, MergeStrategy,
    PreTokenizer, RankTable, SpecialTokenTable, SplitRule, SplitRules, Tokenizer,
    TokenizerError, TruncationDirection, VocabError, CL100K_BASE_PATTERN, LLAMA3_PATTERN,
    O200K_BASE_PATTERN,
};
