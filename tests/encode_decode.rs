//! Integration tests for the encode/decode contract.
//!
//! These tests verify that encoding followed by decoding restores the input
//! exactly, that unknown ids are rejected, and that small hand-built
//! vocabularies merge the way their ranks dictate.

use rankbpe::{Tokenizer, TokenizerError, TruncationDirection};

/// Merges learned on English text, lowest rank first.
const MERGES: &[&str] = &[
    "th", "he", "in", "er", "an", " t", "the", " the", "on", "ing", "re", " a", "or", "en", "ll",
    " w", "ou", "at", " s", "is", " b", " f", " o", "ed", "es", "it", " is", " of", " and", "!!",
    "12", "123", "\n\n",
];

/// First special id: directly after the 256 bytes and [`MERGES`].
const ENDOFTEXT: u32 = 256 + MERGES.len() as u32;
const IM_START: u32 = ENDOFTEXT + 1;

/// All 256 bytes at ranks 0..256, then [`MERGES`] from 256 upward.
fn create_tokenizer() -> Tokenizer {
    let bytes = (0u8..=255).map(|b| (vec![b], b as u32));
    let merges = MERGES
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_bytes().to_vec(), 256 + i as u32));
    Tokenizer::build(
        bytes.chain(merges),
        [("<|endoftext|>", ENDOFTEXT), ("<|im_start|>", IM_START)],
    )
    .unwrap()
}

/// Test basic encoding and decoding roundtrip.
#[test]
fn test_encode_decode_roundtrip() {
    let tokenizer = create_tokenizer();

    let test_cases = vec![
        "Hello, world!",
        "The quick brown fox jumps over the lazy dog.",
        "Rust is a systems programming language.",
        "1234567890",
        "Special characters: !@#$%^&*()",
        "Multi-line\ntext\nwith\nnewlines",
        "Unicode: こんにちは 世界 🦀",
        "  leading and trailing  ",
        "tabs\tand\r\nCRLF",
        "naïve café déjà vu",
    ];

    for text in test_cases {
        let tokens = tokenizer.encode(text);
        let decoded = tokenizer.decode(&tokens).unwrap();
        assert_eq!(decoded, text, "Roundtrip failed for: {:?}", text);
    }
}

/// `{"a":0,"b":1,"ab":2}` encodes "ab" as the single merged token.
#[test]
fn test_minimal_vocabulary_scenario() {
    let tokenizer =
        Tokenizer::build([("a", 0), ("b", 1), ("ab", 2)], Vec::<(String, u32)>::new()).unwrap();
    assert_eq!(tokenizer.encode("ab"), vec![2]);
    assert_eq!(tokenizer.decode(&[2]).unwrap(), "ab");
}

#[test]
fn test_special_token_scenario() {
    let tokenizer = Tokenizer::build([("a", 0), ("b", 1), ("ab", 2)], [("<end>", 3)]).unwrap();
    assert_eq!(tokenizer.encode("ab<end>ab"), vec![2, 3, 2]);
}

/// A special id that leaves a gap after the base ranks is rejected.
#[test]
fn test_special_id_gap_scenario() {
    let result = Tokenizer::build([("a", 0), ("b", 1), ("ab", 2)], [("<end>", 10)]);
    assert!(matches!(
        result,
        Err(TokenizerError::ConflictingSpecialToken { id: 10, .. })
    ));
}

/// On a partial alphabet bytes outside it are dropped, so the round trip
/// does not hold.
#[test]
fn test_partial_alphabet_is_not_a_round_trip() {
    let tokenizer =
        Tokenizer::build([("a", 0), ("b", 1), ("ab", 2)], Vec::<(String, u32)>::new()).unwrap();
    assert!(!tokenizer.is_byte_complete());
    let ids = tokenizer.encode("abc");
    assert_eq!(ids, vec![2]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "ab");
}

#[test]
fn test_empty_input() {
    let tokenizer = create_tokenizer();
    assert_eq!(tokenizer.encode(""), Vec::<u32>::new());
    assert_eq!(tokenizer.decode(&[]).unwrap(), "");
    assert!(tokenizer.decode_bytes(&[]).unwrap().is_empty());
}

/// Merges pick the lowest rank, not the leftmost pair.
#[test]
fn test_merge_order() {
    let tokenizer = create_tokenizer();
    let th = 256;
    let the = 256 + MERGES.iter().position(|m| *m == "the").unwrap() as u32;
    let space_the = 256 + MERGES.iter().position(|m| *m == " the").unwrap() as u32;

    assert_eq!(tokenizer.encode("th"), vec![th]);
    assert_eq!(tokenizer.encode("the"), vec![the]);
    assert_eq!(tokenizer.encode("a the"), vec![b'a' as u32, space_the]);
}

/// Every single byte is encodable on a byte-complete vocabulary.
#[test]
fn test_every_byte_encodable() {
    let tokenizer = create_tokenizer();
    assert!(tokenizer.is_byte_complete());

    for b in 0u8..=255 {
        let ids = rankbpe::byte_pair_encode(&[b], tokenizer.rank_table());
        assert_eq!(ids, vec![b as u32]);
    }
    for b in 0u8..128 {
        let text = (b as char).to_string();
        let ids = tokenizer.try_encode(&text).unwrap();
        assert_eq!(tokenizer.decode_bytes(&ids).unwrap(), vec![b]);
    }
}

#[test]
fn test_unknown_id_rejected() {
    let tokenizer = create_tokenizer();
    let unknown = tokenizer.vocab_size() as u32;
    assert_eq!(unknown, IM_START + 1);
    assert!(tokenizer.decode(&[ENDOFTEXT, IM_START]).is_ok());
    assert!(matches!(
        tokenizer.decode(&[unknown]),
        Err(TokenizerError::UnknownTokenId(id)) if id == unknown
    ));
    assert!(matches!(
        tokenizer.decode(&[u32::MAX]),
        Err(TokenizerError::UnknownTokenId(u32::MAX))
    ));
}

/// A multi-byte character split across a truncation decodes to raw bytes.
#[test]
fn test_truncated_utf8_is_not_lossy() {
    let tokenizer = create_tokenizer();
    let ids = tokenizer.encode("🦀");
    assert_eq!(ids.len(), 4);

    let bytes = tokenizer.decode_bytes(&ids[..2]).unwrap();
    assert_eq!(bytes, "🦀".as_bytes()[..2].to_vec());
    match tokenizer.decode(&ids[..2]) {
        Err(TokenizerError::InvalidUtf8(err)) => assert_eq!(err.into_bytes(), bytes),
        other => panic!("expected InvalidUtf8, got {:?}", other),
    }
}

#[test]
fn test_offsets_cover_input() {
    let tokenizer = create_tokenizer();
    let text = "the cat<|endoftext|>is 123 here\n\n";
    let enc = tokenizer.encode_with_details(text);

    assert_eq!(enc.span(), Some((0, text.len())));
    for pair in enc.offsets.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
    for (i, &(start, end)) in enc.offsets.iter().enumerate() {
        let id = enc.ids[i];
        assert_eq!(tokenizer.token_bytes(id).unwrap(), &text.as_bytes()[start..end]);
        assert_eq!(enc.tokens[i], &text.as_bytes()[start..end]);
        assert_eq!(enc.special_tokens_mask[i], tokenizer.is_special(id));
    }
}

#[test]
fn test_truncation() {
    let tokenizer = create_tokenizer();
    let text = "the cat sat on the mat";
    let full = tokenizer.encode_with_details(text);

    let mut right = full.clone();
    right.truncate(3, TruncationDirection::Right);
    assert_eq!(right.ids, full.ids[..3].to_vec());

    let mut left = full.clone();
    left.truncate(3, TruncationDirection::Left);
    assert_eq!(left.ids, full.ids[full.len() - 3..].to_vec());
    assert_eq!(left.span().map(|(_, end)| end), Some(text.len()));
}
