//! Integration tests for sharing one tokenizer across threads.

use std::sync::Arc;
use std::thread;

use rankbpe::Tokenizer;

fn create_tokenizer() -> Tokenizer {
    let bytes = (0u8..=255).map(|b| (vec![b], b as u32));
    let merges = ["th", "he", "the", " the", "in", "ing", " a", "an", "nd", " and"]
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_bytes().to_vec(), 256 + i as u32));
    Tokenizer::build(bytes.chain(merges), [("<|endoftext|>", 266)]).unwrap()
}

fn texts() -> Vec<String> {
    (0..64)
        .map(|i| format!("the thing {i} and another thing<|endoftext|>line {i} ending"))
        .collect()
}

#[test]
fn test_shared_across_threads() {
    let tokenizer = Arc::new(create_tokenizer());
    let texts = texts();
    let expected: Vec<Vec<u32>> = texts.iter().map(|t| tokenizer.encode(t)).collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokenizer = Arc::clone(&tokenizer);
            let texts = texts.clone();
            thread::spawn(move || {
                texts
                    .iter()
                    .map(|t| tokenizer.encode(t))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_scoped_threads_decode() {
    let tokenizer = create_tokenizer();
    let texts = texts();
    let encoded: Vec<Vec<u32>> = texts.iter().map(|t| tokenizer.encode(t)).collect();

    thread::scope(|s| {
        for (text, ids) in texts.iter().zip(&encoded) {
            let tokenizer = &tokenizer;
            s.spawn(move || {
                assert_eq!(&tokenizer.decode(ids).unwrap(), text);
            });
        }
    });
}

#[test]
fn test_batch_matches_individual_calls() {
    let tokenizer = create_tokenizer();
    let texts = texts();

    let batch = tokenizer.encode_batch(&texts);
    let single: Vec<Vec<u32>> = texts.iter().map(|t| tokenizer.encode(t)).collect();
    assert_eq!(batch, single);

    let ordinary = tokenizer.encode_batch_ordinary(&texts);
    let single: Vec<Vec<u32>> = texts.iter().map(|t| tokenizer.encode_ordinary(t)).collect();
    assert_eq!(ordinary, single);

    assert_eq!(tokenizer.decode_batch(&batch).unwrap(), texts);
}

#[test]
fn test_batch_decode_reports_unknown_id() {
    let tokenizer = create_tokenizer();
    let lists = vec![tokenizer.encode("the end"), vec![9999]];
    assert!(tokenizer.decode_batch(&lists).is_err());
}
