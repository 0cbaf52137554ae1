//! Randomized CRUD stress test against a naive reference `LIKE` matcher
//! (design doc §8 invariant 5: "for any pattern P and text set S,
//! engine_match(P) equals the SQL-LIKE semantics of P applied to every
//! element of S"). Same seeded-`SmallRng` harness shape as the storage
//! core's own `*_test.rs` stress tests.

use std::collections::HashMap;

use biscuit_index::{ArrayBitmap, Engine, IndexConfig, Mode, Predicate};
use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

const ALPHABET: &[char] = &['a', 'b', 'c', 'x', 'y'];

fn random_text(rng: &mut SmallRng, max_len: usize) -> String {
    let len = rng.gen_range(0..=max_len);
    (0..len).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())]).collect()
}

fn random_pattern(rng: &mut SmallRng, max_len: usize) -> String {
    let len = rng.gen_range(0..=max_len);
    (0..len)
        .map(|_| match rng.gen_range(0..7) {
            0 => '%',
            1 => '_',
            _ => ALPHABET[rng.gen_range(0..ALPHABET.len())],
        })
        .collect()
}

/// Reference `LIKE` matcher: `%` matches zero or more characters, `_`
/// matches exactly one, anything else matches itself literally.
fn naive_like(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&'%', rest)) => naive_like(text, rest) || (!text.is_empty() && naive_like(&text[1..], rest)),
        Some((&'_', rest)) => !text.is_empty() && naive_like(&text[1..], rest),
        Some((c, rest)) => !text.is_empty() && text[0] == *c && naive_like(&text[1..], rest),
    }
}

#[test]
fn test_randomized_crud_matches_naive_like_oracle() {
    let seed: u128 = random();
    let seed: u128 = 219588344112837462957013885467102487331;
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());
    println!("seed: {seed}");

    let mut engine: Engine<u32, ArrayBitmap> = Engine::new(IndexConfig::new(vec!["col".to_string()]));
    let mut reference: HashMap<u32, String> = HashMap::new();
    let mut next_ref = 0u32;

    let n_ops = 300;
    for _ in 0..n_ops {
        match rng.gen_range(0..3) {
            0 | 1 => {
                let text = random_text(&mut rng, 6);
                let ext_ref = next_ref;
                next_ref += 1;
                engine.insert(ext_ref, vec![text.clone()]).unwrap();
                reference.insert(ext_ref, text);
            }
            _ => {
                if !reference.is_empty() {
                    let victim = *reference.keys().nth(rng.gen_range(0..reference.len())).unwrap();
                    engine.bulk_delete(|r| *r == victim);
                    reference.remove(&victim);
                }
            }
        }

        if rng.gen_ratio(1, 10) {
            engine.compact();
        }

        let pattern = random_pattern(&mut rng, 6);
        let pred = Predicate::new(0, &pattern, Mode::Like).unwrap();
        let mut engine_hits: Vec<u32> = engine.resolve(&engine.query(&[pred]).unwrap());
        engine_hits.sort_unstable();

        let pattern_chars: Vec<char> = pattern.chars().collect();
        let mut expected: Vec<u32> = reference
            .iter()
            .filter(|(_, text)| naive_like(&text.chars().collect::<Vec<char>>(), &pattern_chars))
            .map(|(&ext_ref, _)| ext_ref)
            .collect();
        expected.sort_unstable();

        assert_eq!(engine_hits, expected, "pattern {pattern:?} seed {seed}");
    }
}
