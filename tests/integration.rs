//! End-to-end scenarios against the public `Engine` API only.

use biscuit_index::{ArrayBitmap, Engine, IndexConfig, Mode, Predicate};

fn single_column_engine(values: &[&str]) -> Engine<u32, ArrayBitmap> {
    let mut engine = Engine::new(IndexConfig::new(vec!["col".to_string()]));
    for (i, v) in values.iter().enumerate() {
        engine.insert(i as u32, vec![v.to_string()]).unwrap();
    }
    engine
}

fn like(engine: &Engine<u32, ArrayBitmap>, pattern: &str) -> Vec<u32> {
    let pred = Predicate::new(0, pattern, Mode::Like).unwrap();
    let mut ids = engine.query(&[pred]).unwrap();
    ids.sort_unstable();
    ids
}

/// S1: prefix, suffix, and underscore queries over apple/apply/grape/grail.
#[test]
fn s1_prefix_suffix_underscore() {
    let engine = single_column_engine(&["apple", "apply", "grape", "grail"]);
    assert_eq!(like(&engine, "app%"), vec![0, 1]);
    assert_eq!(like(&engine, "%ple"), vec![0]);
    assert_eq!(like(&engine, "g_a%"), vec![2, 3]);
}

/// S2: ILIKE is case-insensitive, LIKE is not.
#[test]
fn s2_ilike_case_insensitivity() {
    let engine = single_column_engine(&["Abc", "abc", "ABC", "abd"]);

    let pred = Predicate::new(0, "abc", Mode::ILike).unwrap();
    let mut ids = engine.query(&[pred]).unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2]);

    assert_eq!(like(&engine, "abc"), vec![1]);
}

/// S3: bulk delete half of 10 000 records, then delete past the compaction
/// threshold; cardinality must stay correct throughout. Uses a
/// higher-than-default threshold so the first wave (5 000 deletes) does not
/// itself trigger compaction, matching the scenario's narrative.
#[test]
fn s3_bulk_delete_and_compaction_cardinality() {
    let mut config = IndexConfig::new(vec!["col".to_string()]);
    config.compaction_threshold = 6_000;
    let mut engine: Engine<u32, ArrayBitmap> = Engine::new(config);
    for i in 0..10_000u32 {
        engine.insert(i, vec!["row".to_string()]).unwrap();
    }

    engine.bulk_delete(|r| *r < 5_000);
    assert_eq!(like(&engine, "%").len(), 5_000);
    assert_eq!(engine.stats().tombstone_count, 5_000);

    // Another 1 000 deletes pushes the cumulative tombstone count to 6 000,
    // crossing the configured threshold; compaction fires automatically.
    engine.bulk_delete(|r| (5_000..6_000).contains(r));
    assert_eq!(like(&engine, "%").len(), 4_000);
    assert_eq!(engine.stats().tombstone_count, 0, "compaction should have fired and reset tombstones");
}

/// S4: a two-column index; the planner must run the exact `city` predicate
/// before the prefix `name` predicate, but the *result* is order-independent.
#[test]
fn s4_multicolumn_planner_ordering() {
    let mut engine: Engine<u32, ArrayBitmap> =
        Engine::new(IndexConfig::new(vec!["name".to_string(), "city".to_string()]));
    engine.insert(0, vec!["Alice".into(), "NYC".into()]).unwrap();
    engine.insert(1, vec!["Alicia".into(), "NYC".into()]).unwrap();
    engine.insert(2, vec!["Alice".into(), "LA".into()]).unwrap();

    let preds = vec![
        Predicate::new(0, "Alic%", Mode::Like).unwrap(),
        Predicate::new(1, "NYC", Mode::Like).unwrap(),
    ];
    let order = biscuit_index::planner::plan(&preds);
    assert_eq!(order[0].predicate.column_index, 1, "exact city predicate must run first");

    let mut ids = engine.query(&preds).unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);
}

/// S5: multi-byte character handling for "café".
#[test]
fn s5_multibyte_cafe() {
    let engine = single_column_engine(&["café"]);
    assert_eq!(like(&engine, "%é%"), vec![0]);
    assert_eq!(like(&engine, "_af_"), vec![0]);
    assert_eq!(like(&engine, "____"), vec![0]);
    assert_eq!(like(&engine, "_____"), Vec::<u32>::new());
}

/// S6: the recursive windowed placement matcher over "AxBxCxD".
#[test]
fn s6_recursive_windowed_placement() {
    let engine = single_column_engine(&["AxBxCxD"]);
    assert_eq!(like(&engine, "A%B%C%D"), vec![0]);
    assert_eq!(like(&engine, "A%D%B"), Vec::<u32>::new());
}

#[test]
fn not_like_is_the_complement_of_live_minus_match() {
    let engine = single_column_engine(&["apple", "grape"]);
    let pred = Predicate::new(0, "app%", Mode::NotLike).unwrap();
    assert_eq!(engine.query(&[pred]).unwrap(), vec![1]);
}

#[test]
fn update_on_reinsert_same_external_ref() {
    let mut engine: Engine<u32, ArrayBitmap> = Engine::new(IndexConfig::new(vec!["col".to_string()]));
    let id_a = engine.insert(7, vec!["alpha".to_string()]).unwrap();
    let id_b = engine.insert(7, vec!["beta".to_string()]).unwrap();
    assert_eq!(id_a, id_b);

    assert!(like(&engine, "alpha").is_empty());
    assert_eq!(like(&engine, "beta"), vec![id_a]);
}

#[test]
fn resolve_maps_record_ids_back_to_external_refs() {
    let engine = single_column_engine(&["apple", "apply"]);
    let ids = like(&engine, "app%");
    let mut refs = engine.resolve(&ids);
    refs.sort_unstable();
    assert_eq!(refs, vec![0, 1]);
}

#[test]
fn empty_pattern_matches_only_empty_strings() {
    let engine = single_column_engine(&["", "a", ""]);
    assert_eq!(like(&engine, ""), vec![0, 2]);
}

#[test]
fn invalid_column_index_is_an_error() {
    let engine = single_column_engine(&["a"]);
    let pred = Predicate::new(5, "a", Mode::Like).unwrap();
    assert!(engine.query(&[pred]).is_err());
}
