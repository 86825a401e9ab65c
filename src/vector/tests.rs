use super::*;

fn meta(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
        .collect()
}

#[test]
fn explicit_ids_are_deterministic() {
    let texts = vec!["x".to_string(), "y".to_string()];
    let ids = vec!["a".to_string(), "b".to_string()];

    let first = derive_ids(&texts, &[Map::new(), Map::new()], Some(&ids));
    let second = derive_ids(&texts, &[Map::new(), Map::new()], Some(&ids));

    assert_eq!(first, second);
    assert_ne!(first[0], first[1]);
    assert_eq!(first[0], hash_id("a"));
    assert_eq!(first[1], hash_id("b"));
}

#[test]
fn metadata_ids_are_deterministic() {
    let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
    let metadatas = vec![meta(&[("id", "a")]), meta(&[("id", "b")]), meta(&[("id", "c")])];

    let first = derive_ids(&texts, &metadatas, None);
    let second = derive_ids(&texts, &metadatas, None);

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(
        first.iter().collect::<std::collections::HashSet<_>>().len(),
        3
    );
    assert_eq!(first[0], hash_id("a"));
}

#[test]
fn missing_metadata_ids_fall_back_to_random() {
    let texts = vec!["same text".to_string()];
    // One record has an id, the other does not: the metadata path requires all.
    let texts2 = vec!["same text".to_string(), "other".to_string()];
    let partial = vec![meta(&[("id", "a")]), Map::new()];

    let first = derive_ids(&texts, &[Map::new()], None);
    let second = derive_ids(&texts, &[Map::new()], None);
    assert_ne!(first, second);

    let partial_first = derive_ids(&texts2, &partial, None);
    let partial_second = derive_ids(&texts2, &partial, None);
    assert_ne!(partial_first, partial_second);
}

#[test]
fn non_string_metadata_ids_hash_their_json_form() {
    let texts = vec!["t".to_string()];
    let mut m = Map::new();
    m.insert("id".to_string(), Value::from(42));

    let ids = derive_ids(&texts, &[m], None);
    assert_eq!(ids[0], hash_id("42"));
}

#[test]
fn hash_id_uses_full_sixteen_bytes() {
    let id = hash_id("a");
    assert_eq!(id.len(), ID_WIDTH);
    // SHA-256("a") begins ca978112ca1bbdca; the id carries raw digest bytes,
    // not hex characters.
    assert_eq!(id[0], 0xca);
    assert_eq!(id[1], 0x97);
    assert_eq!(id[15], 0x4d);
}

#[test]
fn search_sql_orders_by_strategy_operator() {
    let sql = search_sql("docs", DistanceStrategy::Cosine, 4, false);
    assert_eq!(
        sql,
        "SELECT \"text\", \"metadata\", \"embedding\" <=> $1 AS distance FROM \"docs\" ORDER BY distance LIMIT 4"
    );

    let sql = search_sql("docs", DistanceStrategy::DotProduct, 10, true);
    assert!(sql.contains("<#> $1"));
    assert!(sql.contains("WHERE \"metadata\" @> $2"));
    assert!(sql.ends_with("LIMIT 10"));
}

#[test]
fn quoting_doubles_embedded_quotes() {
    assert_eq!(quote_ident("docs"), "\"docs\"");
    assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
}

#[test]
fn empty_batch_outcome_is_complete() {
    let outcome = BatchInsertOutcome::default();
    assert!(outcome.is_complete());
    assert!(outcome.ids.is_empty());
    assert_eq!(outcome.total_rows(), 0);
}

#[test]
fn outcome_totals_count_successes_and_failures() {
    // After a row-by-row replay, `ids` holds only the rows that stuck;
    // the attempted total is successes plus failures.
    let outcome = BatchInsertOutcome {
        ids: vec![hash_id("kept")],
        failures: vec![
            RowFailure {
                index: 1,
                id: hash_id("lost-1"),
                message: "value too long".to_string(),
            },
            RowFailure {
                index: 2,
                id: hash_id("lost-2"),
                message: "value too long".to_string(),
            },
        ],
    };

    assert_eq!(outcome.total_rows(), 3);
    assert_eq!(outcome.ids.len(), 1);
    assert!(!outcome.is_complete());
}

#[test]
fn blank_texts_are_detected_before_storage() {
    let texts = vec![
        "real content".to_string(),
        "   ".to_string(),
        "more".to_string(),
    ];
    assert_eq!(blank_text_index(&texts), Some(1));

    let texts = vec!["a".to_string(), String::new()];
    assert_eq!(blank_text_index(&texts), Some(1));

    let texts = vec!["a".to_string(), "b".to_string()];
    assert_eq!(blank_text_index(&texts), None);
}
