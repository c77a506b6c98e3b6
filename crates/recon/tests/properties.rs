// Property-based tests for conversion, comparison and the merge driver.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::BTreeSet;

use proptest::prelude::*;
use reconcile_core::config::BreakExcludeConfig;
use reconcile_core::sort::SortedGroups;
use reconcile_core::{
    BreakKind, Comparison, ComparisonConfig, DataComparator, Reconciler, RecordSource, Side,
    StringTypeConverter, TypeConverter, Value,
};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn config_64() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Loosely typed cell: numbers, booleans, dates, text, blanks.
fn arb_raw() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"-?[0-9]{1,12}",
        3 => r"-?[0-9]{1,6}\.[0-9]{1,6}",
        1 => r"(true|false|TRUE|False)",
        1 => r"20[0-9]{2}-0[1-9]-[12][0-9]",
        2 => r" ?[a-zA-Z ]{0,12} ?",
        1 => Just("".to_string()),
    ]
}

fn arb_number() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Integer),
        any::<i64>().prop_map(Value::Long),
        (-1.0e9..1.0e9f64).prop_map(Value::Double),
    ]
}

/// Small value domain so matched keys often differ.
fn arb_cell() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("0"), Just("1"), Just("2"), Just("")]
}

type Row = Vec<(&'static str, String)>;

fn row(key: u32, a: &str, b: &str) -> Row {
    vec![("Key", key.to_string()), ("A", a.to_string()), ("B", b.to_string())]
}

/// Unique keys split into left-only, right-only and shared, with values.
fn arb_dataset() -> impl Strategy<Value = (Vec<Row>, Vec<Row>)> {
    proptest::collection::btree_set(0u32..500, 0..40).prop_flat_map(|keys| {
        let n = keys.len();
        let keys: Vec<u32> = keys.into_iter().collect();
        let placement = proptest::collection::vec(0u8..3, n);
        let cells = proptest::collection::vec((arb_cell(), arb_cell(), arb_cell(), arb_cell()), n);
        (Just(keys), placement, cells).prop_map(|(keys, placement, cells)| {
            let mut left = Vec::new();
            let mut right = Vec::new();
            for ((key, side), (la, lb, ra, rb)) in keys.iter().zip(placement).zip(cells) {
                match side {
                    0 => left.push(row(*key, la, lb)),
                    1 => right.push(row(*key, ra, rb)),
                    _ => {
                        left.push(row(*key, la, lb));
                        right.push(row(*key, ra, rb));
                    }
                }
            }
            // Reverse one side so both orders reach the sort
            right.reverse();
            (left, right)
        })
    })
}

fn run(config: ComparisonConfig, left: &[Row], right: &[Row]) -> Comparison {
    let converter = std::sync::Arc::new(config.type_converter());
    let l = RecordSource::from_rows("left data", left.to_vec()).with_converter(converter.clone());
    let r = RecordSource::from_rows("right data", right.to_vec()).with_converter(converter);
    Reconciler::new(config).unwrap().compare(l, r).unwrap()
}

fn presence_keys(comparison: &Comparison, side: Side) -> BTreeSet<String> {
    comparison
        .breaks()
        .iter()
        .filter(|b| b.kind() == BreakKind::Presence && b.side() == side)
        .map(|b| b.record().get("Key").to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn short_integers_become_integers(s in r"-?[0-9]{1,8}", pad in r" {0,3}") {
        let converter = StringTypeConverter::default();
        let converted = converter.convert(Value::from(format!("{pad}{s}{pad}")));
        let expected: i32 = s.parse().unwrap();
        prop_assert_eq!(&converted, &Value::Integer(expected));

        let reparsed: i32 = converted.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, expected);
    }

    #[test]
    fn conversion_is_idempotent(raw in arb_raw(), precision in -1i32..6) {
        let converter = StringTypeConverter::new(precision, ["%Y-%m-%d"]);
        let once = converter.convert(Value::from(raw));
        let twice = converter.convert(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn tolerance_is_symmetric(a in arb_number(), b in arb_number(), precision in -2i32..8) {
        let cmp = DataComparator::new(precision);
        prop_assert_eq!(cmp.values_equal(&a, &b), cmp.values_equal(&b, &a));
        prop_assert!(cmp.values_equal(&a, &a));
    }

    #[test]
    fn grouping_keeps_every_item(items in proptest::collection::vec(0i32..20, 0..60)) {
        let stream = items.iter().copied().map(Ok::<i32, String>);
        let groups: Vec<Vec<i32>> = SortedGroups::new(stream, |a: &i32, b: &i32| a.cmp(b))
            .collect::<Result<_, _>>()
            .unwrap();
        let flat: Vec<i32> = groups.iter().flatten().copied().collect();
        prop_assert_eq!(flat, items);
        for group in &groups {
            prop_assert!(group.iter().all(|v| *v == group[0]));
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_64())]

    #[test]
    fn disjoint_keys_are_all_presence_breaks(
        keys in proptest::collection::btree_set(0u32..1000, 0..50),
        split in proptest::collection::vec(any::<bool>(), 50),
    ) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (key, to_left) in keys.iter().zip(split) {
            if to_left {
                left.push(row(*key, "1", "x"));
            } else {
                right.push(row(*key, "1", "x"));
            }
        }
        let (m, n) = (left.len(), right.len());
        right.reverse();

        let comparison = run(ComparisonConfig::new(["Key"]), &left, &right);
        let breaks = comparison.breaks();
        prop_assert_eq!(breaks.len(), m + n);
        prop_assert_eq!(breaks.iter().filter(|b| b.side() == Side::Left).count(), m);
        prop_assert_eq!(breaks.iter().filter(|b| b.side() == Side::Right).count(), n);
        prop_assert!(breaks.iter().all(|b| b.kind() == BreakKind::Presence));
    }

    #[test]
    fn breaks_cover_unmatched_keys((left, right) in arb_dataset()) {
        let comparison = run(ComparisonConfig::new(["Key"]), &left, &right);

        let left_keys: BTreeSet<String> = left.iter().map(|r| r[0].1.clone()).collect();
        let right_keys: BTreeSet<String> = right.iter().map(|r| r[0].1.clone()).collect();
        let only_left: BTreeSet<String> = left_keys.difference(&right_keys).cloned().collect();
        let only_right: BTreeSet<String> = right_keys.difference(&left_keys).cloned().collect();

        prop_assert_eq!(presence_keys(&comparison, Side::Left), only_left);
        prop_assert_eq!(presence_keys(&comparison, Side::Right), only_right);
        prop_assert_eq!(comparison.left_data().len(), left.len());
        prop_assert_eq!(comparison.right_data().len(), right.len());
        prop_assert!(comparison.breaks().iter().all(|b| b.kind() != BreakKind::Group));
    }

    #[test]
    fn exclusion_flags_but_never_drops((left, right) in arb_dataset()) {
        let plain = run(ComparisonConfig::new(["Key"]), &left, &right);

        let excluding = ComparisonConfig::new(["Key"]).with_break_exclude(BreakExcludeConfig {
            field: Some("A".into()),
            ..Default::default()
        });
        let flagged = run(excluding, &left, &right);

        let meta = flagged.metadata();
        prop_assert_eq!(flagged.breaks().len(), plain.breaks().len());
        prop_assert_eq!(
            meta.included_break_count() + meta.excluded_break_count(),
            plain.breaks().len()
        );
        prop_assert_eq!(presence_keys(&flagged, Side::Left), presence_keys(&plain, Side::Left));
        prop_assert_eq!(presence_keys(&flagged, Side::Right), presence_keys(&plain, Side::Right));
        for br in flagged.breaks() {
            if br.is_excluded() {
                prop_assert_eq!(br.fields(), vec!["A"]);
            }
        }
    }

    #[test]
    fn excluded_fields_only_remove_their_diffs((left, right) in arb_dataset()) {
        let plain = run(ComparisonConfig::new(["Key"]), &left, &right);
        let without_a = run(ComparisonConfig::new(["Key"]).with_exclude_fields(["A"]), &left, &right);

        prop_assert_eq!(presence_keys(&without_a, Side::Left), presence_keys(&plain, Side::Left));
        prop_assert_eq!(presence_keys(&without_a, Side::Right), presence_keys(&plain, Side::Right));
        prop_assert!(without_a.breaks().iter().all(|b| !b.fields().contains(&"A")));

        let b_breaks = |c: &Comparison| {
            c.breaks()
                .iter()
                .filter(|b| b.fields().contains(&"B"))
                .map(|b| b.record().get("Key").to_string())
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(b_breaks(&without_a), b_breaks(&plain));
    }
}
