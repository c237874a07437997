use crate::*;

use alloc::sync::Arc;
use core::cmp::Ordering;
use core::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};

use proptest::prelude::*;

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // Deterministic, dependency-free PRNG for tests.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn gen_range_u64(&mut self, start: u64, end_exclusive: u64) -> u64 {
        debug_assert!(start < end_exclusive);
        let span = end_exclusive - start;
        start + (self.next_u64() % span)
    }

    fn gen_range_usize(&mut self, start: usize, end_exclusive: usize) -> usize {
        self.gen_range_u64(start as u64, end_exclusive as u64) as usize
    }

    fn gen_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

fn msg(id: &str, score: i64) -> Value {
    Value::object([("id", Value::from(id)), ("score", Value::from(score))])
}

fn id_of(v: &Value) -> String {
    v.get_path("id").as_str().unwrap_or_default().to_owned()
}

fn ids(items: &[Value]) -> Vec<String> {
    items.iter().map(id_of).collect()
}

fn state_ids(engine: &PaginationEngine<String, Value>) -> Vec<String> {
    ids(engine.state().items.as_deref().unwrap_or_default())
}

fn interval_ids(interval: &Interval<String>) -> Vec<&str> {
    interval.item_ids.iter().map(String::as_str).collect()
}

fn options() -> PaginatorOptions<String, Value> {
    PaginatorOptions::new(id_of)
}

fn page(opts: IngestOptions) -> IngestOptions {
    IngestOptions {
        set_active: true,
        ..opts
    }
}

fn outcome(direction: Direction, items: Vec<Value>, cursor: Cursor, first: bool) -> QueryOutcome<String, Value> {
    QueryOutcome {
        direction,
        anchor: PageAnchor::None,
        raw_len: items.len(),
        items,
        cursor,
        is_first_page: first,
        page_size: 2,
    }
}

#[test]
fn locate_by_item_scans_plateau_by_id() {
    let mut engine = PaginationEngine::new(
        options()
            .with_sort(Sort::desc("score"))
            .with_tie_breaker(TieBreaker::Disabled),
    );
    engine.ingest_page(
        vec![msg("a", 30), msg("b", 25), msg("c", 25), msg("d", 20)],
        page(IngestOptions::default()),
    );
    assert_eq!(state_ids(&engine), ["a", "b", "c", "d"]);

    let found = engine.locate_by_item(&msg("c", 25)).unwrap();
    assert_eq!(found.current_index, Some(2));
    assert_eq!(found.insertion_index, 3);

    let absent = engine.locate_by_item(&msg("x", 25)).unwrap();
    assert_eq!(absent.current_index, None);
    assert_eq!(absent.insertion_index, 3);

    let before_all = engine.locate_by_item(&msg("y", 99)).unwrap();
    assert_eq!(before_all.insertion_index, 0);
}

#[test]
fn locate_by_item_reports_missing_index_entries() {
    let items = [msg("a", 1), msg("c", 3)];
    let ids = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
    let lookup = |k: &String| items.iter().find(|v| id_of(v) == *k);
    let cmp = make_comparator(&Sort::asc("score"), Arc::new(|v: &Value, p: &str| v.field(p)), None);
    let err = locate_by_item(&ids, &"x".to_owned(), &msg("x", 2), lookup, |a, b| cmp(a, b))
        .unwrap_err();
    assert_eq!(err, IndexError::MissingItem("b".to_owned()));
}

#[test]
fn overlapping_pages_merge_keeping_existing_items_first_on_ties() {
    let mut engine = PaginationEngine::new(
        options()
            .with_sort(Sort::desc("score"))
            .with_tie_breaker(TieBreaker::Disabled),
    );
    let first = engine
        .ingest_page(vec![msg("c", 20), msg("d", 10)], page(IngestOptions::default()))
        .unwrap();
    let second = engine
        .ingest_page(vec![msg("b", 20)], page(IngestOptions::default()))
        .unwrap();

    assert_eq!(first, second);
    let intervals = engine.intervals();
    assert_eq!(intervals.len(), 1);
    assert_eq!(interval_ids(&intervals[0]), ["c", "b", "d"]);
    assert_eq!(state_ids(&engine), ["c", "b", "d"]);
}

#[test]
fn reingesting_a_page_is_idempotent() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    let items = vec![msg("a", 1), msg("b", 2), msg("c", 3)];
    engine.ingest_page(items.clone(), page(IngestOptions::default()));
    let before = engine.intervals();
    engine.ingest_page(items, page(IngestOptions::default()));
    assert_eq!(engine.intervals(), before);
    assert_eq!(state_ids(&engine), ["a", "b", "c"]);
}

#[test]
fn disjoint_pages_stay_separate_and_transitive_overlap_bridges_them() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(vec![msg("a", 1), msg("b", 2)], IngestOptions::default());
    engine.ingest_page(vec![msg("e", 5), msg("f", 6)], IngestOptions::default());
    assert_eq!(engine.intervals().len(), 2);

    let merged = engine
        .ingest_page(vec![msg("b", 2), msg("e", 5)], IngestOptions::default())
        .unwrap();
    let intervals = engine.intervals();
    assert_eq!(intervals.len(), 1);
    assert_eq!(intervals[0].id, merged);
    assert_eq!(interval_ids(&intervals[0]), ["a", "b", "e", "f"]);
}

#[test]
fn strict_overlap_policy_ignores_target_adjacency() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    let target = engine
        .ingest_page(vec![msg("a", 1), msg("b", 2)], page(IngestOptions::default()))
        .unwrap();

    let strict = engine
        .ingest_page(
            vec![msg("c", 3), msg("d", 4)],
            IngestOptions {
                target: Some(target),
                policy: Some(MergePolicy::StrictOverlapOnly),
                ..IngestOptions::default()
            },
        )
        .unwrap();
    assert_ne!(strict, target);
    assert_eq!(engine.intervals().len(), 2);

    let joined = engine
        .ingest_page(
            vec![msg("c", 3), msg("d", 4)],
            IngestOptions {
                target: Some(target),
                ..IngestOptions::default()
            },
        )
        .unwrap();
    assert_eq!(joined, target);
    let intervals = engine.intervals();
    assert_eq!(intervals.len(), 1);
    assert_eq!(interval_ids(&intervals[0]), ["a", "b", "c", "d"]);
}

#[test]
fn moved_page_items_leave_their_previous_interval() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(vec![msg("a", 1), msg("b", 2)], IngestOptions::default());
    engine.ingest_page(vec![msg("x", 10), msg("y", 11)], IngestOptions::default());
    // `b` re-fetched with a sort key inside the second window.
    engine.ingest_page(vec![msg("b", 11)], IngestOptions::default());

    let intervals = engine.intervals();
    assert_eq!(intervals.len(), 2);
    assert_eq!(interval_ids(&intervals[0]), ["a"]);
    assert_eq!(interval_ids(&intervals[1]), ["x", "b", "y"]);
}

#[test]
fn boosts_reorder_projection_but_not_intervals() {
    let now = Arc::new(AtomicI64::new(1_000));
    let clock = Arc::clone(&now);
    let mut engine = PaginationEngine::new(
        options()
            .with_sort(Sort::asc("score"))
            .with_clock(move || clock.load(AtomicOrdering::SeqCst)),
    );
    let iv = engine
        .ingest_page(
            vec![msg("a", 1), msg("b", 2)],
            page(IngestOptions {
                is_head: true,
                is_tail: true,
                ..IngestOptions::default()
            }),
        )
        .unwrap();

    engine.boost("c".to_owned(), BoostOptions::ttl(500));
    assert!(engine.is_boosted(&"c".to_owned()));
    assert!(engine.ingest_item(msg("c", 3)));

    assert_eq!(state_ids(&engine), ["c", "a", "b"]);
    assert_eq!(interval_ids(engine.interval(iv).unwrap()), ["a", "b", "c"]);

    now.store(1_500, AtomicOrdering::SeqCst);
    assert!(!engine.is_boosted(&"c".to_owned()));
    assert!(engine.jump_to_item(&"a".to_owned()));
    assert_eq!(state_ids(&engine), ["a", "b", "c"]);
    assert_eq!(engine.max_boost_seq(), 0);
}

#[test]
fn boosted_live_item_beyond_an_open_window_is_projected() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("age")));
    let aged = |id: &str, age: i64| Value::object([("id", Value::from(id)), ("age", Value::from(age))]);
    let iv = engine
        .ingest_page(vec![aged("a", 10), aged("b", 20)], page(IngestOptions::default()))
        .unwrap();

    engine.boost("c".to_owned(), BoostOptions::ttl(60_000));
    assert!(engine.ingest_item(aged("c", 30)));
    assert_eq!(state_ids(&engine), ["c", "a", "b"]);
    assert_eq!(
        engine.interval_of(&"c".to_owned()),
        Some(IntervalId::LogicalTail)
    );
    assert_eq!(interval_ids(engine.interval(iv).unwrap()), ["a", "b"]);

    // Re-projection keeps the pinned item until the boost goes away.
    assert!(engine.jump_to_item(&"a".to_owned()));
    assert_eq!(state_ids(&engine), ["c", "a", "b"]);
    engine.remove_boost(&"c".to_owned());
    assert!(engine.jump_to_item(&"a".to_owned()));
    assert_eq!(state_ids(&engine), ["a", "b"]);
}

#[test]
fn reingesting_an_identical_snapshot_reports_no_change() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(
        vec![msg("a", 1), msg("b", 3), msg("c", 5)],
        page(IngestOptions::default()),
    );

    assert!(!engine.ingest_item(msg("a", 1)));
    assert!(!engine.ingest_item(msg("c", 5)));
    assert!(engine.ingest_item(msg("a", 4)));
    assert_eq!(state_ids(&engine), ["b", "a", "c"]);
    assert!(!engine.ingest_item(msg("a", 4)));

    let mut plain = PaginationEngine::new(options().with_state_only());
    assert!(plain.ingest_item(msg("a", 1)));
    assert!(!plain.ingest_item(msg("a", 1)));
}

#[test]
fn mixed_numeric_and_text_strings_sort_transitively() {
    let (nine, ten, text) = (Value::from("9"), Value::from("10"), Value::from("1a"));
    assert_eq!(compare_values(&nine, &ten), Ordering::Less);
    assert_eq!(compare_values(&ten, &text), Ordering::Less);
    assert_eq!(compare_values(&nine, &text), Ordering::Less);

    let mut rng = Lcg::new(7);
    let pool = ["9", "10", "1a", "b", "2024-01-01T00:00:00Z", "", "007"];
    let mut values: Vec<Value> = (0..200)
        .map(|_| Value::from(pool[rng.gen_range_usize(0, pool.len())]))
        .collect();
    values.push(Value::Null);
    values.push(Value::from(true));
    values.sort_by(compare_values);
    for pair in values.windows(2) {
        assert_ne!(compare_values(&pair[0], &pair[1]), Ordering::Greater);
    }
    assert_eq!(values.last(), Some(&Value::Null));
}

#[test]
fn boost_sequence_orders_boosted_items() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(
        vec![msg("a", 1), msg("b", 2), msg("c", 3)],
        page(IngestOptions::default()),
    );
    engine.boost("b".to_owned(), BoostOptions::ttl(60_000).with_seq(1));
    engine.boost("c".to_owned(), BoostOptions::ttl(60_000).with_seq(2));
    assert_eq!(state_ids(&engine), ["c", "b", "a"]);
    assert_eq!(engine.max_boost_seq(), 2);

    engine.clear_boosts();
    assert_eq!(state_ids(&engine), ["a", "b", "c"]);
}

#[test]
fn live_items_beyond_known_windows_park_in_logical_intervals() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    let iv = engine
        .ingest_page(vec![msg("b", 2), msg("c", 3)], page(IngestOptions::default()))
        .unwrap();

    engine.ingest_item(msg("a", 1));
    engine.ingest_item(msg("z", 9));
    assert_eq!(state_ids(&engine), ["b", "c"]);
    assert_eq!(
        engine.interval_of(&"a".to_owned()),
        Some(IntervalId::LogicalHead)
    );
    assert_eq!(
        engine.interval_of(&"z".to_owned()),
        Some(IntervalId::LogicalTail)
    );

    // Reaching the dataset head folds the head sentinel into the window.
    engine.ingest_page(
        vec![msg("b", 2), msg("c", 3)],
        page(IngestOptions {
            is_head: true,
            target: Some(iv),
            ..IngestOptions::default()
        }),
    );
    assert!(engine.interval(IntervalId::LogicalHead).is_none());
    assert_eq!(state_ids(&engine), ["a", "b", "c"]);
    assert!(engine.interval(IntervalId::LogicalTail).is_some());
}

#[test]
fn live_items_on_closed_edges_join_the_edge_interval() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(
        vec![msg("b", 2), msg("c", 3)],
        page(IngestOptions {
            is_tail: true,
            ..IngestOptions::default()
        }),
    );
    engine.ingest_item(msg("d", 4));
    assert_eq!(state_ids(&engine), ["b", "c", "d"]);
    assert!(engine.jump_to_tail());
    assert!(!engine.jump_to_head());
}

#[test]
fn live_items_between_intervals_stay_index_only() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(vec![msg("a", 1), msg("b", 2)], page(IngestOptions::default()));
    engine.ingest_page(vec![msg("e", 5), msg("f", 6)], IngestOptions::default());

    assert!(!engine.ingest_item(msg("c", 3)));
    assert!(engine.interval_of(&"c".to_owned()).is_none());
    assert_eq!(engine.get_item(&"c".to_owned()), Some(msg("c", 3)));
    assert_eq!(state_ids(&engine), ["a", "b"]);

    assert_eq!(engine.prune_index(), 1);
    assert!(engine.get_item(&"c".to_owned()).is_none());
    assert_eq!(engine.item_index().map(|index| index.read().len()), Some(4));
}

#[test]
fn live_updates_reposition_unless_order_is_locked() {
    let closed = || {
        page(IngestOptions {
            is_head: true,
            is_tail: true,
            ..IngestOptions::default()
        })
    };

    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(vec![msg("a", 1), msg("b", 2), msg("c", 3)], closed());
    engine.ingest_item(msg("a", 10));
    assert_eq!(state_ids(&engine), ["b", "c", "a"]);

    let mut locked = PaginationEngine::new(
        options()
            .with_sort(Sort::asc("score"))
            .with_lock_item_order(true),
    );
    locked.ingest_page(vec![msg("a", 1), msg("b", 2), msg("c", 3)], closed());
    locked.ingest_item(msg("a", 10));
    assert_eq!(state_ids(&locked), ["a", "b", "c"]);
    assert_eq!(locked.state().items.as_ref().unwrap()[0], msg("a", 10));
    let iv = locked.active_interval().unwrap();
    assert_eq!(interval_ids(iv), ["b", "c", "a"]);
}

#[test]
fn filter_rejection_removes_item_everywhere() {
    let item = |id: &str, score: i64, status: &str| {
        Value::object([
            ("id", Value::from(id)),
            ("score", Value::from(score)),
            ("status", Value::from(status)),
        ])
    };
    let mut engine = PaginationEngine::new(
        options()
            .with_sort(Sort::asc("score"))
            .with_filter(Filter::nor([Filter::eq("status", "archived")])),
    );
    engine.ingest_page(
        vec![item("a", 1, "open"), item("b", 2, "open")],
        page(IngestOptions::default()),
    );

    assert!(engine.ingest_item(item("a", 1, "archived")));
    assert_eq!(state_ids(&engine), ["b"]);
    assert!(engine.interval_of(&"a".to_owned()).is_none());
    assert!(engine.get_item(&"a".to_owned()).is_none());
}

#[test]
fn remove_item_reports_change_and_drops_empty_intervals() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(vec![msg("a", 1)], page(IngestOptions::default()));

    assert!(engine.remove_item(&"a".to_owned()));
    assert!(engine.intervals().is_empty());
    assert!(engine.active_interval().is_none());
    assert_eq!(engine.state().items.as_deref(), Some(&[][..]));
    assert!(!engine.remove_item(&"a".to_owned()));
}

#[test]
fn shared_index_survives_filter_removal_in_one_paginator() {
    let index = ItemIndex::new(id_of).into_shared();
    let mut open = PaginationEngine::new(
        options()
            .with_item_index(Arc::clone(&index))
            .with_filter(Filter::eq("score", 1)),
    );
    let mut all = PaginationEngine::new(options().with_item_index(Arc::clone(&index)));

    all.ingest_page(vec![msg("a", 1)], page(IngestOptions::default()));
    open.ingest_item(msg("a", 2));
    assert_eq!(index.read().get(&"a".to_owned()), Some(&msg("a", 2)));
    assert_eq!(all.get_item(&"a".to_owned()), Some(msg("a", 2)));
}

#[test]
fn filter_operators() {
    let doc = Value::object([
        ("name", Value::from("Hello World")),
        ("tags", Value::from(vec!["a", "a", "b"])),
        ("age", Value::from(30)),
        ("joined", Value::from("2024-03-01T00:00:00Z")),
        ("user", Value::object([("role", Value::from("admin"))])),
    ]);
    let resolvers = ResolverRegistry::new();
    let matches = |f: Filter| item_matches_filter(&doc, &f, &resolvers);

    assert!(matches(Filter::eq("tags", vec!["b", "a"])));
    assert!(matches(Filter::eq("tags", "a")));
    assert!(!matches(Filter::eq("tags", vec!["a", "c"])));
    assert!(matches(Filter::eq("user.role", "admin")));
    assert!(matches(Filter::eq("age", "30")));
    assert!(matches(Filter::field("age", [Operator::Gt(Value::from(18)), Operator::Lte(Value::from(30))])));
    assert!(!matches(Filter::field("tags", [Operator::Gt(Value::from("a"))])));
    assert!(matches(Filter::field(
        "joined",
        [Operator::Gte(Value::from("2024-01-01T00:00:00Z"))]
    )));
    assert!(matches(Filter::field("age", [Operator::In(vec![Value::from(1), Value::from(30)])])));
    assert!(matches(Filter::field("tags", [Operator::Nin(vec![Value::from("z")])])));
    assert!(matches(Filter::field("missing", [Operator::Exists(false)])));
    assert!(matches(Filter::field("name", [Operator::Contains(Value::from("lo Wo"))])));
    assert!(matches(Filter::field("name", [Operator::Autocomplete("wor he".into())])));
    assert!(!matches(Filter::field("name", [Operator::Autocomplete("orld".into())])));
    assert!(matches(Filter::or([Filter::eq("age", 1), Filter::eq("age", 30)])));
    assert!(!matches(Filter::nor([Filter::eq("age", 30)])));
    assert!(matches(Filter::default()));
}

#[test]
fn custom_resolvers_take_precedence_in_registration_order() {
    let doc = Value::object([("score", Value::from(1))]);
    let resolvers = ResolverRegistry::<Value>::new()
        .with(FieldResolver::for_field("score", |_| Value::from(99)))
        .with(FieldResolver::new(|f| f.starts_with("sc"), |_, _| Value::from(7)));
    assert!(item_matches_filter(&doc, &Filter::eq("score", 99), &resolvers));
    assert!(item_matches_filter(&doc, &Filter::eq("scale", 7), &resolvers));
}

#[test]
fn tokenize_normalizes_compatibility_forms() {
    assert_eq!(tokenize("  Ｈｅｌｌｏ   WORLD "), ["hello", "world"]);
    assert!(tokenize("   ").is_empty());
}

#[test]
fn sort_from_mappings_and_null_placement() {
    let sort = Sort::from_mappings([[("rank", -1)], [("name", 1)]]);
    assert_eq!(sort.terms()[0].direction, SortDirection::Desc);
    let cmp = make_comparator(&sort, Arc::new(|v: &Value, p: &str| v.field(p)), None);
    let a = Value::object([("rank", Value::from(2)), ("name", Value::from("b"))]);
    let b = Value::object([("rank", Value::from(2)), ("name", Value::from("a"))]);
    let c = Value::object([("name", Value::from("c"))]);
    assert_eq!(cmp(&a, &b), Ordering::Greater);
    // Nulls sort last ascending; descending flips them first.
    assert_eq!(cmp(&c, &a), Ordering::Less);
    assert_eq!(compare_values(&Value::Null, &Value::from(1)), Ordering::Greater);
}

fn context<'a>(
    anchor: &'a PageAnchor<String>,
    page: &'a [Value],
    requested: usize,
    compare: &'a dyn Fn(&Value, &Value) -> Ordering,
    time_of: &'a dyn Fn(&Value) -> Option<i64>,
) -> DeriveContext<'a, String, Value> {
    DeriveContext {
        direction: Some(Direction::Tailward),
        anchor,
        page,
        raw_len: page.len(),
        requested_page_size: requested,
        interval_first: None,
        interval_last: None,
        has_more_head: true,
        has_more_tail: true,
        get_item_id: &id_of,
        compare,
        time_of,
    }
}

#[test]
fn linear_derivation_uses_raw_page_size() {
    let cmp = make_comparator(&Sort::asc("score"), Arc::new(|v: &Value, p: &str| v.field(p)), None);
    let compare = |a: &Value, b: &Value| cmp(a, b);
    let no_time = |_: &Value| -> Option<i64> { None };
    let page = [msg("a", 1), msg("b", 2)];

    let anchor = PageAnchor::None;
    let full = LinearDerivation.derive(&context(&anchor, &page, 2, &compare, &no_time));
    assert_eq!(
        full,
        Derived {
            has_more_head: false,
            has_more_tail: true
        }
    );

    let anchor = PageAnchor::Tailward;
    let mut ctx = context(&anchor, &page, 5, &compare, &no_time);
    ctx.interval_first = Some(&page[0]);
    ctx.interval_last = Some(&page[1]);
    let short = LinearDerivation.derive(&ctx);
    assert_eq!(
        short,
        Derived {
            has_more_head: true,
            has_more_tail: false
        }
    );
}

#[test]
fn id_anchored_derivation_closes_the_edge_nearest_the_anchor() {
    let cmp = make_comparator(&Sort::asc("score"), Arc::new(|v: &Value, p: &str| v.field(p)), None);
    let compare = |a: &Value, b: &Value| cmp(a, b);
    let no_time = |_: &Value| -> Option<i64> { None };
    let page: Vec<Value> = ["a", "b", "c", "d", "e"]
        .iter()
        .zip(1..)
        .map(|(id, s)| msg(id, s))
        .collect();

    let derive = |anchor: &str| {
        let anchor = PageAnchor::IdAround(anchor.to_owned());
        IdAnchoredDerivation.derive(&context(&anchor, &page, 5, &compare, &no_time))
    };
    assert_eq!(
        derive("a"),
        Derived {
            has_more_head: false,
            has_more_tail: true
        }
    );
    assert_eq!(
        derive("c"),
        Derived {
            has_more_head: true,
            has_more_tail: true
        }
    );
    assert_eq!(
        derive("e"),
        Derived {
            has_more_head: true,
            has_more_tail: false
        }
    );
    assert_eq!(
        derive("zz"),
        Derived {
            has_more_head: true,
            has_more_tail: true
        }
    );
}

#[test]
fn time_anchored_derivation_partitions_on_timestamp() {
    let cmp = make_comparator(&Sort::asc("score"), Arc::new(|v: &Value, p: &str| v.field(p)), None);
    let compare = |a: &Value, b: &Value| cmp(a, b);
    let time_of = |v: &Value| match v.get_path("score") {
        Value::Number(n) => Some(*n as i64),
        _ => None,
    };
    let page = [msg("a", 10), msg("b", 20), msg("c", 30), msg("d", 40)];

    let anchor = PageAnchor::TimeAround(12);
    let early = TimeAnchoredDerivation.derive(&context(&anchor, &page, 4, &compare, &time_of));
    assert_eq!(
        early,
        Derived {
            has_more_head: false,
            has_more_tail: true
        }
    );

    let anchor = PageAnchor::TimeAround(25);
    let middle = TimeAnchoredDerivation.derive(&context(&anchor, &page, 4, &compare, &time_of));
    assert_eq!(
        middle,
        Derived {
            has_more_head: true,
            has_more_tail: true
        }
    );

    let short = TimeAnchoredDerivation.derive(&context(&anchor, &page, 10, &compare, &time_of));
    assert_eq!(
        short,
        Derived {
            has_more_head: false,
            has_more_tail: false
        }
    );
}

#[test]
fn cursor_mode_tracks_tokens_per_direction() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("a", 1), msg("b", 2)],
        Cursor::new(None, Some("t1".into())),
        true,
    ));
    let state = engine.state();
    assert!(!state.has_more_head);
    assert!(state.has_more_tail);
    assert_eq!(state.cursor.as_ref().unwrap().token(Direction::Tailward), Some("t1"));
    assert!(engine.active_interval().unwrap().is_head);

    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("c", 3)],
        Cursor::new(Some("ignored".into()), None),
        false,
    ));
    let state = engine.state();
    assert!(!state.has_more_tail);
    assert_eq!(state.cursor, Some(Cursor::new(None, None)));
    assert_eq!(state_ids(&engine), ["a", "b", "c"]);
    assert_eq!(engine.intervals().len(), 1);
}

#[test]
fn offset_mode_advances_offset_by_raw_length() {
    let mut engine = PaginationEngine::new(
        options()
            .with_sort(Sort::asc("score"))
            .with_mode(PaginationMode::Offset),
    );
    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("a", 1), msg("b", 2)],
        Cursor::default(),
        true,
    ));
    assert_eq!(engine.state().offset, 2);
    assert!(engine.state().has_more_tail);
    assert!(!engine.state().has_more_head);

    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("c", 3)],
        Cursor::default(),
        false,
    ));
    assert_eq!(engine.state().offset, 3);
    assert!(!engine.state().has_more_tail);
}

#[test]
fn state_only_mode_appends_and_prepends_pages() {
    let mut engine = PaginationEngine::new(options().with_state_only());
    assert!(!engine.tracks_intervals());

    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("m", 5)],
        Cursor::new(Some("h".into()), Some("t".into())),
        true,
    ));
    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("n", 6), msg("m", 50)],
        Cursor::new(None, Some("t2".into())),
        false,
    ));
    engine.apply_query_result(outcome(
        Direction::Headward,
        vec![msg("l", 4)],
        Cursor::new(Some("h2".into()), None),
        false,
    ));
    assert_eq!(state_ids(&engine), ["l", "m", "n"]);
    assert_eq!(engine.get_item(&"m".to_owned()), Some(msg("m", 50)));
    assert!(engine.intervals().is_empty());
}

#[test]
fn query_results_notify_once_and_clear_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut engine = PaginationEngine::new(options().with_on_change(Some(
        move |_: &PaginatorState<Value>| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        },
    )));
    engine.set_query_error(Some("boom".into()));
    assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);

    engine.apply_query_result(outcome(
        Direction::Tailward,
        vec![msg("a", 1), msg("b", 2)],
        Cursor::default(),
        true,
    ));
    assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    assert!(engine.state().last_query_error.is_none());

    engine.reset_state();
    assert_eq!(engine.state(), &PaginatorState::default());
    assert!(engine.intervals().is_empty());
}

#[test]
fn set_sort_reorders_intervals_and_projection() {
    let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
    engine.ingest_page(
        vec![msg("a", 1), msg("b", 2), msg("c", 3)],
        page(IngestOptions::default()),
    );
    engine.set_sort(Sort::desc("score"));
    assert_eq!(state_ids(&engine), ["c", "b", "a"]);
    assert_eq!(interval_ids(engine.active_interval().unwrap()), ["c", "b", "a"]);
}

#[test]
fn random_live_updates_keep_intervals_sorted_and_unique() {
    let mut rng = Lcg::new(0x5eed);
    for _round in 0..20 {
        let mut engine = PaginationEngine::new(options().with_sort(Sort::asc("score")));
        let cmp = engine.comparator();
        for _step in 0..60 {
            let id = format!("i{}", rng.gen_range_usize(0, 25));
            let score = rng.gen_range_u64(0, 100) as i64;
            match rng.gen_range_usize(0, 4) {
                0 => {
                    let len = rng.gen_range_usize(1, 5);
                    let items = (0..len)
                        .map(|_| {
                            msg(
                                &format!("i{}", rng.gen_range_usize(0, 25)),
                                rng.gen_range_u64(0, 100) as i64,
                            )
                        })
                        .collect();
                    let set_active = rng.gen_bool();
                    engine.ingest_page(
                        items,
                        IngestOptions {
                            set_active,
                            is_head: rng.gen_bool(),
                            ..IngestOptions::default()
                        },
                    );
                }
                1 => {
                    engine.remove_item(&id);
                }
                _ => {
                    engine.ingest_item(msg(&id, score));
                }
            }

            let index = engine.item_index().unwrap().read();
            let mut seen = std::collections::HashSet::new();
            for iv in engine.intervals() {
                for k in &iv.item_ids {
                    assert!(seen.insert(k.clone()), "{k} appears in two intervals");
                    assert!(index.has(k));
                }
                for pair in iv.item_ids.windows(2) {
                    let (a, b) = (index.get(&pair[0]).unwrap(), index.get(&pair[1]).unwrap());
                    assert_ne!(cmp(a, b), Ordering::Greater);
                }
            }
        }
    }
}

fn arb_item() -> impl Strategy<Value = Value> {
    (
        "[a-e]{1,3}",
        prop::option::of(-5i64..5),
        prop::option::of("[a-c]{0,2}|[0-9]{1,2}|[0-9][a-c]"),
    )
        .prop_map(|(id, rank, name)| {
            Value::object([
                ("id", Value::from(id)),
                ("rank", Value::from(rank)),
                ("name", Value::from(name)),
            ])
        })
}

proptest! {
    #[test]
    fn compiled_comparator_is_a_total_order(a in arb_item(), b in arb_item(), c in arb_item()) {
        let options = options().with_sort(Sort::desc("rank").then_asc("name"));
        let engine = PaginationEngine::new(options);
        let cmp = engine.comparator();

        prop_assert_eq!(cmp(&a, &b), cmp(&b, &a).reverse());
        if cmp(&a, &b) != Ordering::Greater && cmp(&b, &c) != Ordering::Greater {
            prop_assert_ne!(cmp(&a, &c), Ordering::Greater);
        }
        if id_of(&a) != id_of(&b) {
            prop_assert_ne!(cmp(&a, &b), Ordering::Equal);
        }
    }
}

fn arb_operator() -> impl Strategy<Value = Operator> {
    let scalar = prop_oneof![
        (-3i64..3).prop_map(Value::from),
        "[a-c0-9]{0,2}".prop_map(Value::from),
        Just(Value::Null),
    ];
    let list = prop::collection::vec(scalar.clone(), 0..3);
    prop_oneof![
        scalar.clone().prop_map(Operator::Eq),
        scalar.clone().prop_map(Operator::Ne),
        list.clone().prop_map(Operator::In),
        list.prop_map(Operator::Nin),
        scalar.clone().prop_map(Operator::Gt),
        scalar.clone().prop_map(Operator::Lte),
        any::<bool>().prop_map(Operator::Exists),
        scalar.prop_map(Operator::Contains),
        "[a-c]{0,2}( [a-c]{1,2})?".prop_map(Operator::Autocomplete),
    ]
}

fn arb_field_filter() -> impl Strategy<Value = Filter> {
    (
        prop_oneof![Just("rank"), Just("name"), Just("missing")],
        prop::collection::vec(arb_operator(), 1..3),
    )
        .prop_map(|(field, ops)| Filter::field(field, ops))
}

proptest! {
    #[test]
    fn nor_negates_a_field_filter(item in arb_item(), filter in arb_field_filter()) {
        let resolvers = ResolverRegistry::new();
        let direct = item_matches_filter(&item, &filter, &resolvers);
        let negated = item_matches_filter(&item, &Filter::nor([filter]), &resolvers);
        prop_assert_eq!(negated, !direct);
    }
}
