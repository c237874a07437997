// Example: page merging, a live update and a boost.
use paginator::{BoostOptions, IngestOptions, PaginationEngine, PaginatorOptions, Sort, Value};

fn message(id: &str, created_at: i64) -> Value {
    Value::object([("id", Value::from(id)), ("created_at", Value::from(created_at))])
}

fn id_of(v: &Value) -> String {
    v.get_path("id").as_str().unwrap_or_default().to_owned()
}

fn print_items(label: &str, engine: &PaginationEngine<String, Value>) {
    let ids: Vec<String> = engine
        .state()
        .items
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(id_of)
        .collect();
    println!("{label}: {ids:?}");
}

fn main() {
    let mut engine =
        PaginationEngine::new(PaginatorOptions::new(id_of).with_sort(Sort::asc("created_at")));
    let active = IngestOptions {
        set_active: true,
        ..IngestOptions::default()
    };

    engine.ingest_page(vec![message("m1", 10), message("m2", 20)], active);
    engine.ingest_page(
        vec![message("m2", 20), message("m3", 30)],
        IngestOptions {
            is_tail: true,
            ..active
        },
    );
    println!("intervals={}", engine.intervals().len());
    print_items("merged", &engine);

    engine.ingest_item(message("m4", 40));
    print_items("live update", &engine);

    engine.boost("m1".to_owned(), BoostOptions::ttl(15_000));
    print_items("boosted", &engine);
}
