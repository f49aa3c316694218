//! Benchmark: tree building, directive name parsing and keyed list updates

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use isle_core::directive::parse_directive_name;
use isle_core::dom::Document;
use isle_core::state::Value;
use isle_core::store::{StoreLock, StorePart};
use isle_core::vdom::to_vdom;
use isle_core::{Interactivity, RuntimeConfig};
use serde_json::json;

fn island(rows: usize) -> String {
    let mut html = String::from(r#"<div data-wp-interactive="bench" data-wp-context='{"open": true}'>"#);
    for row in 0..rows {
        html.push_str(&format!(
            r#"<p class="row" data-wp-class--open="context.open" data-wp-text="state.rows.{row}">row {row}</p>"#
        ));
    }
    html.push_str("</div>");
    html
}

fn items(count: usize, offset: usize) -> serde_json::Value {
    let items: Vec<_> = (0..count)
        .map(|i| {
            let id = (i + offset) % count;
            json!({"id": id, "name": format!("item {id}")})
        })
        .collect();
    json!(items)
}

fn benchmark_to_vdom(c: &mut Criterion) {
    let config = RuntimeConfig::default();
    let mut group = c.benchmark_group("to_vdom");
    for rows in [10, 100, 1000] {
        let html = island(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &html, |b, html| {
            b.iter_batched(
                || Document::parse(html),
                |document| {
                    let root = document.root().first_child();
                    root.map(|root| black_box(to_vdom(&root, &config)))
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn benchmark_directive_names(c: &mut Criterion) {
    let names = [
        "data-wp-text",
        "data-wp-on--click",
        "data-wp-bind--aria-label",
        "data-wp-class--is-active---secondary",
        "data-wp-context---plugin",
    ];
    c.bench_function("parse_directive_name", |b| {
        b.iter(|| {
            for name in names {
                black_box(parse_directive_name(black_box(name), "data-wp-"));
            }
        });
    });
}

fn benchmark_each_rotation(c: &mut Criterion) {
    let mut config = RuntimeConfig::with_prefix("data-wp-");
    config.yield_between_islands = false;
    config.debug = false;
    let html = r#"<ul data-wp-interactive="list"><template data-wp-each="state.items" data-wp-each-key="context.item.id"><li data-wp-text="context.item.name"></li></template></ul>"#;
    let runtime = Interactivity::new(Document::parse(html), config).unwrap();
    let store = runtime
        .store("list", StorePart::new().state(json!({"items": items(200, 0)})), StoreLock::Public)
        .unwrap();
    let list = runtime.document().root().first_child().unwrap();
    runtime.hydrate_island(&list).unwrap();

    let mut offset = 0;
    c.bench_function("each_rotate_200", |b| {
        b.iter(|| {
            offset = (offset + 1) % 200;
            store
                .state()
                .set("items", Value::from_json(Some("list"), &items(200, offset)));
        });
    });
}

criterion_group!(
    benches,
    benchmark_to_vdom,
    benchmark_directive_names,
    benchmark_each_rotation
);
criterion_main!(benches);
