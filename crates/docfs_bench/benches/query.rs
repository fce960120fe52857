//! Query evaluation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docfs_bench::utils::populated_snapshot;
use docfs_core::{Cursor, Filter, Projection, Sort};
use serde_json::json;

/// Benchmark filter evaluation over the whole entity set.
fn bench_filters(c: &mut Criterion) {
    let queries = [
        ("equality", json!({ "recipe": "html" })),
        ("nested", json!({ "chrome.landscape": true, "chrome.scale": { "$gte": 2 } })),
        ("in", json!({ "recipe": { "$in": ["xlsx", "text"] } })),
        ("regex", json!({ "name": { "$regex": "^template-1", "$options": "i" } })),
        (
            "or",
            json!({ "$or": [{ "tags": "tag2" }, { "recipe": { "$ne": "html" } }] }),
        ),
    ];

    let mut group = c.benchmark_group("filter");
    for count in [100, 1000, 10_000] {
        let snapshot = populated_snapshot(count);
        group.throughput(Throughput::Elements(count as u64));
        for (name, query) in &queries {
            let filter = Filter::parse(query).unwrap();
            group.bench_with_input(BenchmarkId::new(*name, count), &filter, |b, filter| {
                b.iter(|| black_box(snapshot.find("templates", filter)).len());
            });
        }
    }
    group.finish();
}

/// Benchmark query parsing.
fn bench_parse(c: &mut Criterion) {
    let query = json!({
        "$and": [
            { "recipe": { "$in": ["html", "chrome-pdf"] } },
            { "name": { "$regex": "^inv" } },
            { "chrome.scale": { "$gt": 1, "$lte": 3 } },
        ]
    });
    c.bench_function("filter_parse", |b| {
        b.iter(|| Filter::parse(black_box(&query)).unwrap());
    });
}

/// Benchmark sorting, paging and projecting results.
fn bench_cursor(c: &mut Criterion) {
    let snapshot = populated_snapshot(10_000);
    let all = snapshot.find("templates", &Filter::parse(&json!({})).unwrap());
    let projection = Projection::parse(&json!({ "name": 1, "recipe": 1 })).unwrap();
    let sort = Sort::parse(&json!({ "recipe": 1, "name": -1 })).unwrap();

    c.bench_function("cursor_sort_page_project", |b| {
        b.iter(|| {
            Cursor::new(all.clone(), projection.clone())
                .sort(sort.clone())
                .skip(100)
                .limit(50)
                .to_vec()
        });
    });
}

criterion_group!(benches, bench_filters, bench_parse, bench_cursor);
criterion_main!(benches);
