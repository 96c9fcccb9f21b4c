use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use kyroref::{EntitySchema, EntityStore, SchemaMap};

fn schemas() -> SchemaMap {
    SchemaMap::new()
        .entity("users", EntitySchema::new())
        .entity("comments", EntitySchema::new().one("commenter", "users"))
        .entity(
            "articles",
            EntitySchema::new()
                .one("author", "users")
                .many("comments", "comments"),
        )
}

/// `articles` articles, each with its own author and eight comments, plus
/// `fan_in` articles that all reference the shared comment `hot`.
fn seeded_store(articles: usize, fan_in: usize) -> EntityStore {
    let mut store = EntityStore::new(schemas()).unwrap();

    let payloads: Vec<_> = (0..articles)
        .map(|n| {
            let comments: Vec<_> = (0..8)
                .map(|c| json!({"id": format!("c{n}-{c}"), "commenter": format!("u{}", (n + c) % 64)}))
                .collect();
            json!({"id": format!("a{n}"), "author": format!("u{n}"), "comments": comments})
        })
        .collect();
    store = store.upsert_many("articles", &payloads).unwrap();

    let shared: Vec<_> = (0..fan_in)
        .map(|n| json!({"id": format!("shared{n}"), "author": "u0", "comments": ["hot", format!("c0-{}", n % 8)]}))
        .collect();
    store.upsert_many("articles", &shared).unwrap()
}

fn bench_delete_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade/delete_hot_comment");
    group.throughput(Throughput::Elements(1));

    for articles in [100usize, 1_000, 10_000] {
        let store = seeded_store(articles, 32);
        group.bench_with_input(BenchmarkId::from_parameter(articles), &store, |b, store| {
            b.iter(|| black_box(store.delete_one("comments", "hot").unwrap()));
        });
    }
    group.finish();
}

fn bench_delete_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade/delete_by_fan_in");

    for fan_in in [1usize, 32, 512] {
        let store = seeded_store(1_000, fan_in);
        group.throughput(Throughput::Elements(fan_in as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fan_in), &store, |b, store| {
            b.iter(|| black_box(store.delete_one("comments", "hot").unwrap()));
        });
    }
    group.finish();
}

fn bench_upsert_diff(c: &mut Criterion) {
    let store = seeded_store(1_000, 32);
    c.bench_function("cascade/upsert_changed_list", |b| {
        b.iter(|| {
            black_box(
                store
                    .upsert_one("articles", &json!({"id": "a7", "comments": ["c7-0", "c7-1", "fresh"]}))
                    .unwrap(),
            )
        });
    });
}

criterion_group!(
    cascade,
    bench_delete_cascade,
    bench_delete_fan_in,
    bench_upsert_diff
);
criterion_main!(cascade);
