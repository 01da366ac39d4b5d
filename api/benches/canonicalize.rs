use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;

use giftreco::etl::canonicalize::canonicalize;
use giftreco::etl::hasher::content_hash;

fn synthetic_item(images: usize) -> serde_json::Value {
    let small: Vec<String> = (0..images).rev().map(|i| format!("https://img/{i}-s.jpg")).collect();
    let medium: Vec<String> = (0..images).rev().map(|i| format!("https://img/{i}-m.jpg")).collect();
    let tag_ids: Vec<u64> = (0..images as u64).rev().collect();
    json!({
        "itemCode": "shop:1234",
        "itemName": "ギフト用タオルセット  ",
        "itemCaption": "ふわふわの\r\nタオルです。\r贈り物に。",
        "itemPrice": 3980,
        "smallImageUrls": small,
        "mediumImageUrls": medium,
        "tagIds": tag_ids,
        "request_id": "req-1",
        "fetched_at": "2024-06-01T00:00:00Z",
        "shop": {"shopCode": "shop", "shopName": "お店"}
    })
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    for size in [4, 64, 512].iter() {
        let payload = synthetic_item(*size);
        group.bench_function(BenchmarkId::new("canonicalize_and_hash", size), |b| {
            b.iter(|| content_hash(&canonicalize("item", &payload)))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
