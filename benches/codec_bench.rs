// Encode/decode throughput benchmarks for the Lua <-> BSON codec

use bson::{doc, Bson, Document};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use luamongo::{cast, codec};
use mlua::{Lua, Value};
use std::hint::black_box;

fn sample_document(i: i64) -> Document {
    doc! {
        "_id": bson::oid::ObjectId::new(),
        "name": format!("user{:06}", i),
        "age": (i % 90) as i32,
        "score": i as f64 * 0.5,
        "created": bson::DateTime::from_millis(1_700_000_000_000 + i),
        "tags": ["a", "b", "c"],
        "address": { "city": "Berlin", "zip": "10115" },
    }
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_table");
    let lua = Lua::new();

    for size in [10, 100, 1000].iter() {
        let docs: Vec<Document> = (0..*size).map(sample_document).collect();
        let table = codec::decode_documents(&lua, &docs).unwrap();
        let value = Value::Table(table);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(codec::encode(&value).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_documents");
    let lua = Lua::new();

    for size in [10, 100, 1000].iter() {
        let docs: Vec<Document> = (0..*size).map(sample_document).collect();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(codec::decode_documents(&lua, &docs).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_extended_json(c: &mut Criterion) {
    let docs: Vec<Bson> = (0..100).map(|i| Bson::Document(sample_document(i))).collect();
    let text = Bson::Array(docs).into_canonical_extjson().to_string();

    c.bench_function("parse_extended_json_100", |b| {
        b.iter(|| black_box(cast::parse_extended_json(&text).unwrap()));
    });
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_extended_json);
criterion_main!(benches);
