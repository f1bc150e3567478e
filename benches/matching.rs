use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pactmock::matchers::{each_like, like};
use pactmock::MatchSpec;
use serde_json::{json, Value};

fn roster(size: usize) -> Value {
    (0..size)
        .map(|id| {
            json!({
                "firstName": "Anakin",
                "lastName": "Skywalker",
                "age": 16,
                "profession": "Jedi Padawan",
                "id": id
            })
        })
        .collect()
}

pub fn literal_roster(c: &mut Criterion) {
    let spec = MatchSpec::from(roster(100));
    let actual = roster(100);
    c.bench_function("MatchSpec::matches literal roster of 100", |b| {
        b.iter(|| spec.matches(black_box(&actual), "$.body"))
    });
}

pub fn structural_roster(c: &mut Criterion) {
    let spec = each_like(like(roster(1)[0].clone()), 1);
    let actual = roster(100);
    c.bench_function("MatchSpec::matches each_like roster of 100", |b| {
        b.iter(|| spec.matches(black_box(&actual), "$.body"))
    });
}

pub fn from_json(c: &mut Criterion) {
    let declaration = json!({
        "client": {"rule": "like", "example": {"id": 3, "firstName": "Craig"}},
        "token": {"rule": "regex", "pattern": "^[a-z]+$", "example": "abc"},
        "tags": {"rule": "eachLike", "example": "jedi", "min": 2}
    });
    c.bench_function("MatchSpec::from_json", |b| {
        b.iter(|| MatchSpec::from_json(black_box(declaration.clone())))
    });
}

criterion_group!(benches, literal_roster, structural_roster, from_json);
criterion_main!(benches);
