use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pixio::{AttrValue, ImageSpec, TypeDesc};

fn bench_size_queries(c: &mut Criterion) {
    let mut spec = ImageSpec::new_2d(TypeDesc::FLOAT, 8192, 8192, 4);
    spec.tile_width = 64;
    spec.tile_height = 64;
    spec.tile_depth = 1;

    c.bench_function("image_bytes", |b| {
        b.iter(|| black_box(&spec).image_bytes(false));
    });
    c.bench_function("size_safe", |b| {
        b.iter(|| black_box(&spec).size_safe());
    });
}

fn bench_typedesc_round_trip(c: &mut Criterion) {
    let descs = [
        TypeDesc::UINT8,
        TypeDesc::FLOAT,
        TypeDesc::COLOR,
        TypeDesc::TIMECODE,
        TypeDesc::KEYCODE,
    ];
    c.bench_function("typedesc_round_trip", |b| {
        b.iter(|| {
            for td in &descs {
                let raw = black_box(*td).to_raw();
                let _ = black_box(TypeDesc::from_raw(raw));
            }
        });
    });
}

fn bench_attribute_lookup(c: &mut Criterion) {
    let mut spec = ImageSpec::new(TypeDesc::UINT8);
    for i in 0..64 {
        spec.attribute(&format!("attr{i}"), AttrValue::Int(i));
    }
    c.bench_function("get_int_attribute", |b| {
        b.iter(|| black_box(&spec).get_int_attribute("attr63", -1));
    });
}

criterion_group!(
    benches,
    bench_size_queries,
    bench_typedesc_round_trip,
    bench_attribute_lookup
);
criterion_main!(benches);
