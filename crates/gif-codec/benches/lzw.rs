use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gif_codec::lzw;

fn gradient(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i / 7) % 256) as u8).collect()
}

fn bench_lzw(c: &mut Criterion) {
    let indices = gradient(256 * 256);
    let packed = lzw::encode(&indices, 8).unwrap_or_default();

    c.bench_function("lzw_encode_256x256", |b| {
        b.iter(|| lzw::encode(black_box(&indices), 8))
    });
    c.bench_function("lzw_decode_256x256", |b| {
        b.iter(|| lzw::decode(black_box(&packed), 8, indices.len()))
    });
}

criterion_group!(benches, bench_lzw);
criterion_main!(benches);
