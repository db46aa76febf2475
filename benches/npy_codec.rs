use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jbof::npy::{read_npy, write_npy, NpyWriteOptions};
use jbof::{CodecRegistry, Endianness, Tensor};
use ndarray::Array1;
use std::hint::black_box;

fn tensor(len: usize) -> Tensor {
    Tensor::from(Array1::from_shape_fn(len, |i| i as f32 * 0.5).into_dyn())
}

fn npy_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("npy_write");
    for len in [1usize << 10, 1 << 16, 1 << 20].iter() {
        let tensor = tensor(*len);
        group.throughput(Throughput::Bytes(tensor.size_in_bytes() as u64));
        group.bench_with_input(BenchmarkId::new("native", len), &tensor, |b, t| {
            b.iter(|| write_npy(black_box(t), &NpyWriteOptions::default()));
        });
        let swapped = NpyWriteOptions {
            endianness: Endianness::Big,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("byteswap", len), &tensor, |b, t| {
            b.iter(|| write_npy(black_box(t), &swapped));
        });
    }
    group.finish();
}

fn npy_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("npy_read");
    for len in [1usize << 10, 1 << 16, 1 << 20].iter() {
        let bytes = write_npy(&tensor(*len), &NpyWriteOptions::default());
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &bytes, |b, bytes| {
            b.iter(|| read_npy(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn compressed_codecs(c: &mut Criterion) {
    let registry = CodecRegistry::default();
    let tensor = tensor(1 << 16);
    let mut group = c.benchmark_group("compressed_encode");
    group.throughput(Throughput::Bytes(tensor.size_in_bytes() as u64));
    for extension in ["npy", "npy.gz", "npy.zst"] {
        group.bench_function(extension, |b| {
            b.iter(|| registry.encode(black_box(&tensor), extension).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, npy_write, npy_read, compressed_codecs);
criterion_main!(benches);
