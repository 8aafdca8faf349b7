use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use texture_streamer::decoder::DecodedImage;
use texture_streamer::mipmap::{generate_mipmaps, ResampleFilter};
use texture_streamer::queue::BlockingQueue;

fn flat_image(size: u32) -> DecodedImage {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for i in 0..(size * size) {
        pixels.extend_from_slice(&[(i % 255) as u8, 128, 64, 255]);
    }
    DecodedImage {
        width: size,
        height: size,
        pixels,
    }
}

fn bench_mipmap_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_mipmaps");
    for size in [256u32, 1024, 2048] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || flat_image(size),
                |image| black_box(generate_mipmaps(image, ResampleFilter::Bilinear)),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_queue_push_pop(c: &mut Criterion) {
    c.bench_function("blocking_queue_push_then_try_pop", |b| {
        let queue: BlockingQueue<u64> = BlockingQueue::new();
        b.iter(|| {
            queue.push(1);
            queue.try_pop()
        });
    });
}

#[cfg(not(windows))]
fn profiled() -> Criterion {
    Criterion::default().with_profiler(pprof::criterion::PProfProfiler::new(100, pprof::criterion::Output::Flamegraph(None)))
}

#[cfg(windows)]
fn profiled() -> Criterion {
    Criterion::default()
}

criterion_group! {
    name = benches;
    config = profiled();
    targets = bench_mipmap_generation, bench_queue_push_pop
}
criterion_main!(benches);
