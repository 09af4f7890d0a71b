use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use vidnoise_denoise::{
    denoise_sequence, denoise_sequence_with, ExecutionStrategy, SequenceDenoiseConfig,
    TemporalWienerDenoiser,
};
use vidnoise_tensor::{CachingAllocator, CpuAllocator, Tensor4, Tensor5};

fn bench_denoise_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("DenoiseSequence");

    for (width, height) in [(64, 64), (128, 128), (256, 224)].iter() {
        let (batch_size, time, window_size) = (2, 15, 5);
        group.throughput(criterion::Throughput::Elements(
            (batch_size * (time - window_size + 1) * width * height) as u64,
        ));

        let parameter_string = format!("{}x{}", width, height);
        let shape = [batch_size, time, 3, *height, *width];
        let denoiser = TemporalWienerDenoiser::new(window_size);

        let batch = Tensor5::from_shape_val(shape, 0.5f32, CpuAllocator).unwrap();
        let noise_map =
            Tensor4::from_shape_val([batch_size, 1, *height, *width], 0.1f32, CpuAllocator)
                .unwrap();

        group.bench_with_input(
            BenchmarkId::new("serial", &parameter_string),
            &(&batch, &noise_map),
            |b, i| b.iter(|| denoise_sequence(black_box(i.0), black_box(i.1), &denoiser)),
        );

        let config = SequenceDenoiseConfig {
            stride: 1,
            strategy: ExecutionStrategy::Parallel,
        };
        group.bench_with_input(
            BenchmarkId::new("parallel", &parameter_string),
            &(&batch, &noise_map),
            |b, i| {
                b.iter(|| {
                    denoise_sequence_with(black_box(i.0), black_box(i.1), &denoiser, &config)
                })
            },
        );

        let alloc = CachingAllocator::new();
        let cached_batch = Tensor5::from_shape_val(shape, 0.5f32, alloc.clone()).unwrap();
        let cached_noise_map =
            Tensor4::from_shape_val([batch_size, 1, *height, *width], 0.1f32, alloc).unwrap();

        group.bench_with_input(
            BenchmarkId::new("serial_caching", &parameter_string),
            &(&cached_batch, &cached_noise_map),
            |b, i| b.iter(|| denoise_sequence(black_box(i.0), black_box(i.1), &denoiser)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_denoise_sequence);
criterion_main!(benches);
