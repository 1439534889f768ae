//! Benchmarks for the partitioned block convolver.

use criterion::{Criterion, criterion_group, criterion_main};
use resona_core::{BlockConvolver, ConvContext, Filter};
use std::hint::black_box;
use std::sync::Arc;

fn noise(len: usize) -> Vec<f32> {
    // Deterministic pseudo-noise, no RNG dependency needed.
    (0..len)
        .map(|i| ((i * 2654435761) % 10007) as f32 / 5003.5 - 1.0)
        .collect()
}

fn bench_filter_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_block");

    for (block, ir_len) in [(256, 4096), (512, 24000), (1024, 96000)] {
        let ctx = Arc::new(ConvContext::new(block));
        let filter = Arc::new(Filter::new(&ctx, &noise(ir_len)));
        let mut conv = BlockConvolver::new(Arc::clone(&ctx), filter.partitions());
        conv.set_filter(&filter).unwrap();

        let input = noise(block);
        let mut output = vec![0.0f32; block];

        group.bench_function(format!("block{block}_ir{ir_len}"), |b| {
            b.iter(|| {
                conv.filter_block(black_box(&input), &mut output);
                black_box(output[0])
            })
        });
    }

    group.finish();
}

fn bench_crossfade_block(c: &mut Criterion) {
    let block = 512;
    let ctx = Arc::new(ConvContext::new(block));
    let a = Arc::new(Filter::new(&ctx, &noise(24000)));
    let b_filter = Arc::new(Filter::new(&ctx, &noise(24000)));
    let mut conv = BlockConvolver::new(Arc::clone(&ctx), a.partitions());
    conv.set_filter(&a).unwrap();

    let input = noise(block);
    let mut output = vec![0.0f32; block];
    let mut flip = false;

    c.bench_function("crossfade_block512_ir24000", |b| {
        b.iter(|| {
            let next = if flip { &a } else { &b_filter };
            flip = !flip;
            conv.crossfade_filter(next).unwrap();
            conv.filter_block(black_box(&input), &mut output);
            black_box(output[0])
        })
    });
}

criterion_group!(benches, bench_filter_block, bench_crossfade_block);
criterion_main!(benches);
