use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{thread_rng, Rng};
use roi_calc::RoiPropagator;
use roi_core::{
    normalize_rects, CacheConfig, DirtyRegionSet, KernelParams, LayerKind, LayerNode,
    NetworkGraph, OverlapTest, Rect,
};
use std::iter::repeat_with;

const LAYERSIZE: i32 = 224;

fn random_rects(rng: &mut impl Rng, count: usize) -> Vec<Rect> {
    repeat_with(|| {
        let x1 = rng.gen_range(0..LAYERSIZE - 8);
        let y1 = rng.gen_range(0..LAYERSIZE - 8);
        Rect::new(x1, y1, x1 + rng.gen_range(0..8), y1 + rng.gen_range(0..8))
    })
    .take(count)
    .collect()
}

fn normalize(c: &mut Criterion) {
    let mut rng = thread_rng();

    let mut group = c.benchmark_group("normalize_rects");
    for &count in [8usize, 32, 128].iter() {
        let rects = random_rects(&mut rng, count);
        group.throughput(Throughput::Elements(count as u64));
        for test in [OverlapTest::CornerContainment, OverlapTest::Intersection] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", test), count),
                &rects,
                |b, rects| b.iter(|| normalize_rects(rects, test)),
            );
        }
    }
    group.finish();
}

fn propagate_chain(c: &mut Criterion) {
    let mut rng = thread_rng();

    // conv/pool 交錯的單鏈網路
    let mut graph = NetworkGraph::new(vec![0]);
    for i in 0..8 {
        let kind = if i % 2 == 0 {
            LayerKind::Convolution(KernelParams::same(3, 1, 1))
        } else {
            LayerKind::Pooling(KernelParams::valid(2, 2))
        };
        graph = graph.with_layer(
            LayerNode::new(format!("layer{}", i), kind)
                .with_bottoms(vec![i])
                .with_tops(vec![i + 1]),
        );
    }
    let propagator = RoiPropagator::new(graph, CacheConfig::default()).unwrap();

    let mut group = c.benchmark_group("propagate_chain");
    for &count in [1usize, 16, 64].iter() {
        let mut input = DirtyRegionSet::square(LAYERSIZE);
        input.rects = random_rects(&mut rng, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| propagator.propagate_single(input.clone()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, normalize, propagate_chain);
criterion_main!(benches);
