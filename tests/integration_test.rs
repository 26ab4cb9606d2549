//! 集成測試

use cnncache::prelude::*;
use roi_calc::LayerRoiOutcome;
use roi_core::OverlapTest;
use rstest::rstest;
use std::collections::HashMap;

/// conv1 → pool1 → split → (conv2, relu) → sum
fn branch_network() -> NetworkGraph {
    NetworkGraph::new(vec![0])
        .with_layer(
            LayerNode::new("conv1", LayerKind::Convolution(KernelParams::same(3, 1, 1)))
                .with_bottoms(vec![0])
                .with_tops(vec![1]),
        )
        .with_layer(
            LayerNode::new("pool1", LayerKind::Pooling(KernelParams::valid(2, 2)))
                .with_bottoms(vec![1])
                .with_tops(vec![2]),
        )
        .with_layer(
            LayerNode::new("split", LayerKind::Split)
                .with_bottoms(vec![2])
                .with_tops(vec![3, 4]),
        )
        .with_layer(
            LayerNode::new("conv2", LayerKind::Convolution(KernelParams::same(3, 1, 1)))
                .with_bottoms(vec![3])
                .with_tops(vec![5]),
        )
        .with_layer(
            LayerNode::new("relu", LayerKind::Activation)
                .with_bottoms(vec![4])
                .with_tops(vec![6]),
        )
        .with_layer(
            LayerNode::new("sum", LayerKind::Eltwise)
                .with_bottoms(vec![5, 6])
                .with_tops(vec![7]),
        )
}

fn roi_of(result: &PropagationResult, blob: usize) -> (Vec<Rect>, Vec<Rect>) {
    let state = result.blob(blob).unwrap();
    (
        state.roi().unwrap().rects().to_vec(),
        state.padded().unwrap().rects().to_vec(),
    )
}

#[derive(Default)]
struct RecordingExecutor {
    fail_cached: Vec<String>,
    full: Vec<String>,
    cached: Vec<String>,
}

impl LayerExecutor for RecordingExecutor {
    fn forward_full(&mut self, layer: &LayerNode) -> Result<()> {
        self.full.push(layer.name.clone());
        Ok(())
    }

    fn forward_cached(&mut self, layer: &LayerNode, ctx: &CachedForwardContext<'_>) -> Result<()> {
        if self.fail_cached.contains(&layer.name) {
            return Err(RoiError::Executor(format!("{} 暫存空間不足", layer.name)));
        }
        assert_eq!(ctx.top_roi.size(), ctx.top_padded.size());
        self.cached.push(layer.name.clone());
        Ok(())
    }
}

#[test]
fn test_branch_network_propagation() {
    // 32x32 輸入，單一變動 (4,4,5,5)
    let propagator = RoiPropagator::new(branch_network(), CacheConfig::default()).unwrap();
    let input = DirtyRegionSet::square(32).with_rect(4, 4, 5, 5);

    let result = propagator.propagate_single(input).unwrap();

    println!("Warnings: {:?}", result.warnings);
    assert!(result.warnings.is_empty());
    assert_eq!(result.poisoned_layers().count(), 0);

    // conv1: 感受野 3x3 → (3,3,6,6)，擴張 2 後 (1,1,8,8)
    assert_eq!(
        roi_of(&result, 1),
        (vec![Rect::new(3, 3, 6, 6)], vec![Rect::new(1, 1, 8, 8)])
    );

    // pool1 (VALID 2x2/2): 輸入 1..8 影響輸出 0..4，無填充故不擴張
    let pool = result.blob(2).unwrap().roi().unwrap();
    assert_eq!(pool.extent, Extent::square(16));
    assert_eq!(pool.rects(), &[Rect::new(0, 0, 4, 4)]);
    assert_eq!(result.blob(2).unwrap().padded().unwrap().rects(), &[Rect::new(0, 0, 4, 4)]);

    // split 兩個輸出相同
    assert_eq!(result.blob(3), result.blob(2));
    assert_eq!(result.blob(4), result.blob(2));

    assert_eq!(
        roi_of(&result, 5),
        (vec![Rect::new(0, 0, 5, 5)], vec![Rect::new(0, 0, 7, 7)])
    );
    assert_eq!(roi_of(&result, 6).0, vec![Rect::new(0, 0, 4, 4)]);

    // sum: 兩分支填充後區域的外接矩形
    assert_eq!(
        roi_of(&result, 7),
        (vec![Rect::new(0, 0, 7, 7)], vec![Rect::new(0, 0, 7, 7)])
    );
    assert_eq!(result.blob(7).unwrap().roi().unwrap().extent, Extent::square(16));
}

#[test]
fn test_network_from_json() {
    let json = r#"{
        "inputs": [0],
        "layers": [
            {
                "name": "conv1",
                "kind": {
                    "type": "Convolution",
                    "params": {
                        "kernel_w": 3, "kernel_h": 3,
                        "stride_w": 1, "stride_h": 1,
                        "padding": { "Same": { "pad_w": 1, "pad_h": 1 } }
                    }
                },
                "bottoms": [0],
                "tops": [1]
            },
            {
                "name": "pool1",
                "kind": {
                    "type": "Pooling",
                    "params": {
                        "kernel_w": 2, "kernel_h": 2,
                        "stride_w": 2, "stride_h": 2,
                        "padding": "Valid"
                    }
                },
                "bottoms": [1],
                "tops": [2]
            }
        ]
    }"#;

    let graph = NetworkGraph::from_json(json).unwrap();
    assert_eq!(graph.layers.len(), 2);
    assert_eq!(graph.layers[1].kind, LayerKind::Pooling(KernelParams::valid(2, 2)));

    let propagator = RoiPropagator::new(graph, CacheConfig::default()).unwrap();
    let result = propagator
        .propagate_single(DirtyRegionSet::square(32).with_rect(4, 4, 5, 5))
        .unwrap();
    assert_eq!(roi_of(&result, 2).0, vec![Rect::new(0, 0, 4, 4)]);

    // 傳播結果可序列化輸出
    let dumped = serde_json::to_string(&result).unwrap();
    assert!(dumped.contains("pool1"));
}

#[test]
fn test_offsets_follow_stride() {
    let graph = NetworkGraph::new(vec![0]).with_layer(
        LayerNode::new("pool", LayerKind::Pooling(KernelParams::valid(2, 2)))
            .with_bottoms(vec![0])
            .with_tops(vec![1]),
    );
    let propagator = RoiPropagator::new(graph, CacheConfig::default()).unwrap();
    let input = DirtyRegionSet::new(Extent::new(16, 8))
        .with_offset(4, 2)
        .with_rect(8, 2, 9, 3);

    let result = propagator.propagate_single(input).unwrap();
    let roi = result.blob(1).unwrap().roi().unwrap();

    assert_eq!(roi.offset(), (2, 1));
    assert_eq!(roi.extent, Extent::new(8, 4));
    assert_eq!(roi.rects(), &[Rect::new(4, 1, 4, 1)]);
}

#[test]
fn test_stream_mismatch_fails_open() {
    // 兩個輸入的事件數不同，concat 無法逐索引合併
    let graph = NetworkGraph::new(vec![0, 1])
        .with_layer(
            LayerNode::new("concat", LayerKind::Concat)
                .with_bottoms(vec![0, 1])
                .with_tops(vec![2]),
        )
        .with_layer(
            LayerNode::new("conv", LayerKind::Convolution(KernelParams::same(3, 1, 1)))
                .with_bottoms(vec![2])
                .with_tops(vec![3]),
        );
    let propagator = RoiPropagator::new(graph, CacheConfig::default()).unwrap();
    let inputs = HashMap::from([
        (0, DirtyRegionSet::square(16).with_rect(0, 0, 1, 1)),
        (
            1,
            DirtyRegionSet::square(16)
                .with_rect(0, 0, 1, 1)
                .with_rect(8, 8, 9, 9),
        ),
    ]);

    let result = propagator.propagate(inputs).unwrap();

    assert_eq!(result.poisoned_layers().count(), 2);
    assert!(result.blob(2).unwrap().is_full());
    assert!(result.blob(3).unwrap().is_full());
    assert!(result.warnings.iter().any(|w| w.layer == "concat"));
}

#[test]
fn test_concat_with_silent_branch() {
    let graph = NetworkGraph::new(vec![0, 1]).with_layer(
        LayerNode::new("concat", LayerKind::Concat)
            .with_bottoms(vec![0, 1])
            .with_tops(vec![2]),
    );
    let propagator = RoiPropagator::new(graph, CacheConfig::default()).unwrap();
    let changed = DirtyRegionSet::square(16)
        .with_rect(2, 2, 3, 3)
        .with_rect(9, 9, 10, 10);
    let inputs = HashMap::from([(0, changed.clone()), (1, DirtyRegionSet::square(16))]);

    let result = propagator.propagate(inputs).unwrap();
    assert_eq!(result.blob(2).unwrap().roi(), Some(&changed));
}

#[rstest]
#[case(OverlapTest::CornerContainment)]
#[case(OverlapTest::Intersection)]
fn test_padded_regions_are_normalized(#[case] test: OverlapTest) {
    let graph = NetworkGraph::new(vec![0]).with_layer(
        LayerNode::new("conv", LayerKind::Convolution(KernelParams::same(3, 1, 1)))
            .with_bottoms(vec![0])
            .with_tops(vec![1]),
    );
    let config = CacheConfig::new().with_overlap_test(test);
    let propagator = RoiPropagator::new(graph, config).unwrap();
    let input = DirtyRegionSet::square(32)
        .with_rect(4, 4, 5, 5)
        .with_rect(7, 7, 8, 8)
        .with_rect(25, 25, 26, 26);

    let result = propagator.propagate_single(input).unwrap();
    let padded = result.blob(1).unwrap().padded().unwrap();

    // 前兩個擴張後重疊，第三個保持獨立
    assert_eq!(
        padded.rects(),
        &[Rect::new(1, 1, 11, 11), Rect::new(22, 22, 29, 29)]
    );
    assert_eq!(padded.normalized_with(test), *padded);
    assert_eq!(result.blob(1).unwrap().roi().unwrap().size(), 3);
}

#[test]
fn test_incremental_pass_end_to_end() {
    let propagator = RoiPropagator::new(branch_network(), CacheConfig::default()).unwrap();
    let mut runner = IncrementalRunner::new(propagator);
    let mut executor = RecordingExecutor::default();
    let inputs = HashMap::from([(0, DirtyRegionSet::square(32).with_rect(4, 4, 5, 5))]);

    let report = runner.run(inputs, &mut executor).unwrap();

    assert_eq!(executor.cached, vec!["conv1", "conv2"]);
    assert_eq!(executor.full, vec!["pool1", "split", "relu", "sum"]);
    assert_eq!(report.cached_count(), 2);
    assert!(report.dirty_blobs.is_empty());
    match report.action("conv2") {
        Some(LayerAction::Cached { ratio }) => assert!((ratio - 36.0 / 256.0).abs() < 1e-9),
        other => panic!("conv2 應部分重算，實際為 {:?}", other),
    }
}

#[test]
fn test_incremental_pass_fails_open_on_executor_error() {
    let propagator = RoiPropagator::new(branch_network(), CacheConfig::default()).unwrap();
    let mut runner = IncrementalRunner::new(propagator);
    let mut executor = RecordingExecutor {
        fail_cached: vec!["conv2".to_string()],
        ..Default::default()
    };
    let inputs = HashMap::from([(0, DirtyRegionSet::square(32).with_rect(4, 4, 5, 5))]);

    let report = runner.run(inputs, &mut executor).unwrap();

    assert_eq!(executor.cached, vec!["conv1"]);
    assert!(executor.full.contains(&"conv2".to_string()));
    // conv2 的輸出與其下游 sum 的輸出都被標記
    assert_eq!(report.dirty_blobs, vec![5, 7]);
}

#[test]
fn test_incremental_pass_with_strict_threshold() {
    let config = CacheConfig::new().with_skip_ratio_threshold(0.1);
    let propagator = RoiPropagator::new(branch_network(), config).unwrap();
    let mut runner = IncrementalRunner::new(propagator);
    let mut executor = RecordingExecutor::default();
    let inputs = HashMap::from([(0, DirtyRegionSet::square(32).with_rect(4, 4, 5, 5))]);

    let report = runner.run(inputs, &mut executor).unwrap();

    // conv1 變動 16/1024 低於門檻，conv2 變動 36/256 超過門檻
    assert_eq!(executor.cached, vec!["conv1"]);
    assert!(matches!(
        report.action("conv2"),
        Some(LayerAction::Full(roi_cache::FullReason::SkipThreshold { .. }))
    ));
}

#[test]
fn test_invalid_input_region_is_full() {
    let propagator = RoiPropagator::new(branch_network(), CacheConfig::default()).unwrap();
    let input = DirtyRegionSet::square(32).with_rect(30, 30, 40, 40);

    let result = propagator.propagate_single(input).unwrap();

    assert!(result.blob(0).unwrap().is_full());
    assert!(result
        .layers
        .iter()
        .all(|l| matches!(l.outcome, LayerRoiOutcome::Poisoned(_))));
    assert_eq!(result.warnings.len(), 1);
}
