//! 連續影格增量推理示例
//!
//! 以兩張合成影格的逐塊差異作為輸入變動區域，展示 ROI 傳播與緩存決策。
//!
//! 執行：`RUST_LOG=debug cargo run --example frame_diff`

use anyhow::Context;
use cnncache::prelude::*;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

const FRAME_SIZE: usize = 64;
const BLOCK: usize = 8;

const NETWORK: &str = r#"{
    "inputs": [0],
    "layers": [
        { "name": "conv1", "kind": { "type": "Convolution", "params": {
            "kernel_w": 3, "kernel_h": 3, "stride_w": 1, "stride_h": 1,
            "padding": { "Same": { "pad_w": 1, "pad_h": 1 } } } },
          "bottoms": [0], "tops": [1] },
        { "name": "relu1", "kind": { "type": "Activation" }, "bottoms": [1], "tops": [2] },
        { "name": "pool1", "kind": { "type": "Pooling", "params": {
            "kernel_w": 2, "kernel_h": 2, "stride_w": 2, "stride_h": 2,
            "padding": "Valid" } },
          "bottoms": [2], "tops": [3] },
        { "name": "split", "kind": { "type": "Split" }, "bottoms": [3], "tops": [4, 5] },
        { "name": "conv2", "kind": { "type": "Convolution", "params": {
            "kernel_w": 3, "kernel_h": 3, "stride_w": 1, "stride_h": 1,
            "padding": { "Same": { "pad_w": 1, "pad_h": 1 } } } },
          "bottoms": [4], "tops": [6] },
        { "name": "sum", "kind": { "type": "Eltwise" }, "bottoms": [6, 5], "tops": [7] }
    ]
}"#;

/// 只記錄呼叫的執行器
#[derive(Default)]
struct LoggingExecutor {
    recomputed_pixels: usize,
}

impl LayerExecutor for LoggingExecutor {
    fn forward_full(&mut self, layer: &LayerNode) -> Result<()> {
        println!("  [full]   {}", layer.name);
        Ok(())
    }

    fn forward_cached(&mut self, layer: &LayerNode, ctx: &CachedForwardContext<'_>) -> Result<()> {
        let pixels = ctx.top_roi.covered_area() as usize;
        self.recomputed_pixels += pixels;
        println!("  [cached] {} → {} ({} 像素)", layer.name, ctx.top_roi, pixels);
        Ok(())
    }
}

fn synthetic_frame(shift: usize) -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_SIZE * FRAME_SIZE];
    // 一個 6x6 的亮塊，隨 shift 水平移動
    for y in 20..26 {
        for x in (10 + shift)..(16 + shift) {
            frame[y * FRAME_SIZE + x] = 255;
        }
    }
    frame
}

/// 逐塊比較兩張影格，每個有差異的塊成為一個變動矩形
fn diff_regions(prev: &[u8], curr: &[u8]) -> DirtyRegionSet {
    let mut set = DirtyRegionSet::square(FRAME_SIZE as i32);
    for by in (0..FRAME_SIZE).step_by(BLOCK) {
        for bx in (0..FRAME_SIZE).step_by(BLOCK) {
            let changed = (by..by + BLOCK).any(|y| {
                let row = y * FRAME_SIZE;
                prev[row + bx..row + bx + BLOCK] != curr[row + bx..row + bx + BLOCK]
            });
            if changed {
                set.add_rect(
                    bx as i32,
                    by as i32,
                    (bx + BLOCK - 1) as i32,
                    (by + BLOCK - 1) as i32,
                );
            }
        }
    }
    // 相鄰塊合併成較少的矩形
    set.normalize()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== 連續影格增量推理示例 ===\n");

    let graph = NetworkGraph::from_json(NETWORK).context("載入網路描述失敗")?;
    let config = CacheConfig::new().with_skip_ratio_threshold(0.5);
    tracing::info!("網路載入完成: {} 層", graph.layers.len());
    let propagator = RoiPropagator::new(graph, config)?;
    let mut runner = IncrementalRunner::new(propagator);

    let frames: Vec<Vec<u8>> = (0..4).map(|i| synthetic_frame(i * 3)).collect();
    let mut executor = LoggingExecutor::default();

    for (i, pair) in frames.windows(2).enumerate() {
        let input = diff_regions(&pair[0], &pair[1]);
        println!("影格 {} → {}: 輸入變動 {}", i, i + 1, input);

        let report = runner.run(HashMap::from([(0, input)]), &mut executor)?;

        println!(
            "  部分重算 {} 層 / 共 {} 層，警告 {} 條\n",
            report.cached_count(),
            report.layers.len(),
            report.propagation.warnings.len()
        );
    }

    println!("累計部分重算像素: {}", executor.recomputed_pixels);

    let last = diff_regions(&frames[0], &frames[3]);
    let result = runner.propagator().propagate_single(last)?;
    println!("\n首尾影格的 ROI 傳播結果:");
    println!("{}", serde_json::to_string_pretty(&result.warnings)?);
    let mut blobs: Vec<_> = result.blobs.iter().collect();
    blobs.sort_by_key(|(b, _)| **b);
    for (blob, state) in blobs {
        match state.roi() {
            Some(roi) => println!("  blob {}: {}", blob, roi),
            None => println!("  blob {}: 整張變動", blob),
        }
    }

    Ok(())
}
