//! 各層類型的 ROI 組合策略

use roi_core::{DirtyRegionSet, KernelParams, LayerKind, OverlapTest, Result, RoiError};
use serde::Serialize;

use crate::transform::KernelTransform;

/// 單層的 ROI 輸出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoiOutput {
    /// 各輸出 blob 的變動區域
    pub tops: Vec<DirtyRegionSet>,

    /// 各輸出 blob 交給下游的填充後區域
    pub padded: Vec<DirtyRegionSet>,
}

impl RoiOutput {
    /// 每個輸出都是同一集合的獨立副本
    fn replicate(top: &DirtyRegionSet, padded: &DirtyRegionSet, top_count: usize) -> Self {
        Self {
            tops: vec![top.clone(); top_count],
            padded: vec![padded.clone(); top_count],
        }
    }
}

/// ROI 組合策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiCombinator {
    /// 直通/分流：每個輸出複製唯一輸入
    Passthrough,
    /// 卷積/池化：下游收縮、上游擴張、正規化
    Downsample {
        params: KernelParams,
        overlap: OverlapTest,
    },
    /// 多輸入合併：逐索引取外接矩形
    Union,
}

impl RoiCombinator {
    /// 依層類型選擇策略
    pub fn for_kind(kind: &LayerKind, overlap_override: Option<OverlapTest>) -> Self {
        match kind {
            LayerKind::Convolution(params) | LayerKind::Pooling(params) => {
                RoiCombinator::Downsample {
                    params: *params,
                    overlap: overlap_override.unwrap_or_else(|| kind.default_overlap_test()),
                }
            }
            LayerKind::Split | LayerKind::Activation => RoiCombinator::Passthrough,
            LayerKind::Concat | LayerKind::Eltwise => RoiCombinator::Union,
        }
    }

    /// 由輸入的填充後區域產生此層的輸出區域
    pub fn forward_roi(
        &self,
        layer: &str,
        bottoms: &[DirtyRegionSet],
        top_count: usize,
    ) -> Result<RoiOutput> {
        match self {
            RoiCombinator::Passthrough => {
                let input = single_input(layer, bottoms)?;
                Ok(RoiOutput::replicate(input, input, top_count))
            }
            RoiCombinator::Downsample { params, overlap } => {
                let input = single_input(layer, bottoms)?;
                let (top, padded) = downsample(input, params, *overlap);
                Ok(RoiOutput::replicate(&top, &padded, top_count))
            }
            RoiCombinator::Union => {
                if bottoms.is_empty() {
                    return Err(RoiError::InputArity {
                        layer: layer.to_string(),
                        expected: "至少 1".to_string(),
                        found: 0,
                    });
                }
                let merged = union_of_bounds(bottoms)?;
                Ok(RoiOutput::replicate(&merged, &merged, top_count))
            }
        }
    }
}

fn single_input<'a>(layer: &str, bottoms: &'a [DirtyRegionSet]) -> Result<&'a DirtyRegionSet> {
    match bottoms {
        [input] => Ok(input),
        _ => Err(RoiError::InputArity {
            layer: layer.to_string(),
            expected: "1".to_string(),
            found: bottoms.len(),
        }),
    }
}

/// 卷積/池化的 ROI：回傳（輸出區域, 正規化後的填充區域）
pub fn downsample(
    input: &DirtyRegionSet,
    params: &KernelParams,
    overlap: OverlapTest,
) -> (DirtyRegionSet, DirtyRegionSet) {
    let top = KernelTransform::forward_through_kernel(input, params);
    let padded = KernelTransform::expand_for_padding(&top, params).normalized_with(overlap);

    tracing::debug!(
        "下採樣 ROI: 輸入 {} 個矩形 (尺寸 {}x{}) → 輸出 {} 個，填充後 {} 個",
        input.size(),
        input.extent.width,
        input.extent.height,
        top.size(),
        padded.size()
    );

    (top, padded)
}

/// 多輸入串流的逐索引外接矩形
///
/// 沒有矩形的串流視為無額外變動。所有次要串流皆無矩形時直接沿用主串流。
pub fn union_of_bounds(bottoms: &[DirtyRegionSet]) -> Result<DirtyRegionSet> {
    let Some(primary) = bottoms.first() else {
        return Ok(DirtyRegionSet::default());
    };

    let mut streams: Vec<(usize, &DirtyRegionSet)> = bottoms
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, set)| !set.is_empty())
        .collect();

    if streams.is_empty() {
        return Ok(primary.clone());
    }
    if !primary.is_empty() {
        streams.insert(0, (0, primary));
    }

    let expected = streams[0].1.size();
    for (stream, set) in &streams {
        if set.size() != expected {
            return Err(RoiError::StreamLengthMismatch {
                stream: *stream,
                expected,
                found: set.size(),
            });
        }
    }

    let mut merged = DirtyRegionSet::new(primary.extent);
    merged.set_offset(primary.x_offset, primary.y_offset);
    for i in 0..expected {
        let first = streams[0].1.rects[i];
        let bounds = streams
            .iter()
            .skip(1)
            .fold(first, |acc, (_, set)| acc.merge(&set.rects[i]));
        merged.rects.push(bounds);
    }

    Ok(merged)
}
