//! ROI 傳播器

use roi_core::{CacheConfig, DirtyRegionSet, LayerNode, NetworkGraph, Result, RoiError};
use serde::Serialize;
use std::collections::HashMap;

use crate::combinator::{RoiCombinator, RoiOutput};
use crate::{PropagationResult, PropagationWarning};

/// 單一 blob 在本次推理中的變動狀態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BlobRoi {
    /// 部分變動
    Partial {
        /// 輸出區域（未填充）
        roi: DirtyRegionSet,
        /// 交給下游的填充後區域
        padded: DirtyRegionSet,
    },
    /// 整個 blob 視為已變動
    Full,
}

impl BlobRoi {
    /// 網路輸入：區域與填充後區域相同
    pub fn input(set: DirtyRegionSet) -> Self {
        BlobRoi::Partial {
            roi: set.clone(),
            padded: set,
        }
    }

    pub fn roi(&self) -> Option<&DirtyRegionSet> {
        match self {
            BlobRoi::Partial { roi, .. } => Some(roi),
            BlobRoi::Full => None,
        }
    }

    pub fn padded(&self) -> Option<&DirtyRegionSet> {
        match self {
            BlobRoi::Partial { padded, .. } => Some(padded),
            BlobRoi::Full => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, BlobRoi::Full)
    }

    /// 沒有任何變動
    pub fn is_clean(&self) -> bool {
        match self {
            BlobRoi::Partial { padded, .. } => padded.is_empty(),
            BlobRoi::Full => false,
        }
    }
}

/// 單層傳播結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LayerRoiOutcome {
    /// 組合器成功
    Computed(RoiOutput),
    /// 降級為完整重算
    Poisoned(String),
}

/// 單層傳播記錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerRoi {
    /// 層在圖中的索引
    pub layer_index: usize,

    /// 層名稱
    pub name: String,

    /// 各輸入的填充後區域（`forward_cached` 讀取範圍）
    pub bottoms_padded: Vec<DirtyRegionSet>,

    pub outcome: LayerRoiOutcome,
}

impl LayerRoi {
    pub fn is_poisoned(&self) -> bool {
        matches!(self.outcome, LayerRoiOutcome::Poisoned(_))
    }

    pub fn output(&self) -> Option<&RoiOutput> {
        match &self.outcome {
            LayerRoiOutcome::Computed(output) => Some(output),
            LayerRoiOutcome::Poisoned(_) => None,
        }
    }
}

/// ROI 傳播器
pub struct RoiPropagator {
    /// 拓撲排序後的網路圖
    graph: NetworkGraph,

    /// 增量計算配置
    config: CacheConfig,
}

impl RoiPropagator {
    /// 創建新的傳播器
    pub fn new(graph: NetworkGraph, config: CacheConfig) -> Result<Self> {
        graph.validate()?;
        config.validate()?;
        Ok(Self { graph, config })
    }

    /// 單輸入網路的傳播入口
    pub fn propagate_single(&self, input: DirtyRegionSet) -> Result<PropagationResult> {
        let blob = *self
            .graph
            .inputs
            .first()
            .ok_or_else(|| RoiError::InvalidParams("網路沒有輸入 blob".to_string()))?;
        self.propagate(HashMap::from([(blob, input)]))
    }

    /// 主傳播入口
    ///
    /// 依拓撲順序逐層執行組合器。不變量被破壞的層及其所有下游都降級為完整重算。
    pub fn propagate(&self, mut inputs: HashMap<usize, DirtyRegionSet>) -> Result<PropagationResult> {
        tracing::info!(
            "開始 ROI 傳播：輸入 {} 個，層 {} 個",
            inputs.len(),
            self.graph.layers.len()
        );

        let start_time = std::time::Instant::now();
        let mut result = PropagationResult::empty();

        // Step 1: 網路輸入
        tracing::debug!("Step 1: 網路輸入");
        for &blob in &self.graph.inputs {
            let state = match inputs.remove(&blob) {
                Some(set) => self.accept_input(blob, set, &mut result),
                None => {
                    result.add_warning(PropagationWarning::new(
                        format!("input:{}", blob),
                        "未提供變動區域，視為整張變動".to_string(),
                    ));
                    BlobRoi::Full
                }
            };
            result.blobs.insert(blob, state);
        }
        for blob in inputs.keys() {
            tracing::debug!("blob {} 不是網路輸入，忽略", blob);
        }

        // Step 2: 逐層傳播
        tracing::debug!("Step 2: 逐層傳播");
        for (layer_index, layer) in self.graph.layers.iter().enumerate() {
            let layer_roi = self.propagate_layer(layer_index, layer, &mut result)?;
            result.layers.push(layer_roi);
        }

        result.elapsed_us = Some(start_time.elapsed().as_micros());
        tracing::info!(
            "ROI 傳播完成，耗時 {:?}，降級層數 {}",
            start_time.elapsed(),
            result.poisoned_layers().count()
        );

        Ok(result)
    }

    fn accept_input(
        &self,
        blob: usize,
        set: DirtyRegionSet,
        result: &mut PropagationResult,
    ) -> BlobRoi {
        if self.config.validate_regions {
            if let Err(e) = set.validate() {
                result.add_warning(PropagationWarning::new(format!("input:{}", blob), e.to_string()));
                return BlobRoi::Full;
            }
        }
        BlobRoi::input(set)
    }

    fn propagate_layer(
        &self,
        layer_index: usize,
        layer: &LayerNode,
        result: &mut PropagationResult,
    ) -> Result<LayerRoi> {
        tracing::debug!("傳播層 ROI: {} ({})", layer.name, layer.kind.type_name());

        let mut bottoms_padded = Vec::with_capacity(layer.bottoms.len());
        let mut upstream_full = false;
        for &bottom in &layer.bottoms {
            let state = result
                .blobs
                .get(&bottom)
                .ok_or(RoiError::MissingBlob(bottom))?;
            match state.padded() {
                Some(padded) => bottoms_padded.push(padded.clone()),
                None => upstream_full = true,
            }
        }

        if upstream_full {
            tracing::debug!("層 {} 的上游已降級，完整重算", layer.name);
            return Ok(self.poison(layer_index, layer, bottoms_padded, "上游已降級為完整重算", result));
        }

        let combinator = RoiCombinator::for_kind(&layer.kind, self.config.overlap_test);
        let output = match combinator.forward_roi(&layer.name, &bottoms_padded, layer.tops.len()) {
            Ok(output) => output,
            Err(e) if e.is_invariant_violation() => {
                tracing::warn!("層 {} ROI 不變量被破壞: {}", layer.name, e);
                result.add_warning(PropagationWarning::new(layer.name.clone(), e.to_string()));
                return Ok(self.poison(layer_index, layer, bottoms_padded, &e.to_string(), result));
            }
            Err(e) => return Err(e),
        };

        if self.config.validate_regions {
            if let Err(e) = validate_output(&output) {
                tracing::warn!("層 {} 輸出區域越界: {}", layer.name, e);
                result.add_warning(PropagationWarning::new(layer.name.clone(), e.to_string()));
                return Ok(self.poison(layer_index, layer, bottoms_padded, &e.to_string(), result));
            }
        }

        for (i, &top) in layer.tops.iter().enumerate() {
            result.blobs.insert(
                top,
                BlobRoi::Partial {
                    roi: output.tops[i].clone(),
                    padded: output.padded[i].clone(),
                },
            );
        }

        Ok(LayerRoi {
            layer_index,
            name: layer.name.clone(),
            bottoms_padded,
            outcome: LayerRoiOutcome::Computed(output),
        })
    }

    fn poison(
        &self,
        layer_index: usize,
        layer: &LayerNode,
        bottoms_padded: Vec<DirtyRegionSet>,
        reason: &str,
        result: &mut PropagationResult,
    ) -> LayerRoi {
        for &top in &layer.tops {
            result.blobs.insert(top, BlobRoi::Full);
        }
        LayerRoi {
            layer_index,
            name: layer.name.clone(),
            bottoms_padded,
            outcome: LayerRoiOutcome::Poisoned(reason.to_string()),
        }
    }

    /// 獲取網路圖引用
    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    /// 獲取配置引用
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

fn validate_output(output: &RoiOutput) -> Result<()> {
    for set in output.tops.iter().chain(output.padded.iter()) {
        set.validate()?;
    }
    Ok(())
}
