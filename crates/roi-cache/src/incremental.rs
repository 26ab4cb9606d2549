//! 增量推理執行器

use roi_calc::{LayerRoi, PropagationResult, RoiPropagator};
use roi_core::{DirtyRegionSet, LayerNode, Result};
use serde::Serialize;
use std::collections::HashMap;

use crate::decision::{CacheDecision, CachePolicy, ChangeMap};
use crate::dirty_tracking::DirtyTracker;

/// 緩存前向所需的區域
#[derive(Debug, Clone, Copy)]
pub struct CachedForwardContext<'a> {
    /// 輸入的填充後區域（需讀取的範圍）
    pub bottom_padded: &'a DirtyRegionSet,
    /// 輸出區域（需重寫的範圍）
    pub top_roi: &'a DirtyRegionSet,
    /// 輸出的填充後區域
    pub top_padded: &'a DirtyRegionSet,
}

/// 數值核與張量的外部實作
///
/// 執行器擁有上一次推理的緩存輸出與暫存空間。`forward_cached` 只在區域內重算並原地
/// 更新緩存輸出；失敗時（例如配置記憶體失敗）回傳錯誤，該層會改走 `forward_full`。
pub trait LayerExecutor {
    /// 完整前向
    fn forward_full(&mut self, layer: &LayerNode) -> Result<()>;

    /// 部分重算前向
    fn forward_cached(&mut self, layer: &LayerNode, ctx: &CachedForwardContext<'_>) -> Result<()>;
}

/// 完整重算的原因
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FullReason {
    /// 配置停用緩存
    CacheDisabled,
    /// 層類型不執行部分重算
    NotCacheAware,
    /// 上游已降級
    UpstreamPoisoned,
    /// 變動比例超過門檻
    SkipThreshold { ratio: f64 },
    /// 緩存前向失敗
    CachedForwardFailed(String),
}

/// 單層執行方式
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LayerAction {
    /// 部分重算
    Cached { ratio: f64 },
    /// 完整重算
    Full(FullReason),
    /// 所有輸入皆無變動，沿用上一次的輸出
    Unchanged,
}

impl LayerAction {
    pub fn is_cached(&self) -> bool {
        matches!(self, LayerAction::Cached { .. })
    }
}

enum Plan {
    Cached(f64),
    Full(FullReason),
    Unchanged,
}

/// 單層執行記錄
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub name: String,
    pub action: LayerAction,
}

/// 單次推理報告
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// 各層執行記錄（拓撲順序）
    pub layers: Vec<LayerReport>,

    /// ROI 傳播結果
    pub propagation: PropagationResult,

    /// 因緩存前向失敗而降級的 blob
    pub dirty_blobs: Vec<usize>,
}

impl PassReport {
    /// 部分重算的層數
    pub fn cached_count(&self) -> usize {
        self.layers.iter().filter(|l| l.action.is_cached()).count()
    }

    /// 依名稱查詢層的執行方式
    pub fn action(&self, name: &str) -> Option<&LayerAction> {
        self.layers.iter().find(|l| l.name == name).map(|l| &l.action)
    }
}

/// 增量推理執行器
pub struct IncrementalRunner {
    propagator: RoiPropagator,
    policy: CachePolicy,
    tracker: DirtyTracker,
}

impl IncrementalRunner {
    /// 創建新的執行器（決策門檻取自傳播器的配置）
    pub fn new(propagator: RoiPropagator) -> Self {
        let policy = CachePolicy::from_config(propagator.config());
        Self::with_policy(propagator, policy)
    }

    /// 使用自訂決策策略
    pub fn with_policy(propagator: RoiPropagator, policy: CachePolicy) -> Self {
        Self {
            propagator,
            policy,
            tracker: DirtyTracker::new(),
        }
    }

    /// 執行一次推理
    pub fn run<E: LayerExecutor>(
        &mut self,
        inputs: HashMap<usize, DirtyRegionSet>,
        executor: &mut E,
    ) -> Result<PassReport> {
        tracing::info!("開始增量推理");
        let start_time = std::time::Instant::now();
        self.tracker.clear();

        // Step 1: ROI 傳播
        tracing::debug!("Step 1: ROI 傳播");
        let propagation = self.propagator.propagate(inputs)?;

        // Step 2: 緩存決策
        tracing::debug!("Step 2: 緩存決策");
        let decisions = self.evaluate_decisions(&propagation);

        // Step 3: 逐層執行
        tracing::debug!("Step 3: 逐層執行");
        let enabled = self.propagator.config().enabled;
        let mut layers = Vec::with_capacity(propagation.layers.len());
        for (layer, layer_roi) in self.propagator.graph().layers.iter().zip(&propagation.layers) {
            let upstream_dirty = self.tracker.any_dirty(&layer.bottoms);

            let plan = if !enabled {
                Plan::Full(FullReason::CacheDisabled)
            } else if !upstream_dirty && is_unchanged(layer, layer_roi) {
                Plan::Unchanged
            } else if !layer.needs_cache() {
                Plan::Full(FullReason::NotCacheAware)
            } else if upstream_dirty || layer_roi.is_poisoned() {
                Plan::Full(FullReason::UpstreamPoisoned)
            } else {
                match decisions.get(&layer_roi.layer_index) {
                    Some(CacheDecision::Reuse { ratio }) => Plan::Cached(*ratio),
                    Some(CacheDecision::Recompute { ratio }) => {
                        Plan::Full(FullReason::SkipThreshold { ratio: *ratio })
                    }
                    None => Plan::Full(FullReason::NotCacheAware),
                }
            };

            let action = match plan {
                Plan::Cached(ratio) => {
                    Self::run_cached(layer, layer_roi, ratio, executor, &mut self.tracker)?
                }
                Plan::Full(reason) => {
                    tracing::debug!("層 {} 完整重算: {:?}", layer.name, reason);
                    executor.forward_full(layer)?;
                    LayerAction::Full(reason)
                }
                Plan::Unchanged => {
                    tracing::debug!("層 {} 輸入無變動，沿用緩存輸出", layer.name);
                    LayerAction::Unchanged
                }
            };

            if upstream_dirty {
                self.tracker.mark_all(&layer.tops);
            }
            layers.push(LayerReport {
                name: layer.name.clone(),
                action,
            });
        }

        let report = PassReport {
            layers,
            propagation,
            dirty_blobs: self.tracker.get_dirty_blobs(),
        };

        tracing::info!(
            "增量推理完成，耗時 {:?}，部分重算 {} 層 / 共 {} 層",
            start_time.elapsed(),
            report.cached_count(),
            report.layers.len()
        );

        Ok(report)
    }

    /// 對所有可部分重算的層評估決策
    fn evaluate_decisions(&self, propagation: &PropagationResult) -> HashMap<usize, CacheDecision> {
        let graph = self.propagator.graph();
        let candidates: Vec<(usize, ChangeMap)> = propagation
            .layers
            .iter()
            .filter(|l| graph.layers[l.layer_index].needs_cache())
            .filter_map(|l| {
                let top = l.output()?.tops.first()?;
                Some((l.layer_index, ChangeMap::from_region(top)))
            })
            .collect();

        let maps: Vec<ChangeMap> = candidates.iter().map(|(_, m)| m.clone()).collect();
        let decisions = self.policy.decide_all(&maps);

        candidates
            .into_iter()
            .map(|(index, _)| index)
            .zip(decisions)
            .collect()
    }

    fn run_cached<E: LayerExecutor>(
        layer: &LayerNode,
        layer_roi: &LayerRoi,
        ratio: f64,
        executor: &mut E,
        tracker: &mut DirtyTracker,
    ) -> Result<LayerAction> {
        let (Some(output), Some(bottom_padded)) = (layer_roi.output(), layer_roi.bottoms_padded.first())
        else {
            executor.forward_full(layer)?;
            return Ok(LayerAction::Full(FullReason::NotCacheAware));
        };

        let ctx = CachedForwardContext {
            bottom_padded,
            top_roi: &output.tops[0],
            top_padded: &output.padded[0],
        };

        match executor.forward_cached(layer, &ctx) {
            Ok(()) => {
                tracing::debug!("層 {} 部分重算，變動比例 {:.3}", layer.name, ratio);
                Ok(LayerAction::Cached { ratio })
            }
            Err(e) => {
                tracing::warn!("層 {} 緩存前向失敗，改為完整重算: {}", layer.name, e);
                executor.forward_full(layer)?;
                tracker.mark_all(&layer.tops);
                Ok(LayerAction::Full(FullReason::CachedForwardFailed(e.to_string())))
            }
        }
    }

    pub fn propagator(&self) -> &RoiPropagator {
        &self.propagator
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }
}

// 未降級、且每個輸入的填充後區域都是空集合
fn is_unchanged(layer: &LayerNode, layer_roi: &LayerRoi) -> bool {
    !layer_roi.is_poisoned()
        && !layer.bottoms.is_empty()
        && layer_roi.bottoms_padded.len() == layer.bottoms.len()
        && layer_roi.bottoms_padded.iter().all(DirtyRegionSet::is_empty)
}
