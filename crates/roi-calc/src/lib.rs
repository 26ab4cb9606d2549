//! # ROI Calculation Engine
//!
//! 變動區域傳播引擎

pub mod combinator;
pub mod propagator;
pub mod transform;

// Re-export 主要類型
pub use combinator::{RoiCombinator, RoiOutput};
pub use propagator::{BlobRoi, LayerRoi, LayerRoiOutcome, RoiPropagator};
pub use transform::KernelTransform;

use serde::Serialize;
use std::collections::HashMap;

/// ROI 傳播結果
#[derive(Debug, Clone, Serialize)]
pub struct PropagationResult {
    /// 各 blob 的變動狀態
    pub blobs: HashMap<usize, BlobRoi>,

    /// 各層傳播記錄（拓撲順序）
    pub layers: Vec<LayerRoi>,

    /// 警告信息
    pub warnings: Vec<PropagationWarning>,

    /// 傳播耗時（微秒）
    pub elapsed_us: Option<u128>,
}

impl PropagationResult {
    /// 創建空的傳播結果
    pub fn empty() -> Self {
        Self {
            blobs: HashMap::new(),
            layers: Vec::new(),
            warnings: Vec::new(),
            elapsed_us: None,
        }
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: PropagationWarning) {
        self.warnings.push(warning);
    }

    /// 降級為完整重算的層
    pub fn poisoned_layers(&self) -> impl Iterator<Item = &LayerRoi> {
        self.layers.iter().filter(|l| l.is_poisoned())
    }

    /// 獲取 blob 狀態
    pub fn blob(&self, index: usize) -> Option<&BlobRoi> {
        self.blobs.get(&index)
    }
}

/// 傳播警告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationWarning {
    /// 層名稱或輸入 blob 標記
    pub layer: String,
    pub message: String,
}

impl PropagationWarning {
    pub fn new(layer: String, message: String) -> Self {
        Self { layer, message }
    }
}
