//! # ROI Core
//!
//! 變動區域資料模型與類型定義

pub mod config;
pub mod layer;
pub mod rect;
pub mod region;

// Re-export 主要類型
pub use config::{CacheConfig, OverlapTest, DEFAULT_SKIP_RATIO};
pub use layer::{AxisGeometry, KernelParams, LayerKind, LayerNode, NetworkGraph, PaddingMode};
pub use rect::Rect;
pub use region::{normalize_rects, Axis, DirtyRegionSet, Extent};

/// ROI 錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum RoiError {
    #[error("ROI 串流長度不一致: 串流 {stream} 有 {found} 個矩形，預期 {expected} 個")]
    StreamLengthMismatch {
        stream: usize,
        expected: usize,
        found: usize,
    },

    #[error("座標超出範圍: {axis} = {value}，有效範圍 [0, {limit})")]
    OutOfBounds { axis: Axis, value: i32, limit: i32 },

    #[error("無效的矩形: {0}")]
    InvalidRect(Rect),

    #[error("層 {layer} 的輸入數量錯誤: 預期 {expected}，實際 {found}")]
    InputArity {
        layer: String,
        expected: String,
        found: usize,
    },

    #[error("找不到 blob: {0}")]
    MissingBlob(usize),

    #[error("層參數無效: {0}")]
    InvalidParams(String),

    #[error("配置錯誤: {0}")]
    Config(String),

    #[error("執行器錯誤: {0}")]
    Executor(String),

    #[error("序列化錯誤: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RoiError {
    /// 是否為區域不變量被破壞（可降級為完整重算）
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            RoiError::StreamLengthMismatch { .. }
                | RoiError::OutOfBounds { .. }
                | RoiError::InvalidRect(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RoiError>;
