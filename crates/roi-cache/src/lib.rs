//! # ROI Cache
//!
//! 緩存決策與增量推理模組

pub mod decision;
pub mod dirty_tracking;
pub mod incremental;

// Re-export 主要類型
pub use decision::{skip_reuse, CacheDecision, CachePolicy, ChangeMap};
pub use dirty_tracking::DirtyTracker;
pub use incremental::{
    CachedForwardContext, FullReason, IncrementalRunner, LayerAction, LayerExecutor, LayerReport,
    PassReport,
};
