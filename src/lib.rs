//! # CNN Cache
//!
//! 增量推理的變動區域（ROI）計算
//!
//! - [`roi_core`]：矩形、區域集合、層描述與配置
//! - [`roi_calc`]：座標轉換、組合策略與逐層傳播
//! - [`roi_cache`]：緩存決策與增量推理執行器

pub use roi_cache;
pub use roi_calc;
pub use roi_core;

pub mod prelude {
    pub use roi_cache::{
        CachePolicy, CachedForwardContext, IncrementalRunner, LayerAction, LayerExecutor,
        PassReport,
    };
    pub use roi_calc::{BlobRoi, PropagationResult, RoiPropagator};
    pub use roi_core::{
        CacheConfig, DirtyRegionSet, Extent, KernelParams, LayerKind, LayerNode, NetworkGraph,
        PaddingMode, Rect, Result, RoiError,
    };
}
