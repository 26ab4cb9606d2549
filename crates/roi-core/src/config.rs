//! 增量計算配置

use serde::{Deserialize, Serialize};

use crate::rect::Rect;
use crate::{Result, RoiError};

/// 預設跳過重用的變動比例門檻
pub const DEFAULT_SKIP_RATIO: f64 = 0.8;

/// 正規化時使用的重疊判斷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlapTest {
    /// 角點包含（近似，池化層使用）
    CornerContainment,
    /// 閉區間相交（精確，卷積層使用）
    Intersection,
}

impl OverlapTest {
    pub fn check(&self, a: &Rect, b: &Rect) -> bool {
        match self {
            OverlapTest::CornerContainment => a.overlaps(b),
            OverlapTest::Intersection => a.intersects(b),
        }
    }
}

/// 增量重算配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 是否啟用緩存重用（停用時所有層皆完整重算）
    pub enabled: bool,

    /// 變動比例超過此值時放棄部分重用
    pub skip_ratio_threshold: f64,

    /// 每層輸出後檢查座標不變量
    pub validate_regions: bool,

    /// 覆寫各層的預設重疊判斷
    pub overlap_test: Option<OverlapTest>,
}

impl CacheConfig {
    /// 創建預設配置
    pub fn new() -> Self {
        Self {
            enabled: true,
            skip_ratio_threshold: DEFAULT_SKIP_RATIO,
            validate_regions: true,
            overlap_test: None,
        }
    }

    /// 建構器模式：啟用/停用緩存
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 建構器模式：設置跳過門檻
    pub fn with_skip_ratio_threshold(mut self, threshold: f64) -> Self {
        self.skip_ratio_threshold = threshold;
        self
    }

    /// 建構器模式：設置是否檢查座標不變量
    pub fn with_validate_regions(mut self, validate: bool) -> Self {
        self.validate_regions = validate;
        self
    }

    /// 建構器模式：統一所有層的重疊判斷
    pub fn with_overlap_test(mut self, test: OverlapTest) -> Self {
        self.overlap_test = Some(test);
        self
    }

    /// 檢查配置是否合法
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.skip_ratio_threshold) {
            return Err(RoiError::Config(format!(
                "skip_ratio_threshold 必須介於 0 與 1 之間，實際為 {}",
                self.skip_ratio_threshold
            )));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
