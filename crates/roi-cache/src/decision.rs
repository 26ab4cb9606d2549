//! 緩存重用決策

use rayon::prelude::*;
use roi_core::{CacheConfig, DirtyRegionSet, DEFAULT_SKIP_RATIO};
use serde::Serialize;

/// 變動比例超過門檻時回傳 true（放棄部分重用）
///
/// 只計算前 `outw * outh` 格；面積為 0 時沒有比例可言，回傳 false。
pub fn skip_reuse(cached_map: &[bool], outw: usize, outh: usize) -> bool {
    let area = outw * outh;
    if area == 0 {
        return false;
    }
    let changed = cached_map.iter().take(area).filter(|&&c| c).count();
    changed as f64 / area as f64 > DEFAULT_SKIP_RATIO
}

/// 單層輸出的變動位元圖
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMap {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl ChangeMap {
    /// 創建全未變動的位元圖
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// 將變動區域集合光柵化（超出範圍的部分被裁掉）
    pub fn from_region(region: &DirtyRegionSet) -> Self {
        let width = region.extent.width.max(0) as usize;
        let height = region.extent.height.max(0) as usize;
        let mut map = Self::new(width, height);

        for rect in region.rects() {
            let x1 = rect.x1.max(0) as usize;
            let y1 = rect.y1.max(0) as usize;
            if rect.x2 < 0 || rect.y2 < 0 {
                continue;
            }
            let x2 = (rect.x2 as usize).min(width.saturating_sub(1));
            let y2 = (rect.y2 as usize).min(height.saturating_sub(1));
            if width == 0 || height == 0 || x1 > x2 || y1 > y2 {
                continue;
            }
            for y in y1..=y2 {
                map.cells[y * width + x1..=y * width + x2].fill(true);
            }
        }

        map
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// 標記單一格
    pub fn mark(&mut self, x: usize, y: usize) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = true;
        }
    }

    pub fn is_changed(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.cells[y * self.width + x]
    }

    /// 變動格數
    pub fn changed_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// 變動比例（面積為 0 時為 None）
    pub fn ratio(&self) -> Option<f64> {
        let area = self.width * self.height;
        (area > 0).then(|| self.changed_count() as f64 / area as f64)
    }
}

/// 緩存決策
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CacheDecision {
    /// 部分重算並重用未變動區域
    Reuse { ratio: f64 },
    /// 完整重算
    Recompute { ratio: f64 },
}

impl CacheDecision {
    pub fn is_reuse(&self) -> bool {
        matches!(self, CacheDecision::Reuse { .. })
    }

    pub fn ratio(&self) -> f64 {
        match self {
            CacheDecision::Reuse { ratio } | CacheDecision::Recompute { ratio } => *ratio,
        }
    }
}

/// 緩存決策策略（無狀態）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    /// 變動比例門檻（嚴格大於時放棄重用）
    pub skip_ratio_threshold: f64,
}

impl CachePolicy {
    pub fn new(skip_ratio_threshold: f64) -> Self {
        Self {
            skip_ratio_threshold,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.skip_ratio_threshold)
    }

    /// 是否放棄部分重用
    pub fn skip_reuse(&self, map: &ChangeMap) -> bool {
        map.ratio()
            .map(|ratio| ratio > self.skip_ratio_threshold)
            .unwrap_or(false)
    }

    /// 單層決策
    pub fn decide(&self, map: &ChangeMap) -> CacheDecision {
        let ratio = map.ratio().unwrap_or(0.0);
        if self.skip_reuse(map) {
            CacheDecision::Recompute { ratio }
        } else {
            CacheDecision::Reuse { ratio }
        }
    }

    /// 批量決策（各層互不相依，並行計算）
    pub fn decide_all(&self, maps: &[ChangeMap]) -> Vec<CacheDecision> {
        maps.par_iter().map(|map| self.decide(map)).collect()
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_RATIO)
    }
}
