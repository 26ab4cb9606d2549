//! 降級 blob 追蹤

use std::collections::HashSet;

/// 追蹤本次推理中必須完整重算的 blob
///
/// 緩存前向失敗的層會把所有輸出標記為髒，下游消費者讀到任何髒輸入即完整重算，
/// 並把自己的輸出也標記為髒。每次推理開始時清除。
pub struct DirtyTracker {
    dirty_blobs: HashSet<usize>,
}

impl DirtyTracker {
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self {
            dirty_blobs: HashSet::new(),
        }
    }

    /// 標記 blob 為髒
    pub fn mark_dirty(&mut self, blob: usize) {
        self.dirty_blobs.insert(blob);
    }

    /// 批量標記
    pub fn mark_all(&mut self, blobs: &[usize]) {
        self.dirty_blobs.extend(blobs.iter().copied());
    }

    /// 檢查 blob 是否為髒
    pub fn is_dirty(&self, blob: usize) -> bool {
        self.dirty_blobs.contains(&blob)
    }

    /// 任一 blob 為髒
    pub fn any_dirty(&self, blobs: &[usize]) -> bool {
        blobs.iter().any(|b| self.is_dirty(*b))
    }

    /// 清除所有髒標記
    pub fn clear(&mut self) {
        self.dirty_blobs.clear();
    }

    /// 獲取所有髒 blob（排序後）
    pub fn get_dirty_blobs(&self) -> Vec<usize> {
        let mut blobs: Vec<usize> = self.dirty_blobs.iter().copied().collect();
        blobs.sort_unstable();
        blobs
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}
