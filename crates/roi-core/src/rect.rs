//! 矩形模型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 變動矩形（閉區間，軸對齊）
///
/// 表示特徵圖中一塊相對上一次推理發生變化的視窗。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// 創建新的矩形
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 近似重疊判斷
    ///
    /// 只檢查任一矩形的左上角是否落在另一矩形的範圍內。
    /// 這不是完整的區間相交判斷，十字形交疊會被判為不重疊。
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.contains_point(other.x1, other.y1) || other.contains_point(self.x1, self.y1)
    }

    /// 精確相交判斷（閉區間）
    pub fn intersects(&self, other: &Rect) -> bool {
        !(other.x1 > self.x2 || self.x1 > other.x2 || other.y1 > self.y2 || self.y1 > other.y2)
    }

    /// 合併為外接矩形
    pub fn merge(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// 檢查點是否落在矩形內
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// 檢查另一矩形是否完全被包含
    pub fn contains(&self, other: &Rect) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1 + 1
    }

    /// 面積（無效矩形為 0）
    pub fn area(&self) -> i64 {
        if self.is_valid() {
            self.width() as i64 * self.height() as i64
        } else {
            0
        }
    }

    /// 檢查是否為有效矩形（起點不大於終點）
    pub fn is_valid(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{},{})", self.x1, self.y1, self.x2, self.y2)
    }
}
