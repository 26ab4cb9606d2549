//! 變動區域集合

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::OverlapTest;
use crate::rect::Rect;
use crate::{Result, RoiError};

/// 座標軸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
        }
    }
}

/// 特徵圖空間尺寸
///
/// 寬高分開記錄；`Extent::square` 對應單一 layersize 的舊模型。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub width: i32,
    pub height: i32,
}

impl Extent {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// 正方形特徵圖
    pub const fn square(layersize: i32) -> Self {
        Self {
            width: layersize,
            height: layersize,
        }
    }

    /// 像素總數
    pub fn area(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }

    /// 覆蓋整張特徵圖的矩形
    pub fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width - 1, self.height - 1)
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }
}

/// 單一層輸出的變動區域集合
///
/// `rects` 的插入順序即變動事件索引；同一深度、同一變動串流的集合必須索引對齊。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyRegionSet {
    /// 取樣原點相對網路輸入的偏移（x）
    pub x_offset: i32,

    /// 取樣原點相對網路輸入的偏移（y）
    pub y_offset: i32,

    /// 特徵圖尺寸
    pub extent: Extent,

    /// 變動矩形（依事件順序）
    pub rects: Vec<Rect>,
}

impl DirtyRegionSet {
    /// 創建空集合
    pub fn new(extent: Extent) -> Self {
        Self {
            x_offset: 0,
            y_offset: 0,
            extent,
            rects: Vec::new(),
        }
    }

    /// 創建正方形特徵圖的空集合
    pub fn square(layersize: i32) -> Self {
        Self::new(Extent::square(layersize))
    }

    /// 覆蓋整張特徵圖的集合
    pub fn full(extent: Extent) -> Self {
        let mut set = Self::new(extent);
        set.rects.push(extent.full_rect());
        set
    }

    /// 建構器模式：添加矩形
    pub fn with_rect(mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        self.add_rect(x1, y1, x2, y2);
        self
    }

    /// 建構器模式：設置偏移
    pub fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.set_offset(x, y);
        self
    }

    pub fn set_offset(&mut self, x: i32, y: i32) {
        self.x_offset = x;
        self.y_offset = y;
    }

    /// 追加矩形
    pub fn add_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.rects.push(Rect::new(x1, y1, x2, y2));
    }

    /// 以另一集合的深拷貝取代自身內容
    pub fn copy_from(&mut self, other: &DirtyRegionSet) {
        self.x_offset = other.x_offset;
        self.y_offset = other.y_offset;
        self.extent = other.extent;
        self.rects.clear();
        self.rects.extend_from_slice(&other.rects);
    }

    /// 矩形數量
    pub fn size(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// 舊模型的單一尺寸（寬）
    pub fn layersize(&self) -> i32 {
        self.extent.width
    }

    pub fn offset(&self) -> (i32, i32) {
        (self.x_offset, self.y_offset)
    }

    /// 所有矩形覆蓋的像素數上限（重疊部分重複計算）
    pub fn covered_area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// 以角點包含判斷合併重疊矩形
    pub fn normalize(&self) -> DirtyRegionSet {
        self.normalized_with(OverlapTest::CornerContainment)
    }

    /// 以指定的重疊判斷合併重疊矩形
    pub fn normalized_with(&self, test: OverlapTest) -> DirtyRegionSet {
        DirtyRegionSet {
            x_offset: self.x_offset,
            y_offset: self.y_offset,
            extent: self.extent,
            rects: normalize_rects(&self.rects, test),
        }
    }

    /// 檢查所有座標與偏移都在 `[0, extent)` 內
    pub fn validate(&self) -> Result<()> {
        check_offset(Axis::X, self.x_offset, self.extent.width)?;
        check_offset(Axis::Y, self.y_offset, self.extent.height)?;

        for rect in &self.rects {
            if !rect.is_valid() {
                return Err(RoiError::InvalidRect(*rect));
            }
            for x in [rect.x1, rect.x2] {
                check_index(Axis::X, x, self.extent.width)?;
            }
            for y in [rect.y1, rect.y2] {
                check_index(Axis::Y, y, self.extent.height)?;
            }
        }

        Ok(())
    }
}

fn check_index(axis: Axis, value: i32, limit: i32) -> Result<()> {
    if value < 0 || value >= limit {
        return Err(RoiError::OutOfBounds { axis, value, limit });
    }
    Ok(())
}

// 空特徵圖只接受零偏移
fn check_offset(axis: Axis, value: i32, limit: i32) -> Result<()> {
    if limit <= 0 && value == 0 {
        return Ok(());
    }
    check_index(axis, value, limit)
}

/// 合併重疊矩形直到不動點
///
/// 每輪掃描所有矩形對，遇到第一對重疊者即以外接矩形取代並重新掃描。
/// 結果只會擴大覆蓋範圍，不會縮小。
pub fn normalize_rects(rects: &[Rect], test: OverlapTest) -> Vec<Rect> {
    let mut current: Vec<Rect> = rects.to_vec();

    while let Some((i, j)) = find_mergeable_pair(&current, test) {
        let merged = current[i].merge(&current[j]);
        current = current
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != j)
            .map(|(k, r)| if k == i { merged } else { *r })
            .collect();
    }

    current
}

fn find_mergeable_pair(rects: &[Rect], test: OverlapTest) -> Option<(usize, usize)> {
    (0..rects.len()).find_map(|i| {
        (i + 1..rects.len())
            .find(|&j| test.check(&rects[i], &rects[j]))
            .map(|j| (i, j))
    })
}

impl fmt::Display for DirtyRegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset=({},{}) extent={}x{} [",
            self.x_offset, self.y_offset, self.extent.width, self.extent.height
        )?;
        for (i, rect) in self.rects.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", rect)?;
        }
        write!(f, "]")
    }
}
