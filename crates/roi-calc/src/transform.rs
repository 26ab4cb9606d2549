//! 座標轉換（下游收縮與上游擴張）

use roi_core::{Axis, AxisGeometry, DirtyRegionSet, Extent, KernelParams, Rect};

/// 核幾何轉換計算器
pub struct KernelTransform;

impl KernelTransform {
    /// 經過核之後的特徵圖尺寸（逐軸除以步長）
    pub fn output_extent(input: Extent, params: &KernelParams) -> Extent {
        Extent::new(
            input.width.div_euclid(params.stride_w),
            input.height.div_euclid(params.stride_h),
        )
    }

    /// 將輸入集合映射到下游輸出座標
    ///
    /// 偏移與尺寸逐軸除以步長，每個矩形經 `forward_rect` 映射。
    pub fn forward_through_kernel(input: &DirtyRegionSet, params: &KernelParams) -> DirtyRegionSet {
        let extent = Self::output_extent(input.extent, params);
        let rects = input
            .rects
            .iter()
            .map(|r| Self::forward_rect(r, params, extent))
            .collect();

        DirtyRegionSet {
            x_offset: input.x_offset.div_euclid(params.stride_w),
            y_offset: input.y_offset.div_euclid(params.stride_h),
            extent,
            rects,
        }
    }

    /// 單一矩形的下游映射
    ///
    /// 取基本收縮公式 `[floor((x1 + p) / s), floor((x2 - p) / s)]` 與精確感受野像
    /// `[ceil((x1 + pad - k + 1) / s), floor((x2 + pad) / s)]` 的外接區間，
    /// 再夾到輸出範圍內。結果只會比精確像大，不會小。
    pub fn forward_rect(rect: &Rect, params: &KernelParams, out: Extent) -> Rect {
        let (x1, x2) = forward_span(rect.x1, rect.x2, params.axis(Axis::X), out.width);
        let (y1, y2) = forward_span(rect.y1, rect.y2, params.axis(Axis::Y), out.height);
        Rect::new(x1, y1, x2, y2)
    }

    /// 由已映射的輸出側集合推回需要讀取的區域
    ///
    /// 只在該軸填充量 > 0 時向四周擴張 `kernel - 1`，並夾到 `[0, extent)`。
    pub fn expand_for_padding(output_side: &DirtyRegionSet, params: &KernelParams) -> DirtyRegionSet {
        let rects = output_side
            .rects
            .iter()
            .map(|r| Self::expand_rect(r, params, output_side.extent))
            .collect();

        DirtyRegionSet {
            x_offset: output_side.x_offset,
            y_offset: output_side.y_offset,
            extent: output_side.extent,
            rects,
        }
    }

    /// 單一矩形的上游擴張
    pub fn expand_rect(rect: &Rect, params: &KernelParams, extent: Extent) -> Rect {
        let (x1, x2) = expand_span(rect.x1, rect.x2, params.axis(Axis::X), extent.width);
        let (y1, y2) = expand_span(rect.y1, rect.y2, params.axis(Axis::Y), extent.height);
        Rect::new(x1, y1, x2, y2)
    }
}

fn floor_div(a: i32, b: i32) -> i32 {
    a.div_euclid(b)
}

fn ceil_div(a: i32, b: i32) -> i32 {
    -(-a).div_euclid(b)
}

fn forward_span(lo: i32, hi: i32, geom: AxisGeometry, out_len: i32) -> (i32, i32) {
    let s = geom.stride;

    let base_lo = floor_div(lo + geom.shrink_pad, s);
    let base_hi = floor_div(hi - geom.shrink_pad, s);
    let exact_lo = ceil_div(lo + geom.pad - geom.kernel + 1, s);
    let exact_hi = floor_div(hi + geom.pad, s);
    // 步長大於核時輸入可能落在兩個感受野之間，此上界保證 lo 不超過 exact_hi
    let anchor_lo = floor_div(lo + geom.pad, s);

    let new_hi = base_hi.max(exact_hi).min(out_len - 1);
    let new_lo = base_lo.min(exact_lo).min(anchor_lo).max(0).min(new_hi);
    (new_lo, new_hi)
}

fn expand_span(lo: i32, hi: i32, geom: AxisGeometry, len: i32) -> (i32, i32) {
    if !geom.expands() {
        return (lo, hi);
    }
    (
        (lo - geom.kernel + 1).max(0),
        (hi + geom.kernel - 1).min(len - 1),
    )
}
