//! 層類型與網路圖描述

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::OverlapTest;
use crate::region::Axis;
use crate::{Result, RoiError};

/// 填充模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingMode {
    /// 補零填充，各軸填充量 ≥ 0
    Same { pad_w: i32, pad_h: i32 },
    /// 不填充
    Valid,
}

impl PaddingMode {
    /// 各軸相同填充量
    pub fn same(pad: i32) -> Self {
        PaddingMode::Same {
            pad_w: pad,
            pad_h: pad,
        }
    }

    /// 實際填充量（VALID 為 0）
    pub fn pad(&self, axis: Axis) -> i32 {
        match (self, axis) {
            (PaddingMode::Same { pad_w, .. }, Axis::X) => *pad_w,
            (PaddingMode::Same { pad_h, .. }, Axis::Y) => *pad_h,
            (PaddingMode::Valid, _) => 0,
        }
    }
}

/// 單一座標軸上的核幾何參數
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisGeometry {
    pub kernel: i32,
    pub stride: i32,
    /// 實際填充量
    pub pad: i32,
    /// 下游收縮公式使用的填充量（VALID 以 kernel / 2 代入）
    pub shrink_pad: i32,
}

impl AxisGeometry {
    /// 是否需要上游擴張（僅在填充量 > 0 時）
    pub fn expands(&self) -> bool {
        self.pad > 0
    }
}

/// 卷積/池化層的核參數
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelParams {
    pub kernel_w: i32,
    pub kernel_h: i32,
    pub stride_w: i32,
    pub stride_h: i32,
    pub padding: PaddingMode,
}

impl KernelParams {
    /// 創建新的核參數
    pub fn new(kernel_w: i32, kernel_h: i32, stride_w: i32, stride_h: i32, padding: PaddingMode) -> Self {
        Self {
            kernel_w,
            kernel_h,
            stride_w,
            stride_h,
            padding,
        }
    }

    /// 正方形核、SAME 填充
    pub fn same(kernel: i32, stride: i32, pad: i32) -> Self {
        Self::new(kernel, kernel, stride, stride, PaddingMode::same(pad))
    }

    /// 正方形核、VALID 填充
    pub fn valid(kernel: i32, stride: i32) -> Self {
        Self::new(kernel, kernel, stride, stride, PaddingMode::Valid)
    }

    /// 取得單一軸的幾何參數
    pub fn axis(&self, axis: Axis) -> AxisGeometry {
        let (kernel, stride) = match axis {
            Axis::X => (self.kernel_w, self.stride_w),
            Axis::Y => (self.kernel_h, self.stride_h),
        };
        let pad = self.padding.pad(axis);
        let shrink_pad = match self.padding {
            PaddingMode::Same { .. } => pad,
            PaddingMode::Valid => kernel / 2,
        };

        AxisGeometry {
            kernel,
            stride,
            pad,
            shrink_pad,
        }
    }

    /// 檢查參數是否合法
    pub fn validate(&self) -> Result<()> {
        if self.kernel_w <= 0 || self.kernel_h <= 0 {
            return Err(RoiError::InvalidParams(format!(
                "核大小必須為正數: {}x{}",
                self.kernel_w, self.kernel_h
            )));
        }
        if self.stride_w <= 0 || self.stride_h <= 0 {
            return Err(RoiError::InvalidParams(format!(
                "步長必須為正數: {}x{}",
                self.stride_w, self.stride_h
            )));
        }
        if let PaddingMode::Same { pad_w, pad_h } = self.padding {
            if pad_w < 0 || pad_h < 0 {
                return Err(RoiError::InvalidParams(format!(
                    "填充量不可為負: {}x{}",
                    pad_w, pad_h
                )));
            }
        }
        Ok(())
    }
}

/// 層類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum LayerKind {
    /// 卷積
    Convolution(KernelParams),
    /// 池化
    Pooling(KernelParams),
    /// 分流（一進多出）
    Split,
    /// 逐元素一元運算（ReLU、BatchNorm 等）
    Activation,
    /// 通道拼接
    Concat,
    /// 逐元素二元運算（加、乘、取最大）
    Eltwise,
}

impl LayerKind {
    /// 此層是否執行部分重算
    pub fn needs_cache(&self) -> bool {
        matches!(self, LayerKind::Convolution(_))
    }

    /// 核參數（僅卷積/池化）
    pub fn kernel_params(&self) -> Option<&KernelParams> {
        match self {
            LayerKind::Convolution(params) | LayerKind::Pooling(params) => Some(params),
            LayerKind::Split | LayerKind::Activation | LayerKind::Concat | LayerKind::Eltwise => {
                None
            }
        }
    }

    /// 正規化時預設的重疊判斷
    pub fn default_overlap_test(&self) -> OverlapTest {
        match self {
            LayerKind::Convolution(_) => OverlapTest::Intersection,
            _ => OverlapTest::CornerContainment,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Convolution(_) => "Convolution",
            LayerKind::Pooling(_) => "Pooling",
            LayerKind::Split => "Split",
            LayerKind::Activation => "Activation",
            LayerKind::Concat => "Concat",
            LayerKind::Eltwise => "Eltwise",
        }
    }
}

/// 網路圖節點
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerNode {
    /// 層名稱
    pub name: String,

    /// 層類型
    pub kind: LayerKind,

    /// 輸入 blob 索引
    pub bottoms: Vec<usize>,

    /// 輸出 blob 索引
    pub tops: Vec<usize>,
}

impl LayerNode {
    /// 創建新的節點
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bottoms: Vec::new(),
            tops: Vec::new(),
        }
    }

    /// 建構器模式：設置輸入 blob
    pub fn with_bottoms(mut self, bottoms: Vec<usize>) -> Self {
        self.bottoms = bottoms;
        self
    }

    /// 建構器模式：設置輸出 blob
    pub fn with_tops(mut self, tops: Vec<usize>) -> Self {
        self.tops = tops;
        self
    }

    pub fn needs_cache(&self) -> bool {
        self.kind.needs_cache()
    }
}

/// 拓撲排序後的網路圖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkGraph {
    /// 網路輸入 blob 索引
    pub inputs: Vec<usize>,

    /// 依拓撲順序排列的層
    pub layers: Vec<LayerNode>,
}

impl NetworkGraph {
    /// 創建新的網路圖
    pub fn new(inputs: Vec<usize>) -> Self {
        Self {
            inputs,
            layers: Vec::new(),
        }
    }

    /// 建構器模式：追加層
    pub fn with_layer(mut self, layer: LayerNode) -> Self {
        self.layers.push(layer);
        self
    }

    /// 從 JSON 載入
    pub fn from_json(json: &str) -> Result<Self> {
        let graph: NetworkGraph = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// 序列化為 JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 檢查層順序與參數
    ///
    /// 每個輸入 blob 必須由網路輸入或更早的層產生，因此環狀圖會在此被拒絕。
    pub fn validate(&self) -> Result<()> {
        let mut produced: HashSet<usize> = self.inputs.iter().copied().collect();

        for layer in &self.layers {
            if let Some(params) = layer.kind.kernel_params() {
                params.validate()?;
            }
            for bottom in &layer.bottoms {
                if !produced.contains(bottom) {
                    return Err(RoiError::MissingBlob(*bottom));
                }
            }
            for top in &layer.tops {
                if !produced.insert(*top) {
                    return Err(RoiError::InvalidParams(format!(
                        "blob {} 被重複產生（層 {}）",
                        top, layer.name
                    )));
                }
            }
        }

        Ok(())
    }
}
