//! 床板去除流水线参数.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::{hu, CLOSING_RADIUS, DOWNSAMPLE_FACTOR, OPENING_RADIUS};
use crate::error::{BedError, BedResult};
use crate::mask::MaskRule;
use crate::resample::{Interpolation, MaskUpsampling};
use crate::threshold::HuRange;

/// 流水线输出内容.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutputMode {
    /// 去除床板后的强度体数据.
    #[default]
    BedRemoved,

    /// 原始网格上的身体掩膜.
    BodyMask,
}

/// 床板去除流水线的全部参数. 默认值见各字段说明.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BedRemovalConfig {
    /// 水平降采样倍数. 默认 3.
    pub factor: usize,

    /// 身体阈值窗口. 默认 `[-300, 3071]` HU.
    pub threshold: HuRange,

    /// 开运算球半径 (降采样网格体素). 默认 3.
    pub opening_radius: usize,

    /// 闭运算球半径 (降采样网格体素). 默认 40.
    pub closing_radius: usize,

    /// 身体以外体素的覆写值. 默认 -1024 HU.
    pub air: f32,

    /// 强度降采样插值方式. 默认三线性.
    pub interpolation: Interpolation,

    /// 掩膜升采样策略. 默认三线性插值加 0.5 门限.
    pub mask_upsampling: MaskUpsampling,

    /// 掩膜覆写规则. 默认 [`MaskRule::Literal`].
    pub mask_rule: MaskRule,

    /// 输出内容. 默认 [`OutputMode::BedRemoved`].
    pub output: OutputMode,
}

impl Default for BedRemovalConfig {
    fn default() -> Self {
        Self {
            factor: DOWNSAMPLE_FACTOR,
            threshold: HuRange::body(),
            opening_radius: OPENING_RADIUS,
            closing_radius: CLOSING_RADIUS,
            air: hu::AIR,
            interpolation: Interpolation::default(),
            mask_upsampling: MaskUpsampling::default(),
            mask_rule: MaskRule::default(),
            output: OutputMode::default(),
        }
    }
}

impl BedRemovalConfig {
    /// 检查参数是否合法.
    pub fn validate(&self) -> BedResult<()> {
        if self.factor == 0 {
            return Err(BedError::InvalidConfig("降采样倍数必须为正整数"));
        }
        if HuRange::new(self.threshold.lower(), self.threshold.upper()).is_none() {
            return Err(BedError::InvalidConfig("阈值窗口端点必须为有限值, 且下限不高于上限"));
        }
        if !self.air.is_finite() {
            return Err(BedError::InvalidConfig("空气值必须为有限值"));
        }
        if let MaskRule::IntensityFloor(floor) = self.mask_rule {
            if floor.is_nan() {
                return Err(BedError::InvalidConfig("覆写强度下限不能为 NaN"));
            }
        }
        self.mask_upsampling.validate()
    }

    /// 设置降采样倍数.
    #[inline]
    pub fn with_factor(mut self, factor: usize) -> Self {
        self.factor = factor;
        self
    }

    /// 设置身体阈值窗口.
    #[inline]
    pub fn with_threshold(mut self, threshold: HuRange) -> Self {
        self.threshold = threshold;
        self
    }

    /// 设置开运算球半径.
    #[inline]
    pub fn with_opening_radius(mut self, radius: usize) -> Self {
        self.opening_radius = radius;
        self
    }

    /// 设置闭运算球半径.
    #[inline]
    pub fn with_closing_radius(mut self, radius: usize) -> Self {
        self.closing_radius = radius;
        self
    }

    /// 设置空气值.
    #[inline]
    pub fn with_air(mut self, air: f32) -> Self {
        self.air = air;
        self
    }

    /// 设置强度插值方式.
    #[inline]
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// 设置掩膜升采样策略.
    #[inline]
    pub fn with_mask_upsampling(mut self, policy: MaskUpsampling) -> Self {
        self.mask_upsampling = policy;
        self
    }

    /// 设置掩膜覆写规则.
    #[inline]
    pub fn with_mask_rule(mut self, rule: MaskRule) -> Self {
        self.mask_rule = rule;
        self
    }

    /// 设置输出内容.
    #[inline]
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}
