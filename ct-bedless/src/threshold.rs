//! HU 阈值二值化.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::hu::{BODY_LOWER, BODY_UPPER};
use crate::consts::label::{BACKGROUND, BODY};
use crate::{BodyMask, GridAttr, Volume};

/// 闭区间 HU 窗口 `[lower, upper]`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HuRange {
    lower: f32,
    upper: f32,
}

impl Default for HuRange {
    #[inline]
    fn default() -> Self {
        Self::body()
    }
}

impl HuRange {
    /// 构建 HU 窗口. 若任一端点不是有限值, 或 `lower > upper`, 返回 `None`.
    pub fn new(lower: f32, upper: f32) -> Option<Self> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            None
        } else {
            Some(Self { lower, upper })
        }
    }

    /// 身体窗口 `[-300, 3071]`.
    #[inline]
    pub const fn body() -> Self {
        Self {
            lower: BODY_LOWER,
            upper: BODY_UPPER,
        }
    }

    /// 窗口下限.
    #[inline]
    pub fn lower(&self) -> f32 {
        self.lower
    }

    /// 窗口上限.
    #[inline]
    pub fn upper(&self) -> f32 {
        self.upper
    }

    /// `hu` 是否落在窗口内 (两端包含). NaN 永远不在窗口内.
    #[inline]
    pub fn contains(&self, hu: f32) -> bool {
        self.lower <= hu && hu <= self.upper
    }

    /// 将体数据二值化: 窗口内为身体, 其余 (包括 NaN) 为背景.
    /// 输出与输入处于同一网格.
    pub fn binarize(&self, volume: &Volume) -> BodyMask {
        let data = volume
            .data()
            .mapv(|hu| if self.contains(hu) { BODY } else { BACKGROUND });
        BodyMask::from_binary(data, volume.geometry().clone())
    }
}
