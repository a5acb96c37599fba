//! 以身体掩膜覆写体数据.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::label::is_background;
use crate::data::ensure_same_shape;
use crate::error::BedResult;
use crate::{BodyMask, GridAttr, Volume};

/// 掩膜覆写规则.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaskRule {
    /// 掩膜为背景的体素一律覆写为空气值.
    #[default]
    Literal,

    /// 掩膜为背景, 且原始强度高于给定下限时才覆写.
    /// 不高于下限的体素 (例如重建视野外的 -3024 填充值) 保持不变.
    IntensityFloor(f32),
}

impl MaskRule {
    /// 该体素是否应被覆写为空气值.
    #[inline]
    pub fn overwrites(&self, label: u8, hu: f32) -> bool {
        match *self {
            MaskRule::Literal => is_background(label),
            MaskRule::IntensityFloor(floor) => is_background(label) && hu > floor,
        }
    }
}

/// 复制 `volume`, 并将 `mask` 中身体以外的体素 (按 `rule` 判定) 覆写为 `air`.
/// 其他体素保持原值. 对同一掩膜重复调用的结果不变.
///
/// 若两者形状不一致, 返回 `Err(BedError::ShapeMismatch)`.
pub fn apply_mask(volume: &Volume, mask: &BodyMask, air: f32, rule: MaskRule) -> BedResult<Volume> {
    ensure_same_shape(volume.shape(), mask.shape())?;
    let mut out = volume.clone();
    out.data_mut().zip_mut_with(&mask.data(), |hu, &label| {
        if rule.overwrites(label, *hu) {
            *hu = air;
        }
    });
    Ok(out)
}
