//! 运行时错误.

use crate::Idx3d;
use std::fmt::{Display, Formatter};

/// 床板去除流水线的运行时错误. 所有错误都是致命的, 流水线不会产出部分结果.
#[derive(Debug, Clone, PartialEq)]
pub enum BedError {
    /// 输入体数据至少有一个维度为 0. 参数为 `(z, h, w)` 形状.
    ZeroDimension(Idx3d),

    /// 按 `factor` 降采样后, 水平方向退化为 0.
    DegenerateDownsample {
        /// 原始形状 `(z, h, w)`.
        shape: Idx3d,
        /// 水平降采样倍数.
        factor: usize,
    },

    /// 体素间距非正数或非有限值. 参数按 `(z, h, w)` 排列.
    InvalidSpacing([f64; 3]),

    /// 方向矩阵不可逆, 索引与物理坐标之间的映射无定义.
    SingularDirection,

    /// 体素个数超出 `usize` 表示范围, 无法分配网格.
    TooLarge(Idx3d),

    /// 两个网格的形状不一致.
    ShapeMismatch {
        /// 期望的形状.
        expected: Idx3d,
        /// 实际的形状.
        found: Idx3d,
    },

    /// 配置参数非法. 参数为出错字段的描述.
    InvalidConfig(&'static str),
}

impl Display for BedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BedError::ZeroDimension(shape) => write!(f, "体数据存在空维度: {shape:?}"),
            BedError::DegenerateDownsample { shape, factor } => {
                write!(f, "形状 {shape:?} 按 {factor} 倍降采样后退化")
            }
            BedError::InvalidSpacing(sp) => write!(f, "非法体素间距: {sp:?}"),
            BedError::SingularDirection => f.write_str("方向矩阵不可逆"),
            BedError::TooLarge(shape) => write!(f, "网格 {shape:?} 体素个数溢出"),
            BedError::ShapeMismatch { expected, found } => {
                write!(f, "网格形状不一致: 期望 {expected:?}, 实际 {found:?}")
            }
            BedError::InvalidConfig(what) => write!(f, "非法配置: {what}"),
        }
    }
}

impl std::error::Error for BedError {}

impl BedError {
    /// 是否属于几何错误 (在任何滤波步骤之前即可检测到).
    pub fn is_geometry_error(&self) -> bool {
        matches!(
            self,
            BedError::ZeroDimension(_)
                | BedError::DegenerateDownsample { .. }
                | BedError::InvalidSpacing(_)
                | BedError::SingularDirection
        )
    }
}

/// 流水线运行结果.
pub type BedResult<T> = Result<T, BedError>;

/// 检查形状是否非空且体素个数不溢出.
pub(crate) fn check_shape(shape: Idx3d) -> BedResult<()> {
    let (z, h, w) = shape;
    if z == 0 || h == 0 || w == 0 {
        return Err(BedError::ZeroDimension(shape));
    }
    z.checked_mul(h)
        .and_then(|n| n.checked_mul(w))
        .map(|_| ())
        .ok_or(BedError::TooLarge(shape))
}
