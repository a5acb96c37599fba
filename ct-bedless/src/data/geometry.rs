//! 网格的物理空间信息: 体素间距, 原点和方向矩阵.
//!
//! 与数组布局保持一致, 所有 "按轴" 的量都以 `(z, h, w)` 顺序排列.
//! 方向矩阵的第 `k` 列是第 `k` 个索引轴在物理空间中的单位方向,
//! 行则对应物理坐标 `(x, y, z)`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BedError, BedResult};
use crate::Idx3d;

/// 3x3 矩阵, 行优先.
pub type Mat3 = [[f64; 3]; 3];

/// 单位矩阵.
pub const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// 行列式绝对值低于该值时认为矩阵奇异.
const SINGULAR_EPS: f64 = 1e-12;

/// 网格的物理空间信息.
///
/// 该结构是只读的. 构造时保证体素间距为正的有限值, 且方向矩阵可逆.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Geometry {
    /// `(z, h, w)` 三个方向的体素间距, 以毫米为单位.
    spacing: [f64; 3],
    /// 体素 `(0, 0, 0)` 的物理坐标 `(x, y, z)`.
    origin: [f64; 3],
    /// 方向矩阵.
    direction: Mat3,
}

impl Geometry {
    /// 构建物理空间信息.
    ///
    /// - 若 `spacing` 存在非正数或非有限值, 返回 `Err(BedError::InvalidSpacing)`;
    /// - 若 `direction` 不可逆, 返回 `Err(BedError::SingularDirection)`.
    pub fn new(spacing: [f64; 3], origin: [f64; 3], direction: Mat3) -> BedResult<Self> {
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(BedError::InvalidSpacing(spacing));
        }
        if !origin.iter().chain(direction.iter().flatten()).all(|v| v.is_finite())
            || det3(&direction).abs() < SINGULAR_EPS
        {
            return Err(BedError::SingularDirection);
        }
        Ok(Self {
            spacing,
            origin,
            direction,
        })
    }

    /// 以单位方向矩阵和零原点构建, 仅指定体素间距.
    #[inline]
    pub fn from_spacing(spacing: [f64; 3]) -> BedResult<Self> {
        Self::new(spacing, [0.0; 3], IDENTITY)
    }

    /// `(z, h, w)` 体素间距, 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 体素 `(0, 0, 0)` 的物理坐标.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// 方向矩阵.
    #[inline]
    pub fn direction(&self) -> &Mat3 {
        &self.direction
    }

    /// 复制原点和方向, 替换体素间距.
    #[inline]
    pub fn with_spacing(&self, spacing: [f64; 3]) -> BedResult<Self> {
        Self::new(spacing, self.origin, self.direction)
    }

    /// 网格 `shape` 在三个方向上覆盖的物理长度 (间距 x 体素个数), 以毫米为单位.
    #[inline]
    pub fn extent_mm(&self, (z, h, w): Idx3d) -> [f64; 3] {
        let [sz, sh, sw] = self.spacing;
        [sz * z as f64, sh * h as f64, sw * w as f64]
    }

    /// 索引到物理坐标的线性部分, 即 `direction * diag(spacing)`.
    fn index_matrix(&self) -> Mat3 {
        let mut m = self.direction;
        for row in m.iter_mut() {
            for (v, s) in row.iter_mut().zip(self.spacing) {
                *v *= s;
            }
        }
        m
    }

    /// 将 (可为小数的) 连续索引 `(z, h, w)` 转换为物理坐标.
    pub fn continuous_index_to_physical(&self, index: [f64; 3]) -> [f64; 3] {
        let v = mat_vec(&self.index_matrix(), &index);
        [
            v[0] + self.origin[0],
            v[1] + self.origin[1],
            v[2] + self.origin[2],
        ]
    }

    /// 将体素索引 `(z, h, w)` 转换为物理坐标.
    #[inline]
    pub fn index_to_physical(&self, (z, h, w): Idx3d) -> [f64; 3] {
        self.continuous_index_to_physical([z as f64, h as f64, w as f64])
    }

    /// 将物理坐标转换为连续索引 `(z, h, w)`.
    pub fn physical_to_continuous_index(&self, point: [f64; 3]) -> BedResult<[f64; 3]> {
        let inv = inverse3(&self.index_matrix()).ok_or(BedError::SingularDirection)?;
        let d = [
            point[0] - self.origin[0],
            point[1] - self.origin[1],
            point[2] - self.origin[2],
        ];
        Ok(mat_vec(&inv, &d))
    }
}

/// 从一个网格的体素索引到另一个网格连续索引的仿射映射.
///
/// 两个网格之间的物理变换为恒等变换, 只有分辨率发生变化, 位置保持不变.
#[derive(Clone, Debug)]
pub(crate) struct IndexMap {
    linear: Mat3,
    offset: [f64; 3],
}

impl IndexMap {
    /// 构建 `dst` 网格索引到 `src` 网格连续索引的映射.
    pub fn between(dst: &Geometry, src: &Geometry) -> BedResult<Self> {
        let inv = inverse3(&src.index_matrix()).ok_or(BedError::SingularDirection)?;
        let linear = mat_mul(&inv, &dst.index_matrix());
        let d = [
            dst.origin[0] - src.origin[0],
            dst.origin[1] - src.origin[1],
            dst.origin[2] - src.origin[2],
        ];
        Ok(Self {
            linear,
            offset: mat_vec(&inv, &d),
        })
    }

    /// 计算 `dst` 网格中 `(z, h, w)` 体素在 `src` 网格中的连续索引.
    #[inline]
    pub fn apply(&self, (z, h, w): Idx3d) -> [f64; 3] {
        let v = mat_vec(&self.linear, &[z as f64, h as f64, w as f64]);
        [
            v[0] + self.offset[0],
            v[1] + self.offset[1],
            v[2] + self.offset[2],
        ]
    }
}

#[inline]
fn mat_vec(m: &Mat3, v: &[f64; 3]) -> [f64; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut ans = [[0.0; 3]; 3];
    for (i, row) in ans.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    ans
}

#[inline]
fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// 伴随矩阵法求逆. 奇异时返回 `None`.
fn inverse3(m: &Mat3) -> Option<Mat3> {
    let det = det3(m);
    if !det.is_finite() || det.abs() < SINGULAR_EPS {
        return None;
    }
    let c = |r0: usize, c0: usize, r1: usize, c1: usize| m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];
    let adj = [
        [c(1, 1, 2, 2), -c(0, 1, 2, 2), c(0, 1, 1, 2)],
        [-c(1, 0, 2, 2), c(0, 0, 2, 2), -c(0, 0, 1, 2)],
        [c(1, 0, 2, 1), -c(0, 0, 2, 1), c(0, 0, 1, 1)],
    ];
    Some(adj.map(|row| row.map(|v| v / det)))
}
