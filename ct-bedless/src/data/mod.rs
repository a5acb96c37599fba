use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, ArrayView2, ArrayViewMut, Axis, Ix3};

use crate::consts::label::*;
use crate::error::{check_shape, BedError, BedResult};
use crate::{Idx2d, Idx3d};

pub mod geometry;
pub mod nii;
pub mod preview;
pub mod window;

pub use geometry::Geometry;

/// 位于 [`Geometry`] 网格上的 3D 数据的共用属性和部分通用操作.
pub trait GridAttr {
    /// 获取物理空间信息.
    fn geometry(&self) -> &Geometry;

    /// 获取数据形状大小 `(z, h, w)`.
    fn shape(&self) -> Idx3d;

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.geometry().spacing()
    }

    /// 获取 width 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.pix_dim()[2]
    }

    /// 获取 height 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.pix_dim()[1]
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.pix_dim()[0]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 网格在 `(z, h, w)` 三个方向覆盖的物理长度, 以毫米为单位.
    #[inline]
    fn extent_mm(&self) -> [f64; 3] {
        self.geometry().extent_mm(self.shape())
    }
}

/// 3D CT 强度体数据 (HU), 以 `(z, h, w)` 布局保存为 `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    geometry: Geometry,
    data: Array3<f32>,
}

impl GridAttr for Volume {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Volume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Volume {
    /// 由 `(z, h, w)` 布局的数据和物理空间信息直接创建体数据.
    ///
    /// 若某一维度为 0, 返回 `Err(BedError::ZeroDimension)`.
    pub fn new(data: Array3<f32>, geometry: Geometry) -> BedResult<Self> {
        check_shape(data.dim())?;
        Ok(Self { geometry, data })
    }

    /// 创建所有体素值均为 `hu` 的体数据.
    pub fn from_elem(shape: Idx3d, geometry: Geometry, hu: f32) -> BedResult<Self> {
        check_shape(shape)?;
        Ok(Self {
            geometry,
            data: Array3::from_elem(shape, hu),
        })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 获取 3D 体数据 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 拆分为物理空间信息和底层数据.
    #[inline]
    pub fn into_parts(self) -> (Geometry, Array3<f32>) {
        (self.geometry, self.data)
    }

    /// 所有体素中的最小和最大 HU 值. 忽略 NaN.
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// 3D 身体掩膜. 体素值只能是 [`BACKGROUND`] 或 [`BODY`].
#[derive(Debug, Clone, PartialEq)]
pub struct BodyMask {
    geometry: Geometry,
    data: Array3<u8>,
}

impl GridAttr for BodyMask {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for BodyMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BodyMask {
    /// 由二值数据和物理空间信息直接创建掩膜.
    ///
    /// 若某一维度为 0 则返回 `Err`. 非零体素一律视为身体.
    pub fn new(mut data: Array3<u8>, geometry: Geometry) -> BedResult<Self> {
        check_shape(data.dim())?;
        data.mapv_inplace(|p| if is_background(p) { BACKGROUND } else { BODY });
        Ok(Self { geometry, data })
    }

    /// 由已保证二值化的数据创建掩膜. 仅供内部流水线使用.
    #[inline]
    pub(crate) fn from_binary(data: Array3<u8>, geometry: Geometry) -> Self {
        debug_assert!(data.iter().all(|&p| p == BACKGROUND || p == BODY));
        Self { geometry, data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获取 3D 掩膜 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, u8> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 位置 `pos` 是否属于身体. 越界时 panic.
    #[inline]
    pub fn is_body(&self, pos: Idx3d) -> bool {
        is_body(self.data[pos])
    }

    /// 获取身体体素个数.
    #[inline]
    pub fn count_body(&self) -> usize {
        self.data.iter().filter(|&&p| is_body(p)).count()
    }

    /// 获取背景体素个数.
    #[inline]
    pub fn count_background(&self) -> usize {
        self.size() - self.count_body()
    }

    /// 身体体素的实际体积, 以立方毫米为单位.
    #[inline]
    pub fn body_volume_mm3(&self) -> f64 {
        self.count_body() as f64 * self.voxel()
    }

    /// 转换为 `0.0 / 1.0` 取值的体数据, 便于按强度图像格式保存.
    pub fn to_volume(&self) -> Volume {
        Volume {
            geometry: self.geometry.clone(),
            data: self.data.mapv(f32::from),
        }
    }

    /// 拆分为物理空间信息和底层数据.
    #[inline]
    pub fn into_parts(self) -> (Geometry, Array3<u8>) {
        (self.geometry, self.data)
    }
}

/// 检查两个网格形状是否一致.
pub(crate) fn ensure_same_shape(expected: Idx3d, found: Idx3d) -> BedResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(BedError::ShapeMismatch { expected, found })
    }
}
