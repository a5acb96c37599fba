//! nii 格式 3D CT 扫描的读写.
//!
//! 该模块是流水线核心之外的 I/O 层. 核心只接收 [`Volume`], 并返回新的 [`Volume`].

use std::path::Path;

use ndarray::{Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use num::ToPrimitive;

use super::geometry::{Geometry, Mat3, IDENTITY};
use super::{ensure_same_shape, GridAttr, Volume};
use crate::error::{BedError, BedResult};
use crate::Idx3d;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 打开 nii 文件错误.
#[derive(Debug)]
pub enum OpenScanError {
    /// 底层 nifti 读取错误.
    Nifti(nifti::NiftiError),

    /// 数据不是 3D 体数据 (或只含单个时间点的 4D 数据). 参数为实际维数.
    NotVolume(usize),

    /// header 中的空间信息无法构成合法的 [`Geometry`].
    Geometry(BedError),
}

impl std::fmt::Display for OpenScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenScanError::Nifti(e) => write!(f, "nifti 读取错误: {e}"),
            OpenScanError::NotVolume(n) => write!(f, "期望 3D 体数据, 实际为 {n} 维"),
            OpenScanError::Geometry(e) => write!(f, "header 空间信息非法: {e}"),
        }
    }
}

impl std::error::Error for OpenScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenScanError::Nifti(e) => Some(e),
            OpenScanError::Geometry(e) => Some(e),
            OpenScanError::NotVolume(_) => None,
        }
    }
}

impl From<nifti::NiftiError> for OpenScanError {
    fn from(value: nifti::NiftiError) -> Self {
        OpenScanError::Nifti(value)
    }
}

/// nii 格式 3D CT 扫描, 包括原始 header 和体数据 (HU).
///
/// 写回文件时会以原始 header 为参照, 因此输出与输入在空间上逐体素对齐.
#[derive(Debug, Clone)]
pub struct CtScan {
    header: BoxedHeader,
    volume: Volume,
}

/// 将 header 中的 (W, H, z) 转换成 (z, H, W).
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

impl CtScan {
    /// 打开 nii (或 nii.gz) 文件格式的 3D CT 扫描. `path` 为文件的本地路径.
    ///
    /// 体素值会按 header 中的 `scl_slope`, `scl_inter` 换算为 HU.
    /// 允许只含单个时间点的 4D 文件.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenScanError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        let geometry = geometry_from_header(&header).map_err(OpenScanError::Geometry)?;

        let mut data = obj.into_volume().into_ndarray::<f32>()?;
        while data.ndim() > 3 && data.shape().last() == Some(&1) {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }
        let ndim = data.ndim();

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| OpenScanError::NotVolume(ndim))?
            .permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert_eq!(data.dim(), get_shape_from_header(&header));

        let volume = Volume::new(data, geometry).map_err(OpenScanError::Geometry)?;
        Ok(Self { header, volume })
    }

    /// 为不来自文件的体数据合成一个 header (维度, 体素间距, sform).
    ///
    /// 若某一维度超出 nifti 格式的表示范围, 返回 `Err(BedError::TooLarge)`.
    pub fn from_volume(volume: Volume) -> BedResult<Self> {
        let shape = volume.shape();
        let (z, h, w) = shape;
        let to_dim = |n: usize| n.to_u16().ok_or(BedError::TooLarge(shape));
        let (z, h, w) = (to_dim(z)?, to_dim(h)?, to_dim(w)?);

        let mut header = Box::<NiftiHeader>::default();
        header.dim = [3, w as _, h as _, z as _, 1, 1, 1, 1];
        let [sz, sh, sw] = volume.pix_dim();
        header.pixdim = [1.0, sw as f32, sh as f32, sz as f32, 1.0, 1.0, 1.0, 1.0];

        // (z, h, w) 列顺序 -> nifti (i, j, k) = (w, h, z) 列顺序.
        let g = volume.geometry();
        let d = g.direction();
        let spacing = g.spacing();
        let origin = g.origin();
        let row = |r: usize| -> [f32; 4] {
            [
                (d[r][2] * spacing[2]) as f32,
                (d[r][1] * spacing[1]) as f32,
                (d[r][0] * spacing[0]) as f32,
                origin[r] as f32,
            ]
        };
        header.sform_code = 1;
        header.qform_code = 0;
        header.srow_x = row(0);
        header.srow_y = row(1);
        header.srow_z = row(2);
        Ok(Self { header, volume })
    }

    /// 获取 header 部分.
    #[inline]
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// 获取体数据.
    #[inline]
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// 丢弃 header, 只保留体数据.
    #[inline]
    pub fn into_volume(self) -> Volume {
        self.volume
    }

    /// 保持 header 不变, 替换体数据. 新旧数据形状必须一致.
    pub fn with_volume(&self, volume: Volume) -> BedResult<Self> {
        ensure_same_shape(self.volume.shape(), volume.shape())?;
        Ok(Self {
            header: self.header.clone(),
            volume,
        })
    }

    /// 以 `f32` 格式写入 nii (或 nii.gz, 取决于扩展名) 文件.
    ///
    /// 原 header 作为参照, 只重置 `scl_slope` 和 `scl_inter`,
    /// 因为写入的已经是换算后的 HU 值.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        let mut header = (*self.header).clone();
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;

        // [z, H, W] -> [W, H, z].
        let data = self.volume.data().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)
    }
}

impl GridAttr for CtScan {
    #[inline]
    fn geometry(&self) -> &Geometry {
        self.volume.geometry()
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.volume.shape()
    }
}

/// 从 header 中提取物理空间信息.
///
/// 优先使用 sform (`sform_code > 0`), 其次使用 qform 四元数 (`qform_code > 0`),
/// 都不存在时使用单位方向矩阵和零原点. 坐标保持 nifti 的 RAS 约定.
pub fn geometry_from_header(h: &NiftiHeader) -> BedResult<Geometry> {
    let [qfac, pw, ph, pz, ..] = h.pixdim;
    let spacing = [pz.abs() as f64, ph.abs() as f64, pw.abs() as f64];

    // `columns[i]` 是 nifti 第 i 个索引轴 (w, h, z) 的方向.
    let (columns, origin) = if h.sform_code > 0 {
        let rows = [h.srow_x, h.srow_y, h.srow_z].map(|r| r.map(f64::from));
        let mut columns = [[0.0; 3]; 3];
        for (i, col) in columns.iter_mut().enumerate() {
            *col = [rows[0][i], rows[1][i], rows[2][i]];
            let norm = col.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                col.iter_mut().for_each(|v| *v /= norm);
            }
        }
        (columns, [rows[0][3], rows[1][3], rows[2][3]])
    } else if h.qform_code > 0 {
        let r = quaternion_to_rotation(
            h.quatern_b as f64,
            h.quatern_c as f64,
            h.quatern_d as f64,
        );
        let qfac = if qfac < 0.0 { -1.0 } else { 1.0 };
        let columns = [
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2] * qfac, r[1][2] * qfac, r[2][2] * qfac],
        ];
        let origin = [h.quatern_x as f64, h.quatern_y as f64, h.quatern_z as f64];
        (columns, origin)
    } else {
        let columns = [IDENTITY[0], IDENTITY[1], IDENTITY[2]];
        (columns, [0.0; 3])
    };

    // (w, h, z) 列 -> (z, h, w) 列.
    let [cw, ch, cz] = columns;
    let mut direction: Mat3 = [[0.0; 3]; 3];
    for (r, row) in direction.iter_mut().enumerate() {
        *row = [cz[r], ch[r], cw[r]];
    }
    Geometry::new(spacing, origin, direction)
}

/// nifti 四元数 `(b, c, d)` 转换为旋转矩阵. `a` 由单位四元数约束推出.
fn quaternion_to_rotation(b: f64, c: f64, d: f64) -> Mat3 {
    let a2 = 1.0 - (b * b + c * c + d * d);
    let (a, b, c, d) = if a2 < 1e-7 {
        // 此时 a 视为 0, 并重新归一化 (b, c, d).
        let n = (b * b + c * c + d * d).sqrt();
        (0.0, b / n, c / n, d / n)
    } else {
        (a2.sqrt(), b, c, d)
    };
    [
        [
            a * a + b * b - c * c - d * d,
            2.0 * (b * c - a * d),
            2.0 * (b * d + a * c),
        ],
        [
            2.0 * (b * c + a * d),
            a * a + c * c - b * b - d * d,
            2.0 * (c * d - a * b),
        ],
        [
            2.0 * (b * d - a * c),
            2.0 * (c * d + a * b),
            a * a + d * d - c * c - b * b,
        ],
    ]
}
