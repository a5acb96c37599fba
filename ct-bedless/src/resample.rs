//! 恒等变换下的网格重采样: 水平降采样与掩膜升采样.
//!
//! 重采样不移动物体的物理位置. 目标网格每个体素中心先映射为物理坐标,
//! 再映射为源网格中的连续索引, 最后按插值方式取值.
//! 落在源网格之外的采样点被截断到最近的边缘体素.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use ndarray::{Array3, ArrayView3};

use crate::consts::label::{BACKGROUND, BODY};
use crate::consts::MASK_CUTOFF;
use crate::data::geometry::IndexMap;
use crate::error::{check_shape, BedError, BedResult};
use crate::{BodyMask, Geometry, GridAttr, Idx3d, Volume};

/// 强度插值方式.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    /// 三线性插值.
    #[default]
    Linear,

    /// 最近邻插值 (0.5 向上取整).
    Nearest,
}

/// 掩膜升采样策略.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaskUpsampling {
    /// 最近邻取标签, 结果天然是二值的.
    Nearest,

    /// 对 0/1 标签做三线性插值, 再以 `cutoff` 重新二值化: 插值结果 `>= cutoff` 为身体.
    ///
    /// `cutoff` 必须位于 `(0, 1]`. 取 `f32::MIN_POSITIVE` 时, 任何非零插值都视为身体.
    Linear {
        /// 二值化门限.
        cutoff: f32,
    },
}

impl Default for MaskUpsampling {
    #[inline]
    fn default() -> Self {
        MaskUpsampling::Linear {
            cutoff: MASK_CUTOFF,
        }
    }
}

impl MaskUpsampling {
    /// 检查参数是否合法.
    pub fn validate(&self) -> BedResult<()> {
        match *self {
            MaskUpsampling::Nearest => Ok(()),
            MaskUpsampling::Linear { cutoff } if cutoff > 0.0 && cutoff <= 1.0 => Ok(()),
            MaskUpsampling::Linear { .. } => {
                Err(BedError::InvalidConfig("掩膜门限必须位于 (0, 1]"))
            }
        }
    }
}

/// 计算按 `factor` 水平降采样后的网格.
///
/// 新的高和宽为 `h / factor`, `w / factor` (截断), 切片数不变.
/// 水平间距按 `旧尺寸 / 新尺寸` 缩放, 因此物理覆盖范围不变. 原点和方向保持不变.
pub fn downsampled_grid(
    geometry: &Geometry,
    shape: Idx3d,
    factor: usize,
) -> BedResult<(Geometry, Idx3d)> {
    if factor == 0 {
        return Err(BedError::InvalidConfig("降采样倍数必须为正整数"));
    }
    check_shape(shape)?;
    let (z, h, w) = shape;
    let (new_h, new_w) = (h / factor, w / factor);
    if new_h == 0 || new_w == 0 {
        return Err(BedError::DegenerateDownsample { shape, factor });
    }

    let [sz, sh, sw] = geometry.spacing();
    let spacing = [
        sz,
        sh * h as f64 / new_h as f64,
        sw * w as f64 / new_w as f64,
    ];
    Ok((geometry.with_spacing(spacing)?, (z, new_h, new_w)))
}

/// 将体数据水平降采样 `factor` 倍, 切片方向保持不变.
///
/// 若降采样后某一维度为 0, 返回 `Err(BedError::DegenerateDownsample)`.
pub fn downsample(volume: &Volume, factor: usize, interp: Interpolation) -> BedResult<Volume> {
    let (geometry, shape) = downsampled_grid(volume.geometry(), volume.shape(), factor)?;
    let map = IndexMap::between(&geometry, volume.geometry())?;
    let src = volume.data();
    let data = match interp {
        Interpolation::Linear => resample(shape, &map, |c| sample_linear(&src, c) as f32),
        Interpolation::Nearest => resample(shape, &map, |c| src[nearest_index(src.dim(), c)]),
    };
    Volume::new(data, geometry)
}

/// 将掩膜重采样到 `geometry` 描述的、形状为 `shape` 的网格上. 输出总是二值的.
pub fn upsample_mask(
    mask: &BodyMask,
    geometry: &Geometry,
    shape: Idx3d,
    policy: MaskUpsampling,
) -> BedResult<BodyMask> {
    policy.validate()?;
    check_shape(shape)?;
    let map = IndexMap::between(geometry, mask.geometry())?;
    let src = mask.data();
    let data = match policy {
        MaskUpsampling::Nearest => resample(shape, &map, |c| src[nearest_index(src.dim(), c)]),
        MaskUpsampling::Linear { cutoff } => {
            let cutoff = cutoff as f64;
            resample(shape, &map, |c| {
                if sample_linear(&src, c) >= cutoff {
                    BODY
                } else {
                    BACKGROUND
                }
            })
        }
    };
    Ok(BodyMask::from_binary(data, geometry.clone()))
}

/// 对目标网格的每个体素, 以其在源网格中的连续索引调用 `sample`.
#[inline]
fn resample<T, F>(shape: Idx3d, map: &IndexMap, mut sample: F) -> Array3<T>
where
    F: FnMut([f64; 3]) -> T,
{
    Array3::from_shape_fn(shape, |pos| sample(map.apply(pos)))
}

/// 最近邻取整 (0.5 向上取整), 并截断到 `[0, n - 1]`.
#[inline]
fn nearest_index((z, h, w): Idx3d, c: [f64; 3]) -> Idx3d {
    let round = |v: f64, n: usize| ((v + 0.5).floor().max(0.0) as usize).min(n - 1);
    (round(c[0], z), round(c[1], h), round(c[2], w))
}

/// 连续坐标 `v` 截断到 `[0, n - 1]` 后的下邻居, 上邻居和权重.
#[inline]
fn linear_neighbors(v: f64, n: usize) -> (usize, usize, f64) {
    let v = v.clamp(0.0, (n - 1) as f64);
    let i0 = v.floor() as usize;
    let i1 = (i0 + 1).min(n - 1);
    (i0, i1, v - i0 as f64)
}

/// 三线性插值. 越界坐标截断到边缘体素.
fn sample_linear<T>(src: &ArrayView3<'_, T>, c: [f64; 3]) -> f64
where
    T: Copy + Into<f64>,
{
    let (nz, nh, nw) = src.dim();
    let (z0, z1, tz) = linear_neighbors(c[0], nz);
    let (h0, h1, th) = linear_neighbors(c[1], nh);
    let (w0, w1, tw) = linear_neighbors(c[2], nw);

    let at = |z: usize, h: usize, w: usize| -> f64 { src[(z, h, w)].into() };
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let c00 = lerp(at(z0, h0, w0), at(z0, h0, w1), tw);
    let c01 = lerp(at(z0, h1, w0), at(z0, h1, w1), tw);
    let c10 = lerp(at(z1, h0, w0), at(z1, h0, w1), tw);
    let c11 = lerp(at(z1, h1, w0), at(z1, h1, w1), tw);
    lerp(lerp(c00, c01, th), lerp(c10, c11, th), tz)
}

#[cfg(test)]
mod tests {
    use super::{downsample, upsample_mask, Interpolation, MaskUpsampling};
    use crate::{BedError, BodyMask, Geometry, GridAttr, Volume};
    use ndarray::Array3;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// 整除时, 降采样后的体素恰好落在原体素中心上.
    #[test]
    fn test_downsample_divisible() {
        let geo = Geometry::from_spacing([2.0, 0.5, 0.5]).unwrap();
        let data = Array3::from_shape_fn((2, 6, 9), |(z, h, w)| (z * 100 + h * 10 + w) as f32);
        let v = Volume::new(data, geo).unwrap();

        for interp in [Interpolation::Linear, Interpolation::Nearest] {
            let d = downsample(&v, 3, interp).unwrap();
            assert_eq!(d.shape(), (2, 2, 3));
            assert_eq!(d.pix_dim(), [2.0, 1.5, 1.5]);
            assert_eq!(d.geometry().origin(), v.geometry().origin());
            for ((z, h, w), &hu) in d.data().indexed_iter() {
                assert!((hu - v[(z, 3 * h, 3 * w)]).abs() < 1e-4);
            }
        }
    }

    /// 不能整除时截断, 物理覆盖范围不变.
    #[test]
    fn test_downsample_truncation() {
        let geo = Geometry::from_spacing([2.5, 0.8, 0.7]).unwrap();
        let v = Volume::from_elem((2, 301, 301), geo, 40.0).unwrap();
        let d = downsample(&v, 3, Interpolation::Linear).unwrap();
        assert_eq!(d.shape(), (2, 100, 100));
        assert!(f64_eq(d.height_mm(), 0.8 * 3.01));
        assert!(f64_eq(d.width_mm(), 0.7 * 3.01));
        assert!(f64_eq(d.z_mm(), 2.5));
        for (a, b) in d.extent_mm().iter().zip(v.extent_mm()) {
            assert!(f64_eq(*a, b));
        }
        assert!(d.data().iter().all(|&hu| hu == 40.0));
    }

    #[test]
    fn test_downsample_degenerate() {
        let geo = Geometry::from_spacing([1.0; 3]).unwrap();
        let v = Volume::from_elem((5, 2, 2), geo, 0.0).unwrap();
        let e = downsample(&v, 3, Interpolation::Linear).unwrap_err();
        assert_eq!(
            e,
            BedError::DegenerateDownsample {
                shape: (5, 2, 2),
                factor: 3
            }
        );
        assert!(e.is_geometry_error());
        assert!(matches!(
            downsample(&v, 0, Interpolation::Linear),
            Err(BedError::InvalidConfig(_))
        ));
    }

    /// 降采样再升采样, 形状与物理范围都恢复, 均匀掩膜保持均匀 (包括边缘体素).
    #[test]
    fn test_round_trip_grid() {
        let geo = Geometry::from_spacing([2.5, 0.8, 0.8]).unwrap();
        let v = Volume::from_elem((3, 301, 302), geo.clone(), 40.0).unwrap();
        let d = downsample(&v, 3, Interpolation::Linear).unwrap();
        let coarse = BodyMask::new(Array3::ones(d.shape()), d.geometry().clone()).unwrap();

        for policy in [MaskUpsampling::default(), MaskUpsampling::Nearest] {
            let up = upsample_mask(&coarse, &geo, v.shape(), policy).unwrap();
            assert_eq!(up.shape(), (3, 301, 302));
            assert_eq!(up.geometry(), &geo);
            assert_eq!(up.count_body(), up.size());
        }
    }

    /// 一维情况: 粗网格 `[0, 1]`, 细网格间距为粗网格的 1/3.
    #[test]
    fn test_mask_upsample_policies() {
        let coarse_geo = Geometry::from_spacing([1.0, 3.0, 3.0]).unwrap();
        let fine_geo = Geometry::from_spacing([1.0, 1.0, 1.0]).unwrap();
        let mut data = Array3::zeros((1, 1, 2));
        data[(0, 0, 1)] = 1;
        let coarse = BodyMask::new(data, coarse_geo).unwrap();

        let run = |policy| {
            let m = upsample_mask(&coarse, &fine_geo, (1, 1, 6), policy).unwrap();
            m.data().iter().copied().collect::<Vec<u8>>()
        };
        assert_eq!(run(MaskUpsampling::default()), vec![0, 0, 1, 1, 1, 1]);
        assert_eq!(
            run(MaskUpsampling::Linear {
                cutoff: f32::MIN_POSITIVE
            }),
            vec![0, 1, 1, 1, 1, 1]
        );
        assert_eq!(run(MaskUpsampling::Nearest), vec![0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_mask_upsample_nearest_is_binary() {
        let coarse_geo = Geometry::from_spacing([1.0, 3.0, 3.0]).unwrap();
        let fine_geo = Geometry::from_spacing([1.0, 1.0, 1.0]).unwrap();
        let data = Array3::from_shape_fn((2, 4, 4), |(z, h, w)| ((z + h + w) % 2) as u8);
        let coarse = BodyMask::new(data, coarse_geo).unwrap();
        let up = upsample_mask(&coarse, &fine_geo, (2, 12, 12), MaskUpsampling::Nearest).unwrap();
        assert!(up.data().iter().all(|&p| p <= 1));
        // 细网格 (0, 3, 3) 对应粗网格 (0, 1, 1).
        assert_eq!(up[(0, 3, 3)], coarse[(0, 1, 1)]);
        assert_eq!(up[(1, 4, 0)], coarse[(1, 1, 0)]);
    }

    #[test]
    fn test_invalid_cutoff() {
        let geo = Geometry::from_spacing([1.0; 3]).unwrap();
        let m = BodyMask::new(Array3::ones((1, 1, 1)), geo.clone()).unwrap();
        for cutoff in [0.0, -1.0, 1.5, f32::NAN] {
            let policy = MaskUpsampling::Linear { cutoff };
            assert!(matches!(
                upsample_mask(&m, &geo, (1, 1, 1), policy),
                Err(BedError::InvalidConfig(_))
            ));
        }
    }
}
