//! 3D 二值形态学操作.
//!
//! 结构元为体素索引空间中各向同性的球. 腐蚀与膨胀均由精确平方欧氏距离变换得到,
//! 因此运行时间与球半径无关.

use itertools::iproduct;
use ndarray::{s, Array3, ArrayView3};

use crate::consts::label::*;
use crate::error::{check_shape, BedResult};
use crate::{BodyMask, GridAttr};

mod edt;

/// 3D 球形结构元.
///
/// 半径为 `r` 的球包含所有满足 `|d|^2 <= r * (r + 1)` 的整数偏移 `d`,
/// 即与中心距离不超过 `r + 0.5` 的格点. 半径 0 只包含中心体素.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ball {
    radius: usize,
}

impl Ball {
    /// 以 `radius` 为半径构建球.
    #[inline]
    pub const fn new(radius: usize) -> Self {
        Self { radius }
    }

    /// 球半径.
    #[inline]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// 球内偏移的最大平方长度.
    #[inline]
    pub const fn limit(&self) -> usize {
        self.radius * (self.radius + 1)
    }

    /// 偏移 `(dz, dh, dw)` 是否位于球内.
    #[inline]
    pub fn contains(&self, (dz, dh, dw): (isize, isize, isize)) -> bool {
        let d2 = dz * dz + dh * dh + dw * dw;
        d2 >= 0 && (d2 as usize) <= self.limit()
    }

    /// 球内所有偏移. 无顺序保证.
    pub fn offsets(&self) -> Vec<(isize, isize, isize)> {
        let r = self.radius as isize;
        iproduct!(-r..=r, -r..=r, -r..=r)
            .filter(|&d| self.contains(d))
            .collect()
    }
}

/// 腐蚀. 网格外部视为前景.
fn erode_raw(data: ArrayView3<'_, u8>, ball: Ball) -> Array3<u8> {
    if ball.radius() == 0 {
        return data.to_owned();
    }
    let dist = edt::squared_edt(data.mapv(is_background).view());
    let limit = ball.limit() as f64;
    let mut out = data.to_owned();
    out.zip_mut_with(&dist, |p, &d| {
        if is_body(*p) && d <= limit {
            *p = BACKGROUND;
        }
    });
    out
}

/// 膨胀. 网格外部视为背景.
fn dilate_raw(data: ArrayView3<'_, u8>, ball: Ball) -> Array3<u8> {
    if ball.radius() == 0 {
        return data.to_owned();
    }
    let dist = edt::squared_edt(data.mapv(is_body).view());
    let limit = ball.limit() as f64;
    dist.mapv(|d| if d <= limit { BODY } else { BACKGROUND })
}

/// 形态学实现块
impl BodyMask {
    /// 以半径为 `radius` 的球对掩膜做 3D 腐蚀, 返回新的掩膜.
    ///
    /// 一个身体体素被保留, 当且仅当它周围球内的所有网格内体素都是身体.
    /// 网格外部视为身体, 因此接触视野边缘的身体不会从边缘处被腐蚀.
    pub fn erode(&self, radius: usize) -> BodyMask {
        let data = erode_raw(self.data(), Ball::new(radius));
        BodyMask::from_binary(data, self.geometry().clone())
    }

    /// 以半径为 `radius` 的球对掩膜做 3D 膨胀, 返回新的掩膜. 网格外部视为背景.
    pub fn dilate(&self, radius: usize) -> BodyMask {
        let data = dilate_raw(self.data(), Ball::new(radius));
        BodyMask::from_binary(data, self.geometry().clone())
    }

    /// 形态学开运算 (先腐蚀后膨胀). 去除细小的, 尺寸小于结构元的结构.
    ///
    /// 开运算的结果不会多于原掩膜的身体体素.
    pub fn opening(&self, radius: usize) -> BodyMask {
        let ball = Ball::new(radius);
        let data = dilate_raw(erode_raw(self.data(), ball).view(), ball);
        BodyMask::from_binary(data, self.geometry().clone())
    }

    /// 形态学闭运算 (先膨胀后腐蚀). 填充尺寸小于结构元的空洞与缝隙.
    ///
    /// 计算前在各个方向用 `radius` 层背景填充网格, 结束后裁剪回原形状,
    /// 因此结果等价于在无限背景上计算的闭运算, 且不会少于原掩膜的身体体素.
    ///
    /// 若填充后的网格体素个数溢出, 返回 `Err(BedError::TooLarge)`.
    pub fn closing(&self, radius: usize) -> BedResult<BodyMask> {
        if radius == 0 {
            return Ok(self.clone());
        }
        let ball = Ball::new(radius);
        let (z, h, w) = self.shape();
        let pad = |n: usize| n.saturating_add(radius.saturating_mul(2));
        let padded_shape = (pad(z), pad(h), pad(w));
        check_shape(padded_shape)?;

        let r = radius;
        let mut padded = Array3::from_elem(padded_shape, BACKGROUND);
        padded
            .slice_mut(s![r..r + z, r..r + h, r..r + w])
            .assign(&self.data());

        let closed = erode_raw(dilate_raw(padded.view(), ball).view(), ball);
        let data = closed.slice(s![r..r + z, r..r + h, r..r + w]).to_owned();
        Ok(BodyMask::from_binary(data, self.geometry().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::Ball;
    use crate::consts::label::*;
    use crate::{BodyMask, Geometry, GridAttr, Idx3d};
    use itertools::iproduct;
    use ndarray::{s, Array3};

    fn mask_from(data: Array3<u8>) -> BodyMask {
        BodyMask::new(data, Geometry::from_spacing([1.0; 3]).unwrap()).unwrap()
    }

    /// 在网格内偏移 `pos`, 越界返回 `None`.
    fn shift((z, h, w): Idx3d, (dz, dh, dw): (isize, isize, isize), shape: Idx3d) -> Option<Idx3d> {
        let z = z.checked_add_signed(dz)?;
        let h = h.checked_add_signed(dh)?;
        let w = w.checked_add_signed(dw)?;
        (z < shape.0 && h < shape.1 && w < shape.2).then_some((z, h, w))
    }

    fn brute_erode(m: &BodyMask, radius: usize) -> Array3<u8> {
        let offsets = Ball::new(radius).offsets();
        let shape = m.shape();
        Array3::from_shape_fn(shape, |p| {
            let keep = m.is_body(p)
                && offsets
                    .iter()
                    .filter_map(|&d| shift(p, d, shape))
                    .all(|q| m.is_body(q));
            if keep {
                BODY
            } else {
                BACKGROUND
            }
        })
    }

    fn brute_dilate(m: &BodyMask, radius: usize) -> Array3<u8> {
        let offsets = Ball::new(radius).offsets();
        let shape = m.shape();
        Array3::from_shape_fn(shape, |p| {
            let hit = offsets
                .iter()
                .filter_map(|&d| shift(p, d, shape))
                .any(|q| m.is_body(q));
            if hit {
                BODY
            } else {
                BACKGROUND
            }
        })
    }

    /// 一个确定性的 "随机" 掩膜.
    fn noisy_mask(shape: Idx3d) -> BodyMask {
        mask_from(Array3::from_shape_fn(shape, |(z, h, w)| {
            ((z * 31 + h * 17 + w * 7 + z * h * w) % 5 != 0) as u8
        }))
    }

    #[test]
    fn test_ball() {
        assert_eq!(Ball::new(0).offsets(), vec![(0, 0, 0)]);
        // 中心, 6 个面邻居和 12 个棱邻居.
        assert_eq!(Ball::new(1).offsets().len(), 19);
        assert_eq!(Ball::new(1).limit(), 2);
        let b3 = Ball::new(3);
        assert!(b3.contains((3, 0, 0)));
        assert!(b3.contains((3, 1, 1)));
        assert!(!b3.contains((4, 0, 0)));
        assert!(!b3.contains((3, 2, 0)));
    }

    #[test]
    fn test_erode_dilate_brute_force() {
        let m = noisy_mask((6, 8, 7));
        for radius in 0..=3 {
            assert_eq!(m.erode(radius).data(), brute_erode(&m, radius), "erode r={radius}");
            assert_eq!(m.dilate(radius).data(), brute_dilate(&m, radius), "dilate r={radius}");
        }
    }

    /// 全身体或全背景掩膜在所有操作下保持不变.
    #[test]
    fn test_uniform_invariance() {
        for label in [BACKGROUND, BODY] {
            let m = mask_from(Array3::from_elem((5, 6, 7), label));
            assert_eq!(m.erode(2), m);
            assert_eq!(m.dilate(2), m);
            assert_eq!(m.opening(3), m);
            assert_eq!(m.closing(4).unwrap(), m);
        }
    }

    #[test]
    fn test_opening_closing_monotone() {
        let m = noisy_mask((9, 10, 11));
        let n = m.count_body();
        for radius in 0..=3 {
            let opened = m.opening(radius);
            let closed = m.closing(radius).unwrap();
            assert!(opened.count_body() <= n);
            assert!(closed.count_body() >= n);
            for p in iproduct!(0..9, 0..10, 0..11) {
                assert!(!opened.is_body(p) || m.is_body(p));
                assert!(!m.is_body(p) || closed.is_body(p));
            }
        }
    }

    /// 开运算去除比结构元薄的板状结构, 保留大块身体.
    #[test]
    fn test_opening_removes_thin_plate() {
        let mut data = Array3::zeros((12, 30, 30));
        data.slice_mut(s![.., 4..18, 4..18]).fill(BODY);
        // 两层厚的板.
        data.slice_mut(s![.., 24..26, ..]).fill(BODY);
        let m = mask_from(data);
        let opened = m.opening(2);

        assert!(opened
            .data()
            .slice(s![.., 24..26, ..])
            .iter()
            .all(|&p| p == BACKGROUND));
        assert!(opened
            .data()
            .slice(s![.., 6..16, 6..16])
            .iter()
            .all(|&p| p == BODY));
        for p in iproduct!(0..12, 0..30, 0..30) {
            assert!(!opened.is_body(p) || m.is_body(p));
        }
    }

    /// 闭运算填充封闭空洞.
    #[test]
    fn test_closing_fills_cavity() {
        let mut data = Array3::zeros((16, 16, 16));
        data.slice_mut(s![2..14, 2..14, 2..14]).fill(BODY);
        data.slice_mut(s![6..10, 6..10, 6..10]).fill(BACKGROUND);
        let m = mask_from(data);
        let closed = m.closing(3).unwrap();
        assert!(closed
            .data()
            .slice(s![2..14, 2..14, 2..14])
            .iter()
            .all(|&p| p == BODY));
        // 立方体的凸包之外没有新增身体体素.
        assert_eq!(closed.count_body(), 12 * 12 * 12);
    }

    /// 闭运算在网格边缘与无限背景上的结果一致: 两个贴着边缘的块之间的缝隙被桥接,
    /// 而块本身不会因边缘被削去.
    #[test]
    fn test_closing_border_safe() {
        let mut data = Array3::zeros((4, 10, 12));
        data.slice_mut(s![.., 0..4, 0..5]).fill(BODY);
        data.slice_mut(s![.., 0..4, 7..12]).fill(BODY);
        let m = mask_from(data);
        let closed = m.closing(2).unwrap();
        assert!(closed
            .data()
            .slice(s![.., 0..4, ..])
            .iter()
            .all(|&p| p == BODY));
        assert!(closed
            .data()
            .slice(s![.., 5.., ..])
            .iter()
            .all(|&p| p == BACKGROUND));
        assert_eq!(closed.count_body(), 4 * 4 * 12);
    }
}
