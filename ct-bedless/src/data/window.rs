#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width). 用于将 HU 值映射为灰度.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl Default for CtWindow {
    #[inline]
    fn default() -> Self {
        Self::from_body_visual()
    }
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 构建一个便于展示软组织和身体轮廓的 CT 窗口. 该窗口的窗位为
    /// 40, 窗宽为 400.
    #[inline]
    pub const fn from_body_visual() -> CtWindow {
        Self {
            level: 40.0,
            width: 400.0,
        }
    }

    /// 构建一个便于区分空气, 床板和身体的宽窗口. 该窗口的窗位为 -400, 窗宽为 1800.
    #[inline]
    pub const fn from_wide_visual() -> CtWindow {
        Self {
            level: -400.0,
            width: 1800.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素整数值 (0 <= value <= 255)
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, ct: f32) -> Option<u8> {
        self.eval_f32(ct).map(|g| g as u8)
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, ct: f32) -> Option<f32> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if ct <= lb {
            Some(0.0)
        } else if ct >= self.upper_bound() {
            Some(255.0)
        } else {
            // 255, not 256.
            Some((ct - lb) / self.width() * 255.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::CtWindow;

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(CtWindow::new(0.0, -1.0).is_none());
        assert!(CtWindow::new(0.0, 0.0).is_none());
        assert!(CtWindow::new(2e5, 10.0).is_none());
        assert!(CtWindow::new(40.0, 400.0).is_some());
    }

    #[test]
    fn test_ct_window_body() {
        // [-160, 240]
        let ct = CtWindow::default();
        assert_eq!(ct, CtWindow::from_body_visual());
        assert_eq!(ct.lower_bound(), -160.0);
        assert_eq!(ct.upper_bound(), 240.0);

        assert_eq!(ct.eval(f32::NAN), None);
        assert_eq!(ct.eval(f32::INFINITY), None);
        assert_eq!(ct.eval(-1024.0), Some(0));
        assert_eq!(ct.eval(3071.0), Some(255));

        assert_eq!(ct.eval(-160.0), Some(0));
        assert!(ct.eval_f32(-159.9).unwrap() > 0.0);
        assert!(float_eq(ct.eval_f32(40.0).unwrap(), 127.5));
        assert_eq!(ct.eval(40.0), Some(127));
        assert_eq!(ct.eval(140.0).unwrap(), (255.0 * 0.75) as u8);
        assert_eq!(ct.eval(240.0), Some(255));
    }

    /// 宽窗口中, 空气, 床板和软组织的灰度应严格递增.
    #[test]
    fn test_ct_window_wide() {
        let ct = CtWindow::from_wide_visual();
        let air = ct.eval(-1024.0).unwrap();
        let bed = ct.eval(-500.0).unwrap();
        let tissue = ct.eval(40.0).unwrap();
        assert_eq!(ct.eval(-1300.0), Some(0));
        assert!(air < bed && bed < tissue);
    }
}
