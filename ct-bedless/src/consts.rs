//! 通用常量.

/// 身体掩膜的标签值.
pub mod label {
    /// 掩膜中, 背景 (空气, 床板, 杂物) 的体素值.
    pub const BACKGROUND: u8 = 0;

    /// 掩膜中, 身体的体素值.
    pub const BODY: u8 = 1;

    /// 体素是否是身体?
    #[inline]
    pub const fn is_body(p: u8) -> bool {
        matches!(p, BODY)
    }

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }
}

/// 单通道颜色.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;
}

/// CT HU 值常量.
pub mod hu {
    /// 标准 CT 空气值. 身体外的体素会被覆写为该值.
    pub const AIR: f32 = -1024.0;

    /// 身体阈值窗口下限 (闭区间). 用于排除空气和大部分床板.
    pub const BODY_LOWER: f32 = -300.0;

    /// 身体阈值窗口上限 (闭区间). 保留骨骼和金属伪影.
    pub const BODY_UPPER: f32 = 3071.0;

    /// 掩膜覆写的强度下限. 不高于该值的体素通常是重建视野外的填充值.
    pub const PADDING_FLOOR: f32 = -3000.0;
}

/// 水平方向默认降采样倍数.
pub const DOWNSAMPLE_FACTOR: usize = 3;

/// 形态学开运算默认球半径 (体素).
pub const OPENING_RADIUS: usize = 3;

/// 形态学闭运算默认球半径 (体素).
pub const CLOSING_RADIUS: usize = 40;

/// 掩膜线性升采样后的默认二值化门限.
pub const MASK_CUTOFF: f32 = 0.5;
