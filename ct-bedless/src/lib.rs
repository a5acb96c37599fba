#![warn(missing_docs)]

//! 核心库. 从 3D CT 扫描中去除扫描床板 (bed) 及身体外的杂物.
//!
//! 流水线: 水平降采样 -> HU 阈值化 -> 3D 形态学开运算 -> 3D 形态学闭运算
//! -> 升采样回原网格 -> 身体以外的体素覆写为空气值.
//!
//! 该 crate 只提供 `safe` 接口, 且完全单线程. 所有步骤都返回新的网格, 不修改输入.
//!
//! # 注意
//!
//! 1. 所有 3D 数据都以 `(z, h, w)` 布局存储, 即 (切片, 行, 列).
//!   物理空间信息 ([`Geometry`]) 的 "按轴" 量也以同样顺序排列.
//! 2. 形态学结构元以体素为单位, 在降采样后的工作网格上计算,
//!   不考虑体素本身的各向异性.
//! 3. 非法输入 (空维度, 降采样退化, 形状不一致等) 以 [`BedError`] 返回, 不会 panic.
//!
//! # 功能
//!
//! ### 床板去除流水线 ✅
//!
//! 实现位于 `ct-bedless/src/pipeline.rs`, 参数位于 `ct-bedless/src/config.rs`.
//!
//! ### 恒等变换重采样 ✅
//!
//! 三线性 / 最近邻插值, 越界截断到边缘体素.
//!
//! 实现位于 `ct-bedless/src/resample.rs`.
//!
//! ### 基于距离变换的 3D 形态学 ✅
//!
//! 球形结构元的腐蚀, 膨胀, 开运算, 闭运算. 运行时间与半径无关.
//!
//! 实现位于 `ct-bedless/src/morph`.
//!
//! ### nii 文件读写与切片预览 ✅
//!
//! 实现位于 `ct-bedless/src/data`.

/// 二维索引.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

/// 3D 网格数据结构与 nii 文件读写.
mod data;

pub use data::geometry::{Mat3, IDENTITY};
pub use data::nii::{geometry_from_header, CtScan, OpenScanError};
pub use data::preview::SlicePreview;
pub use data::window::CtWindow;
pub use data::{BodyMask, Geometry, GridAttr, Volume};

pub mod consts;

mod error;
pub use error::{BedError, BedResult};

pub mod config;
pub use config::{BedRemovalConfig, OutputMode};

pub mod mask;
pub use mask::{apply_mask, MaskRule};

pub mod morph;
pub use morph::Ball;

pub mod pipeline;
pub use pipeline::{remove_bed, BedRemoval, BedRemovalOutput, Stage, StageReport};

pub mod resample;
pub use resample::{downsample, upsample_mask, Interpolation, MaskUpsampling};

pub mod threshold;
pub use threshold::HuRange;

pub mod prelude;
