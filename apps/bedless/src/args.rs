//! 命令行参数.

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{ArgAction, Parser};
use ct_bedless::consts::{hu, CLOSING_RADIUS, DOWNSAMPLE_FACTOR, MASK_CUTOFF, OPENING_RADIUS};
use ct_bedless::{
    BedRemovalConfig, HuRange, Interpolation, MaskRule, MaskUpsampling, OutputMode,
};

/// 去除 3D CT 扫描 (nii / nii.gz) 中的扫描床板及身体外杂物.
#[derive(Parser, Debug)]
#[command(name = "bedless", version, about, long_about = None)]
pub struct Args {
    /// 输入 nii / nii.gz 文件
    pub input: PathBuf,

    /// 输出 nii / nii.gz 文件. 使用输入文件的 header
    pub output: PathBuf,

    /// 输出身体掩膜 (0/1), 而不是去除床板后的扫描
    #[arg(long)]
    pub body_mask: bool,

    /// 水平降采样倍数
    #[arg(long, default_value_t = DOWNSAMPLE_FACTOR)]
    pub factor: usize,

    /// 身体阈值窗口下限 (HU)
    #[arg(long, default_value_t = hu::BODY_LOWER, allow_negative_numbers = true)]
    pub lower: f32,

    /// 身体阈值窗口上限 (HU)
    #[arg(long, default_value_t = hu::BODY_UPPER, allow_negative_numbers = true)]
    pub upper: f32,

    /// 开运算球半径 (降采样网格体素)
    #[arg(long, default_value_t = OPENING_RADIUS)]
    pub opening: usize,

    /// 闭运算球半径 (降采样网格体素)
    #[arg(long, default_value_t = CLOSING_RADIUS)]
    pub closing: usize,

    /// 身体以外体素的覆写值 (HU)
    #[arg(long, default_value_t = hu::AIR, allow_negative_numbers = true)]
    pub air: f32,

    /// 降采样时使用最近邻插值
    #[arg(long)]
    pub nearest_intensity: bool,

    /// 掩膜升采样时使用最近邻插值
    #[arg(long, conflicts_with = "mask_cutoff")]
    pub nearest_mask: bool,

    /// 掩膜线性升采样后的二值化门限, 位于 (0, 1]
    #[arg(long, default_value_t = MASK_CUTOFF)]
    pub mask_cutoff: f32,

    /// 只覆写强度高于该值的身体外体素 (HU). 例如 -3000 可保留视野外填充值
    #[arg(long, allow_negative_numbers = true)]
    pub intensity_floor: Option<f32>,

    /// 额外保存中间切片的预览图 (png)
    #[arg(long)]
    pub preview: Option<PathBuf>,

    /// 日志详细程度. 可重复, 如 `-vv`
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// 由命令行参数构建流水线参数.
    pub fn to_config(&self) -> Result<BedRemovalConfig> {
        let threshold = HuRange::new(self.lower, self.upper);
        ensure!(
            threshold.is_some(),
            "非法阈值窗口 [{}, {}]",
            self.lower,
            self.upper
        );

        let mut config = BedRemovalConfig::default()
            .with_factor(self.factor)
            .with_opening_radius(self.opening)
            .with_closing_radius(self.closing)
            .with_air(self.air);
        if let Some(threshold) = threshold {
            config = config.with_threshold(threshold);
        }
        if self.body_mask {
            config = config.with_output(OutputMode::BodyMask);
        }
        if self.nearest_intensity {
            config = config.with_interpolation(Interpolation::Nearest);
        }
        config = config.with_mask_upsampling(if self.nearest_mask {
            MaskUpsampling::Nearest
        } else {
            MaskUpsampling::Linear {
                cutoff: self.mask_cutoff,
            }
        });
        if let Some(floor) = self.intensity_floor {
            config = config.with_mask_rule(MaskRule::IntensityFloor(floor));
        }
        Ok(config)
    }

    /// 日志级别.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
