//! 床板去除流水线: 降采样, 阈值, 开运算, 闭运算, 升采样, 覆写.
//!
//! 每一步都产生新的网格, 上一步的中间结果在下一步完成后即被释放.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::config::{BedRemovalConfig, OutputMode};
use crate::error::BedResult;
use crate::mask::apply_mask;
use crate::resample::{downsample, upsample_mask};
use crate::{BodyMask, Geometry, GridAttr, Idx3d, Volume};

/// 流水线阶段.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// 水平降采样.
    Downsample,
    /// HU 阈值化.
    Threshold,
    /// 开运算.
    Opening,
    /// 闭运算.
    Closing,
    /// 掩膜升采样.
    Upsample,
    /// 掩膜覆写.
    Mask,
}

/// 单次运行的统计信息.
#[derive(Clone, Debug, Default)]
pub struct StageReport {
    /// 原始网格形状.
    pub original_shape: Idx3d,

    /// 降采样后的工作网格形状.
    pub working_shape: Idx3d,

    /// 工作网格体素间距.
    pub working_spacing: [f64; 3],

    /// 阈值化后的身体体素个数 (工作网格).
    pub thresholded: usize,

    /// 开运算后的身体体素个数 (工作网格).
    pub opened: usize,

    /// 闭运算后的身体体素个数 (工作网格).
    pub closed: usize,

    /// 最终掩膜的身体体素个数 (原始网格).
    pub body: usize,

    timings: Vec<(Stage, Duration)>,
}

impl StageReport {
    #[inline]
    fn new(original_shape: Idx3d) -> Self {
        Self {
            original_shape,
            ..Default::default()
        }
    }

    /// 记录 `stage` 从 `since` 开始到现在的耗时.
    #[inline]
    fn record(&mut self, stage: Stage, since: Instant) {
        self.timings.push((stage, since.elapsed()));
    }

    /// 获取某一阶段的耗时. 若该阶段没有运行, 返回 `None`.
    pub fn elapsed(&self, stage: Stage) -> Option<Duration> {
        self.timings
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    /// 所有阶段的总耗时.
    pub fn total(&self) -> Duration {
        self.timings.iter().map(|(_, d)| *d).sum()
    }
}

/// 流水线输出. 两种输出都位于原始网格上.
#[derive(Clone, Debug, PartialEq)]
pub enum BedRemovalOutput {
    /// 去除床板后的强度体数据.
    BedRemoved(Volume),

    /// 身体掩膜.
    BodyMask(BodyMask),
}

impl BedRemovalOutput {
    /// 转换为强度体数据. 掩膜被转换为 `0.0 / 1.0` 取值.
    pub fn into_volume(self) -> Volume {
        match self {
            BedRemovalOutput::BedRemoved(v) => v,
            BedRemovalOutput::BodyMask(m) => m.to_volume(),
        }
    }

    /// 若输出为强度体数据, 返回其引用.
    #[inline]
    pub fn as_volume(&self) -> Option<&Volume> {
        match self {
            BedRemovalOutput::BedRemoved(v) => Some(v),
            BedRemovalOutput::BodyMask(_) => None,
        }
    }

    /// 若输出为身体掩膜, 返回其引用.
    #[inline]
    pub fn as_mask(&self) -> Option<&BodyMask> {
        match self {
            BedRemovalOutput::BedRemoved(_) => None,
            BedRemovalOutput::BodyMask(m) => Some(m),
        }
    }
}

impl GridAttr for BedRemovalOutput {
    fn geometry(&self) -> &Geometry {
        match self {
            BedRemovalOutput::BedRemoved(v) => v.geometry(),
            BedRemovalOutput::BodyMask(m) => m.geometry(),
        }
    }

    fn shape(&self) -> Idx3d {
        match self {
            BedRemovalOutput::BedRemoved(v) => v.shape(),
            BedRemovalOutput::BodyMask(m) => m.shape(),
        }
    }
}

/// 床板去除器. 持有一份已验证的参数, 可对多个体数据重复使用.
#[derive(Clone, Debug, Default)]
pub struct BedRemoval {
    config: BedRemovalConfig,
}

impl BedRemoval {
    /// 以 `config` 构建床板去除器. 参数非法时返回 `Err(BedError::InvalidConfig)`.
    pub fn new(config: BedRemovalConfig) -> BedResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取参数.
    #[inline]
    pub fn config(&self) -> &BedRemovalConfig {
        &self.config
    }

    /// 计算原始网格上的身体掩膜, 与输出模式无关.
    pub fn body_mask(&self, volume: &Volume) -> BedResult<BodyMask> {
        let mut report = StageReport::new(volume.shape());
        self.body_mask_with_report(volume, &mut report)
    }

    /// 运行流水线.
    #[inline]
    pub fn run(&self, volume: &Volume) -> BedResult<BedRemovalOutput> {
        self.run_with_report(volume).map(|(out, _)| out)
    }

    /// 运行流水线, 并返回各阶段统计信息.
    pub fn run_with_report(&self, volume: &Volume) -> BedResult<(BedRemovalOutput, StageReport)> {
        let mut report = StageReport::new(volume.shape());
        let mask = self.body_mask_with_report(volume, &mut report)?;

        let output = match self.config.output {
            OutputMode::BedRemoved => {
                let since = Instant::now();
                let out = apply_mask(volume, &mask, self.config.air, self.config.mask_rule)?;
                report.record(Stage::Mask, since);
                BedRemovalOutput::BedRemoved(out)
            }
            OutputMode::BodyMask => BedRemovalOutput::BodyMask(mask),
        };

        info!(
            "床板去除完成: 形状 {:?}, 身体体素 {} / {}, 耗时 {} ms",
            report.original_shape,
            report.body,
            volume.size(),
            report.total().as_millis()
        );
        Ok((output, report))
    }

    fn body_mask_with_report(&self, volume: &Volume, report: &mut StageReport) -> BedResult<BodyMask> {
        let config = &self.config;

        let since = Instant::now();
        let working = downsample(volume, config.factor, config.interpolation)?;
        report.record(Stage::Downsample, since);
        report.working_shape = working.shape();
        report.working_spacing = working.pix_dim();
        debug!(
            "降采样: {:?} -> {:?}, 间距 {:?} -> {:?}",
            volume.shape(),
            report.working_shape,
            volume.pix_dim(),
            report.working_spacing
        );

        let since = Instant::now();
        let mask = config.threshold.binarize(&working);
        drop(working);
        report.record(Stage::Threshold, since);
        report.thresholded = mask.count_body();
        debug!("阈值化: 身体体素 {}", report.thresholded);

        let since = Instant::now();
        let mask = mask.opening(config.opening_radius);
        report.record(Stage::Opening, since);
        report.opened = mask.count_body();
        debug!("开运算 (r = {}): 身体体素 {}", config.opening_radius, report.opened);

        let since = Instant::now();
        let mask = mask.closing(config.closing_radius)?;
        report.record(Stage::Closing, since);
        report.closed = mask.count_body();
        debug!("闭运算 (r = {}): 身体体素 {}", config.closing_radius, report.closed);

        let since = Instant::now();
        let mask = upsample_mask(
            &mask,
            volume.geometry(),
            volume.shape(),
            config.mask_upsampling,
        )?;
        report.record(Stage::Upsample, since);
        report.body = mask.count_body();
        debug!("升采样: 身体体素 {}", report.body);

        Ok(mask)
    }
}

/// 以默认参数去除床板.
pub fn remove_bed(volume: &Volume) -> BedResult<Volume> {
    BedRemoval::default().run(volume).map(BedRemovalOutput::into_volume)
}

#[cfg(test)]
mod tests {
    use super::{remove_bed, BedRemoval, BedRemovalOutput, Stage};
    use crate::consts::hu::AIR;
    use crate::{BedError, BedRemovalConfig, Geometry, GridAttr, OutputMode, Volume};
    use itertools::iproduct;
    use ndarray::s;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn init_logger() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    }

    /// 阈值窗口内的均匀体数据被完整保留.
    #[test]
    fn test_uniform_tissue() {
        let geo = Geometry::from_spacing([2.0, 0.7, 0.7]).unwrap();
        let v = Volume::from_elem((4, 30, 30), geo, 40.0).unwrap();
        let out = remove_bed(&v).unwrap();
        assert_eq!(out, v);
    }

    /// 阈值窗口以下的均匀体数据全部被覆写为空气值.
    #[test]
    fn test_pure_air() {
        let geo = Geometry::from_spacing([2.0, 0.7, 0.7]).unwrap();
        let v = Volume::from_elem((4, 30, 30), geo, -800.0).unwrap();

        let removal = BedRemoval::default();
        let mask = removal.body_mask(&v).unwrap();
        assert_eq!(mask.count_body(), 0);

        let out = remove_bed(&v).unwrap();
        assert_eq!(out.shape(), v.shape());
        assert!(out.data().iter().all(|&hu| hu == AIR));
    }

    /// 身体块下方有一条贴着它的床板. 床板的侧向部分被去除, 身体内部保持不变.
    #[test]
    fn test_remove_table_strip() {
        init_logger();
        let geo = Geometry::from_spacing([2.5, 0.8, 0.8]).unwrap();
        let mut v = Volume::from_elem((100, 300, 300), geo, -1000.0).unwrap();
        v.data_mut().slice_mut(s![.., 60..210, 60..240]).fill(40.0);
        v.data_mut().slice_mut(s![.., 210..215, 20..280]).fill(200.0);

        let (out, report) = BedRemoval::default().run_with_report(&v).unwrap();
        assert_eq!(report.working_shape, (100, 100, 100));
        assert!(report.opened < report.thresholded);
        assert!(report.closed >= report.opened);
        assert!(report.elapsed(Stage::Closing).is_some());

        let out = out.into_volume();
        assert_eq!(out.shape(), v.shape());
        assert_eq!(out.geometry(), v.geometry());

        // 侧向床板.
        for (z, h, w) in iproduct!(0..100, 210..215, (20..50).chain(250..280)) {
            assert_eq!(out[(z, h, w)], AIR, "at {:?}", (z, h, w));
        }
        // 身体内部.
        assert!(out
            .data()
            .slice(s![.., 72..198, 72..228])
            .iter()
            .all(|&hu| hu == 40.0));
        // 未被覆写的体素与原值相同, 且都位于身体块附近.
        for ((z, h, w), &hu) in out.data().indexed_iter() {
            if hu != AIR {
                assert_eq!(hu, v[(z, h, w)]);
                assert!((51..219).contains(&h) && (51..249).contains(&w));
            }
        }
    }

    /// 水平尺寸不能被整除时, 工作网格截断, 输出恢复原形状.
    #[test]
    fn test_non_divisible_shape() {
        let geo = Geometry::from_spacing([2.0, 0.8, 0.8]).unwrap();
        let mut v = Volume::from_elem((50, 301, 301), geo, -1000.0).unwrap();
        v.data_mut().slice_mut(s![.., 100..200, 100..200]).fill(40.0);

        let config = BedRemovalConfig::default().with_closing_radius(5);
        let (out, report) = BedRemoval::new(config).unwrap().run_with_report(&v).unwrap();
        assert_eq!(report.working_shape, (50, 100, 100));
        assert!(f64_eq(report.working_spacing[1], 0.8 * 3.01));
        assert!(f64_eq(report.working_spacing[2], 0.8 * 3.01));
        assert_eq!(out.shape(), (50, 301, 301));
        assert_eq!(out.geometry(), v.geometry());

        let out = out.into_volume();
        assert_eq!(out[(25, 150, 150)], 40.0);
        assert_eq!(out[(25, 10, 10)], AIR);
        assert_eq!(out[(25, 300, 300)], AIR);
    }

    #[test]
    fn test_degenerate_input() {
        let geo = Geometry::from_spacing([1.0; 3]).unwrap();
        let v = Volume::from_elem((5, 2, 2), geo, 40.0).unwrap();
        let e = remove_bed(&v).unwrap_err();
        assert_eq!(
            e,
            BedError::DegenerateDownsample {
                shape: (5, 2, 2),
                factor: 3
            }
        );

        let e = BedRemoval::new(BedRemovalConfig::default().with_factor(0)).unwrap_err();
        assert!(matches!(e, BedError::InvalidConfig(_)));
    }

    #[test]
    fn test_mask_output() {
        let geo = Geometry::from_spacing([1.0, 0.5, 0.5]).unwrap();
        let mut v = Volume::from_elem((6, 60, 60), geo, -1000.0).unwrap();
        v.data_mut().slice_mut(s![.., 9..51, 9..51]).fill(40.0);

        let config = BedRemovalConfig::default()
            .with_closing_radius(4)
            .with_output(OutputMode::BodyMask);
        let removal = BedRemoval::new(config).unwrap();
        let out = removal.run(&v).unwrap();
        let mask = out.as_mask().unwrap().clone();
        assert!(out.as_volume().is_none());
        assert_eq!(mask, removal.body_mask(&v).unwrap());
        assert!(mask.is_body((3, 30, 30)));
        assert!(!mask.is_body((3, 1, 1)));

        let as_volume = BedRemovalOutput::BodyMask(mask).into_volume();
        assert!(as_volume.data().iter().all(|&p| p == 0.0 || p == 1.0));
        assert_eq!(as_volume[(3, 30, 30)], 1.0);
    }
}
