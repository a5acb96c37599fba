//! 程序运行函数.

use std::path::Path;

use anyhow::{Context, Result};
use ct_bedless::{BedRemoval, BedRemovalOutput, CtScan, GridAttr, SlicePreview, StageReport};
use log::{debug, info};

use crate::args::Args;

/// 实际运行: 读取, 去除床板, 写入.
pub fn run(args: &Args) -> Result<()> {
    let removal = BedRemoval::new(args.to_config()?).context("流水线参数非法")?;
    debug!("参数: {:?}", removal.config());

    let scan = CtScan::open(&args.input)
        .with_context(|| format!("无法读取 CT 扫描 `{}`", args.input.display()))?;
    let volume = scan.volume();
    let (lo, hi) = volume.min_max();
    info!(
        "读取 `{}`: 形状 {:?}, 间距 {:?} mm, HU 范围 [{lo}, {hi}]",
        args.input.display(),
        volume.shape(),
        volume.pix_dim()
    );

    let (output, report) = removal
        .run_with_report(volume)
        .with_context(|| format!("无法处理 `{}`", args.input.display()))?;
    log_report(&report);

    if let Some(path) = &args.preview {
        save_preview(&output, path)
            .with_context(|| format!("无法保存预览图 `{}`", path.display()))?;
        info!("预览图已保存到 `{}`", path.display());
    }

    let out = scan.with_volume(output.into_volume())?;
    out.save(&args.output)
        .with_context(|| format!("无法写入 `{}`", args.output.display()))?;
    info!("结果已保存到 `{}`", args.output.display());
    Ok(())
}

/// 保存中间切片.
fn save_preview(output: &BedRemovalOutput, path: &Path) -> image::ImageResult<()> {
    let z = output.len_z() / 2;
    match output {
        BedRemovalOutput::BedRemoved(v) => v.save_slice(z, path),
        BedRemovalOutput::BodyMask(m) => m.save_slice(z, path),
    }
}

fn log_report(report: &StageReport) {
    use ct_bedless::Stage::*;

    info!(
        "工作网格 {:?}, 间距 {:.3?} mm",
        report.working_shape, report.working_spacing
    );
    info!(
        "身体体素: 阈值 {}, 开运算 {}, 闭运算 {}, 原网格 {}",
        report.thresholded, report.opened, report.closed, report.body
    );
    for stage in [Downsample, Threshold, Opening, Closing, Upsample, Mask] {
        if let Some(d) = report.elapsed(stage) {
            debug!("{stage:?}: {} ms", d.as_millis());
        }
    }
}
