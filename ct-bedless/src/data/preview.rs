//! 水平切片的可视化持久化存储.

use std::path::Path;

use image::ImageResult;

use super::{BodyMask, Volume};
use crate::consts::gray::*;
use crate::consts::label::is_body;
use crate::CtWindow;

/// 表明一个 3D 对象的水平切片可以通过 **可视化友好** 模式保存为灰度图像.
///
/// 对于 [`BodyMask`], 身体映射为白色, 背景映射为黑色;
/// 对于 [`Volume`], 以 [`CtWindow::from_body_visual`] 窗口规范化 HU 值.
pub trait SlicePreview {
    /// 将第 `z_index` 层水平切片保存到 `path` 路径. 图像格式由扩展名决定.
    ///
    /// 当 `z_index` 越界时 panic.
    fn save_slice<P: AsRef<Path>>(&self, z_index: usize, path: P) -> ImageResult<()>;
}

impl Volume {
    /// 以指定 CT 窗口将第 `z_index` 层水平切片保存到 `path` 路径.
    /// 非有限 HU 值会显示为黑色.
    ///
    /// 当 `z_index` 越界时 panic.
    pub fn save_slice_windowed<P: AsRef<Path>>(
        &self,
        z_index: usize,
        window: CtWindow,
        path: P,
    ) -> ImageResult<()> {
        let sli = self.slice_at(z_index);
        let (height, width) = sli.dim();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &hu) in sli.indexed_iter() {
            let gray = window.eval(hu).unwrap_or(BLACK);
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }
        buf.save(path)
    }
}

impl SlicePreview for Volume {
    #[inline]
    fn save_slice<P: AsRef<Path>>(&self, z_index: usize, path: P) -> ImageResult<()> {
        self.save_slice_windowed(z_index, CtWindow::from_body_visual(), path)
    }
}

impl SlicePreview for BodyMask {
    fn save_slice<P: AsRef<Path>>(&self, z_index: usize, path: P) -> ImageResult<()> {
        let sli = self.slice_at(z_index);
        let (height, width) = sli.dim();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in sli.indexed_iter() {
            let gray = if is_body(pix) { WHITE } else { BLACK };
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }
        buf.save(path)
    }
}
