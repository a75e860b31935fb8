// 该文件是 Xinjing （心镜） 项目的一部分。
// src/frame/canonical.rs - 任意数组到 8 位显示图像的规范化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # 数组规范化
//!
//! 把任意元素类型、任意取值范围的帧数组转换为每通道 8 位的显示图像。
//!
//! ## 取值映射
//!
//! - `u8`：原样保留
//! - 浮点：最大值不超过 1.0 时乘以 255；否则除以本帧最大值再乘以 255。
//!   结果截断取整。注意这是逐帧、依赖数据的缩放，同一物理值在不同帧里亮度可能不同。
//! - `u16`：除以 256 后截断（位深线性压缩）
//! - 其他整数：直接按位截断为 `u8`，不做缩放
//!
//! ## 形状
//!
//! - H×W 或 H×W×1：灰度
//! - H×W×3：RGB（通道顺序须已在上游校正）
//! - H×W×4：RGBA
//! - 其他：[`FrameError::UnsupportedFrameShape`]

use std::path::Path;

use image::{GrayImage, RgbImage, RgbaImage};

use super::{FrameError, PixelBuffer, RawFrame};

/// 规范化图像的通道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
  Gray,
  Rgb,
  Rgba,
}

impl ImageLayout {
  pub fn channels(self) -> usize {
    match self {
      ImageLayout::Gray => 1,
      ImageLayout::Rgb => 3,
      ImageLayout::Rgba => 4,
    }
  }

  fn from_shape(shape: &[usize]) -> Result<Self, FrameError> {
    match shape {
      [_, _] | [_, _, 1] => Ok(ImageLayout::Gray),
      [_, _, 3] => Ok(ImageLayout::Rgb),
      [_, _, 4] => Ok(ImageLayout::Rgba),
      _ => Err(FrameError::UnsupportedFrameShape {
        shape: shape.to_vec(),
      }),
    }
  }
}

/// 每通道 8 位的可显示图像，创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalImage {
  Gray(GrayImage),
  Rgb(RgbImage),
  Rgba(RgbaImage),
}

impl CanonicalImage {
  pub fn width(&self) -> u32 {
    match self {
      CanonicalImage::Gray(image) => image.width(),
      CanonicalImage::Rgb(image) => image.width(),
      CanonicalImage::Rgba(image) => image.width(),
    }
  }

  pub fn height(&self) -> u32 {
    match self {
      CanonicalImage::Gray(image) => image.height(),
      CanonicalImage::Rgb(image) => image.height(),
      CanonicalImage::Rgba(image) => image.height(),
    }
  }

  pub fn layout(&self) -> ImageLayout {
    match self {
      CanonicalImage::Gray(_) => ImageLayout::Gray,
      CanonicalImage::Rgb(_) => ImageLayout::Rgb,
      CanonicalImage::Rgba(_) => ImageLayout::Rgba,
    }
  }

  /// 行主序的原始字节
  pub fn as_raw(&self) -> &[u8] {
    match self {
      CanonicalImage::Gray(image) => image.as_raw(),
      CanonicalImage::Rgb(image) => image.as_raw(),
      CanonicalImage::Rgba(image) => image.as_raw(),
    }
  }

  /// 按扩展名选择编码格式写入文件，文件的生命周期由调用方负责
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
    match self {
      CanonicalImage::Gray(image) => image.save(path),
      CanonicalImage::Rgb(image) => image.save(path),
      CanonicalImage::Rgba(image) => image.save(path),
    }
  }
}

/// 将原始帧规范化为 8 位显示图像
///
/// 输入不会被修改，返回的图像总是新分配的缓冲区。
pub fn canonicalize(raw: &RawFrame) -> Result<CanonicalImage, FrameError> {
  let layout = ImageLayout::from_shape(raw.shape())?;
  let width = raw.width() as u32;
  let height = raw.height() as u32;
  let data = to_u8(raw.data());

  let image = match layout {
    ImageLayout::Gray => GrayImage::from_raw(width, height, data).map(CanonicalImage::Gray),
    ImageLayout::Rgb => RgbImage::from_raw(width, height, data).map(CanonicalImage::Rgb),
    ImageLayout::Rgba => RgbaImage::from_raw(width, height, data).map(CanonicalImage::Rgba),
  };

  // RawFrame 构造时已校验长度，这里只会在尺寸超出 u32 时失败
  image.ok_or_else(|| FrameError::UnsupportedFrameShape {
    shape: raw.shape().to_vec(),
  })
}

fn to_u8(buffer: &PixelBuffer) -> Vec<u8> {
  match buffer {
    PixelBuffer::U8(data) => data.clone(),
    PixelBuffer::U16(data) => data.iter().map(|&v| (v / 256) as u8).collect(),
    PixelBuffer::F32(data) => rescale_float(data.iter().map(|&v| v as f64)),
    PixelBuffer::F64(data) => rescale_float(data.iter().copied()),
    PixelBuffer::U32(data) => data.iter().map(|&v| v as u8).collect(),
    PixelBuffer::U64(data) => data.iter().map(|&v| v as u8).collect(),
    PixelBuffer::I8(data) => data.iter().map(|&v| v as u8).collect(),
    PixelBuffer::I16(data) => data.iter().map(|&v| v as u8).collect(),
    PixelBuffer::I32(data) => data.iter().map(|&v| v as u8).collect(),
    PixelBuffer::I64(data) => data.iter().map(|&v| v as u8).collect(),
  }
}

fn rescale_float<I>(values: I) -> Vec<u8>
where
  I: Iterator<Item = f64> + Clone,
{
  let max = values.clone().fold(f64::NEG_INFINITY, f64::max);

  if max > 1.0 {
    values.map(|v| (v / max * 255.0) as u8).collect()
  } else {
    // 全零帧同样落在这里，不会出现除零
    values.map(|v| (v * 255.0) as u8).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame(shape: &[usize], data: PixelBuffer) -> RawFrame {
    RawFrame::new(shape.to_vec(), data).unwrap()
  }

  #[test]
  fn rgb8_passes_through_unchanged() {
    let pixels: Vec<u8> = (0..24).collect();
    let raw = frame(&[2, 4, 3], PixelBuffer::U8(pixels.clone()));

    let image = canonicalize(&raw).unwrap();

    assert_eq!(image.layout(), ImageLayout::Rgb);
    assert_eq!((image.width(), image.height()), (4, 2));
    assert_eq!(image.as_raw(), pixels.as_slice());
  }

  #[test]
  fn normalized_floats_scale_by_255() {
    let raw = frame(&[1, 3], PixelBuffer::F32(vec![0.0, 0.25, 0.5]));
    let image = canonicalize(&raw).unwrap();
    assert_eq!(image.as_raw(), &[0, 63, 127]);
  }

  #[test]
  fn large_floats_rescale_by_observed_max() {
    let raw = frame(&[2, 2], PixelBuffer::F64(vec![0.0, 50.0, 100.0, 200.0]));
    let image = canonicalize(&raw).unwrap();
    assert_eq!(image.layout(), ImageLayout::Gray);
    assert_eq!(image.as_raw(), &[0, 63, 127, 255]);
  }

  #[test]
  fn all_zero_float_frame_stays_zero() {
    let raw = frame(&[3, 2, 3], PixelBuffer::F64(vec![0.0; 18]));
    let image = canonicalize(&raw).unwrap();
    assert_eq!(image.layout(), ImageLayout::Rgb);
    assert_eq!((image.width(), image.height()), (2, 3));
    assert!(image.as_raw().iter().all(|&v| v == 0));
  }

  #[test]
  fn sixteen_bit_values_drop_low_byte() {
    let raw = frame(&[1, 4], PixelBuffer::U16(vec![65280, 256, 255, 65535]));
    let image = canonicalize(&raw).unwrap();
    assert_eq!(image.as_raw(), &[255, 1, 0, 255]);
  }

  #[test]
  fn other_integers_truncate_without_scaling() {
    let raw = frame(&[1, 3], PixelBuffer::I32(vec![7, 255, 300]));
    let image = canonicalize(&raw).unwrap();
    assert_eq!(image.as_raw(), &[7, 255, 44]);
  }

  #[test]
  fn single_channel_cube_is_gray_and_four_channels_are_rgba() {
    let gray = frame(&[2, 2, 1], PixelBuffer::U8(vec![1, 2, 3, 4]));
    assert_eq!(canonicalize(&gray).unwrap().layout(), ImageLayout::Gray);

    let rgba = frame(&[1, 2, 4], PixelBuffer::U8(vec![9; 8]));
    let image = canonicalize(&rgba).unwrap();
    assert_eq!(image.layout(), ImageLayout::Rgba);
    assert_eq!(image.layout().channels(), 4);
  }

  #[test]
  fn unsupported_shapes_are_rejected() {
    let two_channels = frame(&[2, 2, 2], PixelBuffer::U8(vec![0; 8]));
    assert_eq!(
      canonicalize(&two_channels),
      Err(FrameError::UnsupportedFrameShape {
        shape: vec![2, 2, 2]
      })
    );

    let rank_four = frame(&[1, 1, 1, 3], PixelBuffer::U8(vec![0; 3]));
    assert!(matches!(
      canonicalize(&rank_four),
      Err(FrameError::UnsupportedFrameShape { .. })
    ));

    let rank_one = frame(&[5], PixelBuffer::U8(vec![0; 5]));
    assert!(canonicalize(&rank_one).is_err());
  }

  #[test]
  fn input_frame_is_left_intact() {
    let raw = frame(&[1, 2], PixelBuffer::F32(vec![10.0, 20.0]));
    let before = raw.clone();
    let _ = canonicalize(&raw).unwrap();
    assert_eq!(raw, before);
  }
}
