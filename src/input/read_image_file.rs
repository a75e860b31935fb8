// 该文件是 Xinjing （心镜） 项目的一部分。
// src/input/read_image_file.rs - 静态图像文件读取
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{DynamicImage, ImageReader};
use serde::Serialize;

use super::{LoadError, Modality};
use crate::frame::{FrameError, PixelBuffer, RawFrame};

/// 静态图像的描述信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
  pub modality: Modality,
  /// 由文件内容识别出的格式，如 `png`
  pub format: String,
  pub shape: Vec<usize>,
  /// `(width, height)`
  pub size: (u32, u32),
  /// 像素模式，如 `L`、`RGB`、`RGBA`、`I;16`
  pub mode: String,
  pub channels: usize,
}

impl ImageMetadata {
  /// 界面上显示的一行说明
  pub fn detail(&self) -> String {
    let (width, height) = self.size;
    match self.modality {
      Modality::Ecg => format!("12-lead ECG - {}×{} pixels", width, height),
      Modality::Angiography => format!("X-ray imaging - {}×{} pixels", width, height),
      Modality::Echocardiography => format!("{}×{} pixels", width, height),
    }
  }
}

#[derive(Debug, Clone)]
pub struct StillImage {
  pub frame: RawFrame,
  pub metadata: ImageMetadata,
}

/// 解码单张图像，保留原始位深
///
/// 文件无法打开时返回 [`LoadError::Io`]，内容损坏时返回 [`LoadError::Decode`]。
pub fn read_image_file(path: &Path, modality: Modality) -> Result<StillImage, LoadError> {
  let reader = ImageReader::open(path)
    .and_then(|reader| reader.with_guessed_format())
    .map_err(|source| LoadError::Io {
      path: path.to_path_buf(),
      source,
    })?;

  let format = reader
    .format()
    .and_then(|format| format.extensions_str().first().copied())
    .unwrap_or("unknown")
    .to_string();

  let image = reader.decode().map_err(|source| LoadError::Decode {
    path: path.to_path_buf(),
    source,
  })?;
  let size = (image.width(), image.height());

  let (frame, mode) = into_raw_frame(image)?;
  let metadata = ImageMetadata {
    modality,
    format,
    shape: frame.shape().to_vec(),
    size,
    mode: mode.to_string(),
    channels: frame.channel_count(),
  };

  Ok(StillImage { frame, metadata })
}

fn into_raw_frame(image: DynamicImage) -> Result<(RawFrame, &'static str), FrameError> {
  let (h, w) = (image.height() as usize, image.width() as usize);

  let (shape, data, mode) = match image {
    DynamicImage::ImageLuma8(buffer) => return Ok((RawFrame::from(buffer), "L")),
    DynamicImage::ImageRgb8(buffer) => return Ok((RawFrame::from(buffer), "RGB")),
    DynamicImage::ImageRgba8(buffer) => return Ok((RawFrame::from(buffer), "RGBA")),
    DynamicImage::ImageLumaA8(buffer) => (vec![h, w, 2], PixelBuffer::U8(buffer.into_raw()), "LA"),
    DynamicImage::ImageLuma16(buffer) => {
      (vec![h, w], PixelBuffer::U16(buffer.into_raw()), "I;16")
    }
    DynamicImage::ImageLumaA16(buffer) => {
      (vec![h, w, 2], PixelBuffer::U16(buffer.into_raw()), "LA;16")
    }
    DynamicImage::ImageRgb16(buffer) => {
      (vec![h, w, 3], PixelBuffer::U16(buffer.into_raw()), "RGB;16")
    }
    DynamicImage::ImageRgba16(buffer) => {
      (vec![h, w, 4], PixelBuffer::U16(buffer.into_raw()), "RGBA;16")
    }
    DynamicImage::ImageRgb32F(buffer) => {
      (vec![h, w, 3], PixelBuffer::F32(buffer.into_raw()), "RGB;F")
    }
    DynamicImage::ImageRgba32F(buffer) => {
      (vec![h, w, 4], PixelBuffer::F32(buffer.into_raw()), "RGBA;F")
    }
    other => return Ok((RawFrame::from(other.to_rgba8()), "RGBA")),
  };

  Ok((RawFrame::new(shape, data)?, mode))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::PixelType;
  use image::{ImageBuffer, Luma, LumaA};

  #[test]
  fn sixteen_bit_gray_keeps_depth() {
    let image = ImageBuffer::<Luma<u16>, _>::from_raw(2, 1, vec![65280u16, 256]).unwrap();
    let (frame, mode) = into_raw_frame(DynamicImage::ImageLuma16(image)).unwrap();

    assert_eq!(mode, "I;16");
    assert_eq!(frame.shape(), &[1, 2]);
    assert_eq!(frame.pixel_type(), PixelType::U16);
  }

  #[test]
  fn gray_alpha_becomes_two_channels() {
    let image = ImageBuffer::<LumaA<u8>, _>::from_pixel(3, 2, LumaA([10, 255]));
    let (frame, mode) = into_raw_frame(DynamicImage::ImageLumaA8(image)).unwrap();

    assert_eq!(mode, "LA");
    assert_eq!(frame.shape(), &[2, 3, 2]);
    assert_eq!(frame.channel_count(), 2);
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = read_image_file(&dir.path().join("absent.png"), Modality::Angiography);
    assert!(matches!(result, Err(LoadError::Io { .. })));
  }
}
