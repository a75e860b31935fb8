// 该文件是 Xinjing （心镜） 项目的一部分。
// src/output/save_image_file.rs - 心电信号曲线导出
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

use std::{
  path::{Path, PathBuf},
  str::FromStr,
};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut, text_size};
use thiserror::Error;
use tracing::{debug, info, warn};

// 画布常量，对应 12×5 英寸、150 DPI
const PLOT_WIDTH: u32 = 1800;
const PLOT_HEIGHT: u32 = 750;
const MARGIN_LEFT: u32 = 90;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 70;
const MARGIN_BOTTOM: u32 = 70;
const GRID_DIVISIONS: u32 = 10;
const TITLE_FONT_SIZE: f32 = 32.0;
const LABEL_FONT_SIZE: f32 = 22.0;

const BACKGROUND_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const GRID_COLOR: Rgb<u8> = Rgb([230, 230, 230]);
const AXIS_COLOR: Rgb<u8> = Rgb([60, 60, 60]);
const TRACE_COLOR: Rgb<u8> = Rgb([0x1f, 0x77, 0xb4]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法加载字体: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
  #[error("信号为空")]
  EmptySignal,
  #[error("不支持的导出格式: {0}")]
  UnsupportedFormat(String),
}

/// 导出图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EcgFormat {
  #[default]
  Png,
  Jpg,
}

impl EcgFormat {
  pub fn extension(self) -> &'static str {
    match self {
      EcgFormat::Png => "png",
      EcgFormat::Jpg => "jpg",
    }
  }
}

impl FromStr for EcgFormat {
  type Err = SaveImageFileError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "png" => Ok(EcgFormat::Png),
      "jpg" | "jpeg" => Ok(EcgFormat::Jpg),
      other => Err(SaveImageFileError::UnsupportedFormat(other.to_string())),
    }
  }
}

/// 单导联信号曲线绘制
///
/// 只隐藏上、右两条边框，保留网格。默认使用内嵌的 DejaVu Sans 绘制标题和坐标轴标签。
pub struct EcgPlot {
  width: u32,
  height: u32,
  font: Option<FontArc>,
}

impl Default for EcgPlot {
  fn default() -> Self {
    let font = match FontArc::try_from_slice(DEFAULT_FONT) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("无法加载内嵌字体: {}", e);
        None
      }
    };

    Self {
      width: PLOT_WIDTH,
      height: PLOT_HEIGHT,
      font,
    }
  }
}

impl EcgPlot {
  pub fn with_size(mut self, width: u32, height: u32) -> Self {
    self.width = width.max(MARGIN_LEFT + MARGIN_RIGHT + 1);
    self.height = height.max(MARGIN_TOP + MARGIN_BOTTOM + 1);
    self
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, SaveImageFileError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(self.with_font(font))
  }

  pub fn render(&self, signal: &[f64], title: &str) -> Result<RgbImage, SaveImageFileError> {
    let (min, max) = signal
      .iter()
      .copied()
      .filter(|v| v.is_finite())
      .fold(None, |acc: Option<(f64, f64)>, v| match acc {
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        None => Some((v, v)),
      })
      .ok_or(SaveImageFileError::EmptySignal)?;

    // 常量信号上下各留一个单位
    let (min, max) = if max > min { (min, max) } else { (min - 1.0, max + 1.0) };

    let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND_COLOR);
    let left = MARGIN_LEFT as f32;
    let right = (self.width - MARGIN_RIGHT) as f32;
    let top = MARGIN_TOP as f32;
    let bottom = (self.height - MARGIN_BOTTOM) as f32;

    for i in 0..=GRID_DIVISIONS {
      let t = i as f32 / GRID_DIVISIONS as f32;
      let x = left + (right - left) * t;
      let y = top + (bottom - top) * t;
      draw_line_segment_mut(&mut image, (x, top), (x, bottom), GRID_COLOR);
      draw_line_segment_mut(&mut image, (left, y), (right, y), GRID_COLOR);
    }
    draw_line_segment_mut(&mut image, (left, top), (left, bottom), AXIS_COLOR);
    draw_line_segment_mut(&mut image, (left, bottom), (right, bottom), AXIS_COLOR);

    let last = signal.len().saturating_sub(1).max(1) as f64;
    let project = |i: usize, v: f64| -> (f32, f32) {
      let x = left as f64 + (right - left) as f64 * (i as f64 / last);
      let y = bottom as f64 - (bottom - top) as f64 * ((v - min) / (max - min));
      (x as f32, y as f32)
    };

    let mut previous: Option<(f32, f32)> = None;
    for (i, &v) in signal.iter().enumerate() {
      if !v.is_finite() {
        previous = None;
        continue;
      }
      let point = project(i, v);
      if let Some(from) = previous {
        draw_line_segment_mut(&mut image, from, point, TRACE_COLOR);
      }
      previous = Some(point);
    }

    if let Some(font) = &self.font {
      self.draw_labels(&mut image, font, title);
    } else {
      debug!("未配置字体，跳过标题: {}", title);
    }

    Ok(image)
  }

  fn draw_labels(&self, image: &mut RgbImage, font: &FontArc, title: &str) {
    let title_scale = PxScale::from(TITLE_FONT_SIZE);
    let (title_width, _) = text_size(title_scale, font, title);
    let title_x = (self.width.saturating_sub(title_width) / 2) as i32;
    draw_text_mut(image, TEXT_COLOR, title_x, 16, title_scale, font, title);

    let label_scale = PxScale::from(LABEL_FONT_SIZE);
    let (sample_width, _) = text_size(label_scale, font, "Sample");
    let sample_x = (self.width.saturating_sub(sample_width) / 2) as i32;
    let sample_y = (self.height - MARGIN_BOTTOM + 24) as i32;
    draw_text_mut(image, TEXT_COLOR, sample_x, sample_y, label_scale, font, "Sample");
    draw_text_mut(image, TEXT_COLOR, 8, (MARGIN_TOP - 28) as i32, label_scale, font, "Amplitude");
  }

  /// 绘制并保存，父目录不存在时自动创建，格式由扩展名决定
  pub fn save(
    &self,
    signal: &[f64],
    title: &str,
    path: impl AsRef<Path>,
  ) -> Result<PathBuf, SaveImageFileError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let image = self.render(signal, title)?;
    image.save(path)?;
    info!("保存心电图到文件: {}", path.display());

    Ok(path.to_path_buf())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_trace_inside_plot_area() {
    let plot = EcgPlot::default().with_size(300, 200);
    let signal: Vec<f64> = (0..50).map(|i| (i as f64 / 5.0).sin()).collect();

    let image = plot.render(&signal, "p001 - 12-lead ECG").unwrap();

    assert_eq!(image.dimensions(), (300, 200));
    assert!(image.pixels().any(|p| *p == TRACE_COLOR));
    assert_eq!(image.get_pixel(299, 0), &BACKGROUND_COLOR);
  }

  #[test]
  fn default_plot_draws_title() {
    let image = EcgPlot::default()
      .with_size(400, 200)
      .render(&[0.0, 1.0, 0.0], "p001 - 12-lead ECG")
      .unwrap();

    let title_inked = (100..300)
      .flat_map(|x| (10..40).map(move |y| (x, y)))
      .filter(|&(x, y)| *image.get_pixel(x, y) != BACKGROUND_COLOR)
      .count();
    assert!(title_inked > 50);
  }

  #[test]
  fn empty_or_non_finite_signal_is_rejected() {
    let plot = EcgPlot::default();
    assert!(matches!(
      plot.render(&[], "empty"),
      Err(SaveImageFileError::EmptySignal)
    ));
    assert!(matches!(
      plot.render(&[f64::NAN], "nan"),
      Err(SaveImageFileError::EmptySignal)
    ));
  }

  #[test]
  fn constant_signal_still_renders() {
    let image = EcgPlot::default()
      .with_size(200, 200)
      .render(&[3.0; 10], "flat")
      .unwrap();
    assert!(image.pixels().any(|p| *p == TRACE_COLOR));
  }

  #[test]
  fn save_picks_format_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p001").join(format!("ecg.{}", EcgFormat::Jpg.extension()));

    let saved = EcgPlot::default()
      .with_size(240, 180)
      .save(&[0.0, 1.0, 0.5], "p001 - 12-lead ECG", &path)
      .unwrap();

    assert_eq!(saved, path);
    let reloaded = image::open(&path).unwrap();
    assert_eq!((reloaded.width(), reloaded.height()), (240, 180));
  }

  #[test]
  fn format_parses_case_insensitively() {
    assert_eq!("PNG".parse::<EcgFormat>().unwrap(), EcgFormat::Png);
    assert_eq!("jpeg".parse::<EcgFormat>().unwrap(), EcgFormat::Jpg);
    assert!("bmp".parse::<EcgFormat>().is_err());
  }
}
