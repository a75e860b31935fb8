// 该文件是 Xinjing （心镜） 项目的一部分。
// src/output/draw.rs - 标注线段可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{DynamicImage, ImageBuffer, Pixel, Rgb, Rgba};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::{frame::CanonicalImage, metadata::AnnotationSegment};

// 绘制常量
const MARKER_RADIUS: i32 = 2;
const START_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const END_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const LINE_COLOR: [u8; 3] = [255, 255, 0]; // 黄色

pub struct Draw {
  marker_radius: i32,
  start_color: [u8; 3],
  end_color: [u8; 3],
  line_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      marker_radius: MARKER_RADIUS,
      start_color: START_COLOR,
      end_color: END_COLOR,
      line_color: LINE_COLOR,
    }
  }
}

impl Draw {
  pub fn with_marker_radius(mut self, radius: i32) -> Self {
    self.marker_radius = radius;
    self
  }

  pub fn with_colors(mut self, start: [u8; 3], end: [u8; 3], line: [u8; 3]) -> Self {
    self.start_color = start;
    self.end_color = end;
    self.line_color = line;
    self
  }

  /// 在图像副本上绘制线段，原图保持不变
  ///
  /// 灰度图会先提升为 RGB，以便区分起点与终点颜色。
  pub fn draw_segments(
    &self,
    image: &CanonicalImage,
    segments: &[AnnotationSegment],
  ) -> CanonicalImage {
    if segments.is_empty() {
      return image.clone();
    }

    match image {
      CanonicalImage::Gray(gray) => {
        let mut canvas = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
        self.draw_on(&mut canvas, segments, Rgb);
        CanonicalImage::Rgb(canvas)
      }
      CanonicalImage::Rgb(rgb) => {
        let mut canvas = rgb.clone();
        self.draw_on(&mut canvas, segments, Rgb);
        CanonicalImage::Rgb(canvas)
      }
      CanonicalImage::Rgba(rgba) => {
        let mut canvas = rgba.clone();
        self.draw_on(&mut canvas, segments, |[r, g, b]| Rgba([r, g, b, 255]));
        CanonicalImage::Rgba(canvas)
      }
    }
  }

  // 先画起点、终点标记，再画连线；后画的线段覆盖先画的
  fn draw_on<P, F>(
    &self,
    canvas: &mut ImageBuffer<P, Vec<P::Subpixel>>,
    segments: &[AnnotationSegment],
    paint: F,
  ) where
    P: Pixel<Subpixel = u8>,
    F: Fn([u8; 3]) -> P,
  {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    for segment in segments {
      let start = clamp_point(segment.x1, segment.y1, w, h);
      let end = clamp_point(segment.x2, segment.y2, w, h);

      draw_filled_circle_mut(canvas, start, self.marker_radius, paint(self.start_color));
      draw_filled_circle_mut(canvas, end, self.marker_radius, paint(self.end_color));
      draw_line_segment_mut(
        canvas,
        (start.0 as f32, start.1 as f32),
        (end.0 as f32, end.1 as f32),
        paint(self.line_color),
      );
    }
  }
}

/// 截断取整后夹到 `[0, w-1] × [0, h-1]`，越界点拉回边缘而不是丢弃
pub fn clamp_point(x: f64, y: f64, w: i32, h: i32) -> (i32, i32) {
  ((x as i32).clamp(0, w - 1), (y as i32).clamp(0, h - 1))
}

/// 使用默认样式绘制标注
pub fn draw_overlay(image: &CanonicalImage, segments: &[AnnotationSegment]) -> CanonicalImage {
  Draw::default().draw_segments(image, segments)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma, RgbImage, RgbaImage};

  fn black_rgb(size: u32) -> CanonicalImage {
    CanonicalImage::Rgb(RgbImage::new(size, size))
  }

  #[test]
  fn out_of_bounds_endpoints_are_clamped_to_edges() {
    assert_eq!(clamp_point(-5.0, 1000.0, 100, 100), (0, 99));
    assert_eq!(clamp_point(51.9, 12.2, 100, 100), (51, 12));

    let base = black_rgb(100);
    let segment = AnnotationSegment::new(-5.0, 1000.0, 50.0, 50.0);
    let CanonicalImage::Rgb(drawn) = draw_overlay(&base, &[segment]) else {
      panic!("RGB 输入应得到 RGB 输出");
    };

    // 起点标记落在左下角
    assert_eq!(drawn.get_pixel(0, 97), &Rgb(START_COLOR));
    // 终点标记
    assert_eq!(drawn.get_pixel(50, 48), &Rgb(END_COLOR));
  }

  #[test]
  fn overlay_does_not_touch_the_source_image() {
    let base = black_rgb(20);
    let segment = AnnotationSegment::new(2.0, 2.0, 15.0, 15.0);

    let drawn = draw_overlay(&base, &[segment]);

    assert_ne!(drawn, base);
    assert!(base.as_raw().iter().all(|&v| v == 0));
    assert_eq!(draw_overlay(&base, &[]), base);
  }

  #[test]
  fn later_segments_paint_over_earlier_ones() {
    let base = black_rgb(20);
    let first = AnnotationSegment::new(0.0, 10.0, 19.0, 10.0);
    let second = AnnotationSegment::new(10.0, 12.0, 19.0, 12.0);

    let CanonicalImage::Rgb(only_first) = draw_overlay(&base, &[first]) else {
      panic!("RGB 输入应得到 RGB 输出");
    };
    assert_eq!(only_first.get_pixel(10, 10), &Rgb(LINE_COLOR));

    let CanonicalImage::Rgb(both) = draw_overlay(&base, &[first, second]) else {
      panic!("RGB 输入应得到 RGB 输出");
    };
    assert_eq!(both.get_pixel(10, 10), &Rgb(START_COLOR));
  }

  #[test]
  fn gray_frames_are_promoted_and_rgba_keeps_alpha() {
    let gray = CanonicalImage::Gray(GrayImage::from_pixel(8, 8, Luma([40])));
    let segment = AnnotationSegment::new(1.0, 1.0, 6.0, 6.0);

    let drawn = draw_overlay(&gray, &[segment]);
    let CanonicalImage::Rgb(rgb) = &drawn else {
      panic!("灰度图应提升为 RGB");
    };
    assert_eq!(rgb.get_pixel(7, 0), &Rgb([40, 40, 40]));

    let rgba = CanonicalImage::Rgba(RgbaImage::new(8, 8));
    let CanonicalImage::Rgba(drawn) = draw_overlay(&rgba, &[segment]) else {
      panic!("RGBA 输入应得到 RGBA 输出");
    };
    assert_eq!(drawn.get_pixel(1, 1)[3], 255);
    assert_eq!(drawn.get_pixel(7, 0)[3], 0);
  }

  #[test]
  fn custom_style_is_applied() {
    let style = Draw::default()
      .with_marker_radius(0)
      .with_colors([1, 1, 1], [2, 2, 2], [3, 3, 3]);
    let segment = AnnotationSegment::new(1.0, 5.0, 8.0, 5.0);

    let CanonicalImage::Rgb(drawn) = style.draw_segments(&black_rgb(10), &[segment]) else {
      panic!("RGB 输入应得到 RGB 输出");
    };
    assert_eq!(drawn.get_pixel(4, 5), &Rgb([3, 3, 3]));
    assert_eq!(drawn.get_pixel(4, 6), &Rgb([0, 0, 0]));
  }
}
