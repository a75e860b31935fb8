// 该文件是 Xinjing （心镜） 项目的一部分。
// src/input/video.rs - 超声心动图视频
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

use std::{path::Path, time::Duration};

use image::DynamicImage;
use serde::Serialize;
use tracing::info;

use super::Modality;
use crate::{
  frame::{CanonicalImage, ChannelOrder, FrameError, RawFrame, canonicalize},
  metadata::{AnnotationSegment, ClinicalRecord, FrameAnnotationIndex, TabularMetadataIndex, correlate},
  output::draw_overlay,
};

const DEFAULT_FPS: f64 = 30.0;

/// 视频容器解码器
///
/// 返回全部帧和容器级字段。容器能打开但没有帧时应返回空的帧序列而不是错误。
pub trait VideoDecoder {
  type Error: std::error::Error + Send + Sync + 'static;

  fn decode(&self, path: &Path) -> Result<DecodedVideo, Self::Error>;
}

/// 解码器的原始输出
#[derive(Debug, Clone, Default)]
pub struct DecodedVideo {
  pub frames: Vec<RawFrame>,
  /// 帧数据的通道顺序，加载时统一转换为 RGB
  pub channel_order: ChannelOrder,
  pub fps: f64,
  /// 容器声明的帧数，可能与实际解码出的帧数不同
  pub total_frames: u64,
  pub width: u32,
  pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
  pub modality: Modality,
  pub filename: String,
  /// 文件后缀，如 `.avi`
  pub format: String,
  pub fps: f64,
  pub total_frames: u64,
  pub width: u32,
  pub height: u32,
  /// 实际解码出的帧数
  pub frame_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub clinical: Option<ClinicalRecord>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub annotations: Option<FrameAnnotationIndex>,
}

impl VideoMetadata {
  /// 播放用的帧率，缺失或非正时取 30
  pub fn playback_fps(&self) -> f64 {
    if self.fps > 0.0 { self.fps } else { DEFAULT_FPS }
  }

  /// 相邻两帧的播放间隔（毫秒取整）
  pub fn frame_interval(&self) -> Duration {
    Duration::from_millis((1000.0 / self.playback_fps()) as u64)
  }

  pub fn summary(&self) -> String {
    let mut text = format!(
      "{} frames @ {:.1} fps",
      self.frame_count,
      self.playback_fps()
    );
    if let Some(clinical) = &self.clinical {
      text.push_str(&format!(
        "\nEF: {:.2}% | ESV: {:.2} | EDV: {:.2}",
        clinical.ef, clinical.esv, clinical.edv
      ));
    }
    if let Some(annotations) = &self.annotations {
      text.push_str(&format!(
        "\nVolume tracings: {} frames marked",
        annotations.len()
      ));
    }
    text
  }
}

/// 已加载的超声心动图：RGB 帧序列和关联好的元数据
#[derive(Debug, Clone)]
pub struct EchoVideo {
  frames: Vec<RawFrame>,
  metadata: VideoMetadata,
}

impl EchoVideo {
  /// 校正通道顺序并按文件名关联表格元数据
  pub fn from_decoded(path: &Path, decoded: DecodedVideo, index: &TabularMetadataIndex) -> Self {
    let filename = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let format = path
      .extension()
      .map(|ext| format!(".{}", ext.to_string_lossy()))
      .unwrap_or_default();

    let order = decoded.channel_order;
    let frames: Vec<RawFrame> = decoded
      .frames
      .into_iter()
      .map(|frame| frame.into_channel_order(order))
      .collect();

    let correlation = correlate(&filename, index);
    info!(
      "{}: {} 帧, {} fps, 临床指标 {}, 标注 {} 帧",
      filename,
      frames.len(),
      decoded.fps,
      if correlation.clinical.is_some() { "已关联" } else { "无" },
      correlation.annotations.len()
    );

    let metadata = VideoMetadata {
      modality: Modality::Echocardiography,
      filename,
      format,
      fps: decoded.fps,
      total_frames: decoded.total_frames,
      width: decoded.width,
      height: decoded.height,
      frame_count: frames.len(),
      clinical: correlation.clinical,
      annotations: (!correlation.annotations.is_empty()).then_some(correlation.annotations),
    };

    Self { frames, metadata }
  }

  pub fn frames(&self) -> &[RawFrame] {
    &self.frames
  }

  pub fn metadata(&self) -> &VideoMetadata {
    &self.metadata
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  /// 指定帧的标注线段
  pub fn segments(&self, index: usize) -> &[AnnotationSegment] {
    match (&self.metadata.annotations, u32::try_from(index)) {
      (Some(annotations), Ok(frame)) => annotations.segments(frame),
      _ => &[],
    }
  }

  /// 规范化第 `index` 帧并叠加该帧的标注，越界时返回 `None`
  ///
  /// 带标注的视频中灰度帧一律提升为 RGB，没有线段的帧也不例外。
  pub fn render_frame(&self, index: usize) -> Result<Option<CanonicalImage>, FrameError> {
    let Some(frame) = self.frames.get(index) else {
      return Ok(None);
    };

    let image = canonicalize(frame)?;
    if self.metadata.annotations.is_none() {
      return Ok(Some(image));
    }

    let image = match image {
      CanonicalImage::Gray(gray) => CanonicalImage::Rgb(DynamicImage::ImageLuma8(gray).to_rgb8()),
      other => other,
    };
    Ok(Some(draw_overlay(&image, self.segments(index))))
  }

  /// 均匀抽取至多 `n` 个帧序号
  pub fn sample_indices(&self, n: usize) -> Vec<usize> {
    let len = self.frames.len();
    let count = n.min(len);
    (0..count).map(|i| i * len / count).collect()
  }
}
