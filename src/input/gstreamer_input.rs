// 该文件是 Xinjing （心镜） 项目的一部分。
// src/input/gstreamer_input.rs - 基于 GStreamer 的视频解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频解码
//!
//! 通过 `filesrc ! decodebin ! videoconvert ! appsink` 管道把整个容器解码为帧序列。
//! appsink 输出固定为 BGR，交由加载器统一转换为 RGB。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! **macOS:**
//! ```bash
//! brew install gstreamer
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use std::path::Path;
//! use xinjing::input::{GStreamerDecoder, VideoDecoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let video = GStreamerDecoder::default().decode(Path::new("data/p001/echo.avi"))?;
//! println!("{} 帧 @ {} fps", video.frames.len(), video.fps);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::video::{DecodedVideo, VideoDecoder};
use crate::frame::{ChannelOrder, FrameError, PixelBuffer, RawFrame};

const PIPELINE_DESCRIPTION: &str = "filesrc name=src ! decodebin ! videoconvert ! \
   video/x-raw,format=BGR ! appsink name=sink sync=false";

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Failed to get element: {0}")]
  ElementNotFound(&'static str),
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Path is not valid UTF-8")]
  InvalidPath,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("No sample within {0} ms")]
  Timeout(u64),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
}

/// 基于 GStreamer 的 [`VideoDecoder`]
#[derive(Debug, Clone)]
pub struct GStreamerDecoder {
  poll_interval: gst::ClockTime,
  idle_timeout: gst::ClockTime,
}

impl Default for GStreamerDecoder {
  fn default() -> Self {
    Self {
      poll_interval: gst::ClockTime::from_mseconds(100),
      idle_timeout: gst::ClockTime::from_seconds(10),
    }
  }
}

// 离开作用域时停止管道
struct RunningPipeline {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for RunningPipeline {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl RunningPipeline {
  fn start(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let location = path.to_str().ok_or(GStreamerInputError::InvalidPath)?;
    info!("GStreamer pipeline description: {} ({})", PIPELINE_DESCRIPTION, location);

    let pipeline = gst::parse::launch(PIPELINE_DESCRIPTION)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    pipeline
      .by_name("src")
      .ok_or(GStreamerInputError::ElementNotFound("src"))?
      .set_property("location", location);

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::ElementNotFound("sink"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    let running = RunningPipeline { pipeline, appsink };
    running.pipeline.set_state(gst::State::Playing)?;
    Ok(running)
  }

  fn bus_error(&self) -> Option<GStreamerInputError> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(GStreamerInputError::PipelineError(format!(
        "{} ({:?})",
        err.error(),
        err.debug()
      ))),
      _ => None,
    }
  }

  fn duration_seconds(&self) -> Option<f64> {
    self
      .pipeline
      .query_duration::<gst::ClockTime>()
      .map(|duration| duration.nseconds() as f64 / 1e9)
  }
}

struct SampleFrame {
  frame: RawFrame,
  order: ChannelOrder,
  fps: f64,
  width: u32,
  height: u32,
}

impl VideoDecoder for GStreamerDecoder {
  type Error = GStreamerInputError;

  fn decode(&self, path: &Path) -> Result<DecodedVideo, Self::Error> {
    let running = RunningPipeline::start(path)?;

    let mut video = DecodedVideo::default();
    let mut idle = gst::ClockTime::ZERO;
    loop {
      if let Some(sample) = running.appsink.try_pull_sample(self.poll_interval) {
        idle = gst::ClockTime::ZERO;
        let SampleFrame {
          frame,
          order,
          fps,
          width,
          height,
        } = convert_sample(&sample)?;
        if video.frames.is_empty() {
          video.channel_order = order;
          video.fps = fps;
          video.width = width;
          video.height = height;
        }
        video.frames.push(frame);
        continue;
      }

      if running.appsink.is_eos() {
        debug!("{}: 到达流末尾", path.display());
        break;
      }
      if let Some(error) = running.bus_error() {
        return Err(error);
      }

      idle += self.poll_interval;
      if idle >= self.idle_timeout {
        return Err(GStreamerInputError::Timeout(idle.mseconds()));
      }
    }

    video.total_frames = match running.duration_seconds() {
      Some(seconds) if video.fps > 0.0 => (seconds * video.fps).round() as u64,
      _ => video.frames.len() as u64,
    };

    info!(
      "解码完成: {} 帧 (容器声明 {} 帧), {}x{} @ {:.2} fps",
      video.frames.len(),
      video.total_frames,
      video.width,
      video.height,
      video.fps
    );

    Ok(video)
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<SampleFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let order = match video_info.format() {
    gst_video::VideoFormat::Rgb => ChannelOrder::Rgb,
    gst_video::VideoFormat::Bgr => ChannelOrder::Bgr,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row = width * 3;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 行尾可能有对齐填充，逐行拷贝
  let expected = if height == 0 { 0 } else { stride * (height - 1) + row };
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row * height);
  for y in 0..height {
    let start = y * stride;
    pixels.extend_from_slice(&data[start..start + row]);
  }

  let fps = video_info.fps();
  let fps = if fps.denom() > 0 {
    fps.numer() as f64 / fps.denom() as f64
  } else {
    0.0
  };

  Ok(SampleFrame {
    frame: RawFrame::new(vec![height, width, 3], PixelBuffer::U8(pixels))?,
    order,
    fps,
    width: width as u32,
    height: height as u32,
  })
}
