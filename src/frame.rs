// 该文件是 Xinjing （心镜） 项目的一部分。
// src/frame.rs - 原始帧定义
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

use thiserror::Error;

mod canonical;
pub use self::canonical::{CanonicalImage, ImageLayout, canonicalize};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  ShapeMismatch { expected: usize, actual: usize },
  #[error("不支持的帧形状: {shape:?}")]
  UnsupportedFrameShape { shape: Vec<usize> },
}

/// 像素元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
  U8,
  U16,
  U32,
  U64,
  I8,
  I16,
  I32,
  I64,
  F32,
  F64,
}

/// 按行主序（H×W×C）存放的像素数据
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
  U8(Vec<u8>),
  U16(Vec<u16>),
  U32(Vec<u32>),
  U64(Vec<u64>),
  I8(Vec<i8>),
  I16(Vec<i16>),
  I32(Vec<i32>),
  I64(Vec<i64>),
  F32(Vec<f32>),
  F64(Vec<f64>),
}

macro_rules! for_each_buffer {
  ($buffer:expr, $data:ident => $body:expr) => {
    match $buffer {
      PixelBuffer::U8($data) => $body,
      PixelBuffer::U16($data) => $body,
      PixelBuffer::U32($data) => $body,
      PixelBuffer::U64($data) => $body,
      PixelBuffer::I8($data) => $body,
      PixelBuffer::I16($data) => $body,
      PixelBuffer::I32($data) => $body,
      PixelBuffer::I64($data) => $body,
      PixelBuffer::F32($data) => $body,
      PixelBuffer::F64($data) => $body,
    }
  };
}

impl PixelBuffer {
  pub fn len(&self) -> usize {
    for_each_buffer!(self, data => data.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn pixel_type(&self) -> PixelType {
    match self {
      PixelBuffer::U8(_) => PixelType::U8,
      PixelBuffer::U16(_) => PixelType::U16,
      PixelBuffer::U32(_) => PixelType::U32,
      PixelBuffer::U64(_) => PixelType::U64,
      PixelBuffer::I8(_) => PixelType::I8,
      PixelBuffer::I16(_) => PixelType::I16,
      PixelBuffer::I32(_) => PixelType::I32,
      PixelBuffer::I64(_) => PixelType::I64,
      PixelBuffer::F32(_) => PixelType::F32,
      PixelBuffer::F64(_) => PixelType::F64,
    }
  }

  /// 读取第 `index` 个元素并转为 `f64`，用于绘制信号曲线
  pub fn value_f64(&self, index: usize) -> Option<f64> {
    for_each_buffer!(self, data => data.get(index).map(|v| *v as f64))
  }
}

/// 视频解码器输出的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 单张静态图像或单个视频帧的原始数组
///
/// 形状为 H×W（单通道）或 H×W×C，数据按行主序平铺。构造后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
  shape: Box<[usize]>,
  data: PixelBuffer,
}

impl RawFrame {
  pub fn new(shape: impl Into<Box<[usize]>>, data: PixelBuffer) -> Result<Self, FrameError> {
    let shape = shape.into();
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(FrameError::ShapeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self { shape, data })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  pub fn height(&self) -> usize {
    self.shape.first().copied().unwrap_or(0)
  }

  pub fn width(&self) -> usize {
    self.shape.get(1).copied().unwrap_or(1)
  }

  /// 通道数，二维数组视为单通道
  pub fn channel_count(&self) -> usize {
    match self.rank() {
      0..=2 => 1,
      _ => self.shape[2],
    }
  }

  pub fn pixel_type(&self) -> PixelType {
    self.data.pixel_type()
  }

  pub fn data(&self) -> &PixelBuffer {
    &self.data
  }

  /// 将 BGR(A) 帧转换为 RGB(A) 顺序，其余形状原样返回
  pub fn into_channel_order(self, from: ChannelOrder) -> Self {
    if from == ChannelOrder::Rgb || self.rank() != 3 || self.channel_count() < 3 {
      return self;
    }

    let channels = self.channel_count();
    let RawFrame { shape, mut data } = self;
    for_each_buffer!(&mut data, values => {
      for pixel in values.chunks_exact_mut(channels) {
        pixel.swap(0, 2);
      }
    });
    RawFrame { shape, data }
  }

  /// 信号视图：第一维为采样点，取每个采样点的第一个元素（第一导联）
  pub fn first_channel(&self) -> Vec<f64> {
    let samples = self.height();
    if samples == 0 {
      return Vec::new();
    }
    let stride = self.shape.iter().skip(1).product::<usize>();
    (0..samples)
      .filter_map(|i| self.data.value_f64(i * stride))
      .collect()
  }
}

impl From<image::GrayImage> for RawFrame {
  fn from(image: image::GrayImage) -> Self {
    let (width, height) = image.dimensions();
    RawFrame {
      shape: vec![height as usize, width as usize].into_boxed_slice(),
      data: PixelBuffer::U8(image.into_raw()),
    }
  }
}

impl From<image::RgbImage> for RawFrame {
  fn from(image: image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    RawFrame {
      shape: vec![height as usize, width as usize, 3].into_boxed_slice(),
      data: PixelBuffer::U8(image.into_raw()),
    }
  }
}

impl From<image::RgbaImage> for RawFrame {
  fn from(image: image::RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    RawFrame {
      shape: vec![height as usize, width as usize, 4].into_boxed_slice(),
      data: PixelBuffer::U8(image.into_raw()),
    }
  }
}
