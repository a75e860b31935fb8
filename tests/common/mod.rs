// 该文件是 Xinjing （心镜） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use xinjing::{
  frame::{ChannelOrder, PixelBuffer, RawFrame},
  input::{DataLayout, DataLoader, DecodedVideo, VideoDecoder},
};

/// 临时目录下的 `data/<id>/` 与 `Echocardiography/` 布局
pub struct Fixture {
  temp_dir: TempDir,
}

impl Fixture {
  pub fn new() -> Self {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("data")).unwrap();
    Self { temp_dir }
  }

  pub fn data_root(&self) -> PathBuf {
    self.temp_dir.path().join("data")
  }

  pub fn recording(&self, id: &str) -> PathBuf {
    let dir = self.data_root().join(id);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  pub fn write(&self, id: &str, name: &str, contents: &[u8]) -> PathBuf {
    let path = self.recording(id).join(name);
    std::fs::write(&path, contents).unwrap();
    path
  }

  pub fn write_metadata(&self, name: &str, contents: &str) {
    let dir = self.temp_dir.path().join("Echocardiography");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
  }

  pub fn loader(&self) -> DataLoader {
    DataLoader::new(DataLayout::new(self.data_root()))
  }
}

#[derive(Debug, thiserror::Error)]
#[error("fake decoder failure: {0}")]
pub struct FakeDecodeError(pub String);

/// 不依赖 GStreamer 的解码器，返回预先准备好的帧
pub struct FakeDecoder {
  video: Option<DecodedVideo>,
}

impl FakeDecoder {
  pub fn new(video: DecodedVideo) -> Self {
    Self { video: Some(video) }
  }

  pub fn failing() -> Self {
    Self { video: None }
  }
}

impl VideoDecoder for FakeDecoder {
  type Error = FakeDecodeError;

  fn decode(&self, path: &Path) -> Result<DecodedVideo, Self::Error> {
    self
      .video
      .clone()
      .ok_or_else(|| FakeDecodeError(path.display().to_string()))
  }
}

/// `count` 个 BGR 帧，第 `i` 帧的像素为 `[i, 100, 200]`
pub fn bgr_video(count: usize, width: usize, height: usize, fps: f64) -> DecodedVideo {
  let frames = (0..count)
    .map(|i| {
      let pixels = [i as u8, 100, 200].repeat(width * height);
      RawFrame::new(vec![height, width, 3], PixelBuffer::U8(pixels)).unwrap()
    })
    .collect();

  DecodedVideo {
    frames,
    channel_order: ChannelOrder::Bgr,
    fps,
    total_frames: count as u64,
    width: width as u32,
    height: height as u32,
  }
}
