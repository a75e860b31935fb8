// 该文件是 Xinjing （心镜） 项目的一部分。
// src/input.rs - 多模态数据加载
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
  fmt,
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{frame::FrameError, frame::RawFrame, metadata::TabularMetadataIndex};

mod read_image_file;
pub use self::read_image_file::{ImageMetadata, StillImage, read_image_file};

mod video;
pub use self::video::{DecodedVideo, EchoVideo, VideoDecoder, VideoMetadata};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerDecoder, GStreamerInputError};

const ECG_PREFIX: &str = "ecg_visualization_";
const ECG_EXPORT_STEM: &str = "ecg";
const VIDEO_EXTENSIONS: [&str; 2] = ["mp4", "avi"];

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("无法读取 {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法解码 {}: {source}", .path.display())]
  Decode {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("无法解码视频 {}: {source}", .path.display())]
  VideoDecode {
    path: PathBuf,
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("{0}")]
  UnsupportedFrameShape(#[from] FrameError),
}

/// 成像模态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Modality {
  #[serde(rename = "ECG")]
  Ecg,
  #[serde(rename = "Cardiac Angiography")]
  Angiography,
  #[serde(rename = "Echocardiography")]
  Echocardiography,
}

impl Modality {
  pub fn label(self) -> &'static str {
    match self {
      Modality::Ecg => "ECG",
      Modality::Angiography => "Cardiac Angiography",
      Modality::Echocardiography => "Echocardiography",
    }
  }

  fn not_found_message(self) -> &'static str {
    match self {
      Modality::Ecg => "ECG data not found",
      Modality::Angiography => "Angiography image not found",
      Modality::Echocardiography => "Echocardiography video not found",
    }
  }

  fn short_name(self) -> &'static str {
    match self {
      Modality::Ecg => "ECG",
      Modality::Angiography => "Angiography",
      Modality::Echocardiography => "Echo",
    }
  }
}

impl fmt::Display for Modality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// 加载器边界上的结果：已加载、未找到或失败
///
/// 未找到属于正常情况，失败携带原因。两者都只会变成占位提示，不会向上传播。
#[derive(Debug)]
pub enum LoadOutcome<T> {
  Loaded(T),
  NotFound,
  Failed(LoadError),
}

impl<T> LoadOutcome<T> {
  fn from_result(result: Result<Option<T>, LoadError>) -> Self {
    match result {
      Ok(Some(value)) => LoadOutcome::Loaded(value),
      Ok(None) => LoadOutcome::NotFound,
      Err(e) => LoadOutcome::Failed(e),
    }
  }

  pub fn loaded(&self) -> Option<&T> {
    match self {
      LoadOutcome::Loaded(value) => Some(value),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, LoadOutcome::NotFound)
  }

  /// 未加载成功时的占位提示
  pub fn placeholder_message(&self, modality: Modality) -> Option<String> {
    match self {
      LoadOutcome::Loaded(_) => None,
      LoadOutcome::NotFound => Some(modality.not_found_message().to_string()),
      LoadOutcome::Failed(e) => Some(format!("Error displaying {}: {}", modality.short_name(), e)),
    }
  }
}

/// 某一模态可供显示的帧来源
#[derive(Debug, Clone, Copy)]
pub enum FrameSource<'a> {
  StillImage(&'a RawFrame),
  VideoSequence(&'a [RawFrame]),
  Absent,
}

/// 单个录像的全部模态
#[derive(Debug)]
pub struct PatientData {
  pub recording_id: String,
  pub ecg: LoadOutcome<StillImage>,
  pub angio: LoadOutcome<StillImage>,
  pub echo: LoadOutcome<EchoVideo>,
}

impl PatientData {
  pub fn frame_source(&self, modality: Modality) -> FrameSource<'_> {
    fn still<'a>(outcome: &'a LoadOutcome<StillImage>) -> FrameSource<'a> {
      match outcome.loaded() {
        Some(image) => FrameSource::StillImage(&image.frame),
        None => FrameSource::Absent,
      }
    }

    match modality {
      Modality::Ecg => still(&self.ecg),
      Modality::Angiography => still(&self.angio),
      Modality::Echocardiography => match self.echo.loaded() {
        Some(video) => FrameSource::VideoSequence(video.frames()),
        None => FrameSource::Absent,
      },
    }
  }
}

/// 数据目录约定
///
/// `<data_root>/<recording_id>/` 存放各模态文件，表格元数据默认位于
/// `<data_root>/../Echocardiography/`。
#[derive(Debug, Clone)]
pub struct DataLayout {
  data_root: PathBuf,
  metadata_dir: PathBuf,
}

impl DataLayout {
  pub fn new(data_root: impl Into<PathBuf>) -> Self {
    let data_root = data_root.into();
    let metadata_dir = data_root
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default()
      .join("Echocardiography");
    Self {
      data_root,
      metadata_dir,
    }
  }

  pub fn with_metadata_dir(mut self, metadata_dir: impl Into<PathBuf>) -> Self {
    self.metadata_dir = metadata_dir.into();
    self
  }

  pub fn data_root(&self) -> &Path {
    &self.data_root
  }

  pub fn metadata_dir(&self) -> &Path {
    &self.metadata_dir
  }

  pub fn recording_dir(&self, recording_id: &str) -> PathBuf {
    self.data_root.join(recording_id)
  }

  /// 按名称排序的录像目录，可按前缀过滤
  pub fn recordings(&self, prefix: Option<&str>) -> std::io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&self.data_root)? {
      let entry = entry?;
      if !entry.file_type()?.is_dir() {
        continue;
      }
      let Ok(name) = entry.file_name().into_string() else {
        continue;
      };
      if prefix.is_none_or(|p| name.starts_with(p)) {
        ids.push(name);
      }
    }
    ids.sort();
    Ok(ids)
  }
}

/// 目录中按名称排序后第一个满足条件的文件，目录不存在时视为未找到
fn find_file(dir: &Path, accept: impl Fn(&str) -> bool) -> Result<Option<PathBuf>, LoadError> {
  let io_error = |source: std::io::Error| LoadError::Io {
    path: dir.to_path_buf(),
    source,
  };

  let entries = match std::fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == ErrorKind::NotFound => {
      debug!("录像目录不存在: {}", dir.display());
      return Ok(None);
    }
    Err(e) => return Err(io_error(e)),
  };

  let mut names = Vec::new();
  for entry in entries {
    let entry = entry.map_err(io_error)?;
    if !entry.file_type().map_err(io_error)?.is_file() {
      continue;
    }
    if let Ok(name) = entry.file_name().into_string()
      && accept(&name)
    {
      names.push(name);
    }
  }
  names.sort();

  Ok(names.into_iter().next().map(|name| dir.join(name)))
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
  name.rsplit_once('.').filter(|(stem, _)| !stem.is_empty())
}

fn is_ecg_image(name: &str) -> bool {
  name.starts_with(ECG_PREFIX) && split_extension(name).is_some_and(|(_, ext)| ext == "png")
}

// 导出的心电图 `ecg.png` 也不算造影图像
fn is_angio_image(name: &str) -> bool {
  split_extension(name)
    .is_some_and(|(stem, ext)| ext == "png" && stem != ECG_EXPORT_STEM)
    && !name.starts_with(ECG_PREFIX)
}

/// 按录像标识加载各模态数据
///
/// 加载过程同步、无状态，表格元数据索引在构造时加载一次并共享。
#[derive(Debug, Clone)]
pub struct DataLoader {
  layout: DataLayout,
  index: Arc<TabularMetadataIndex>,
}

impl DataLoader {
  pub fn new(layout: DataLayout) -> Self {
    let index = TabularMetadataIndex::load_dir(layout.metadata_dir());
    Self::with_index(layout, Arc::new(index))
  }

  pub fn with_index(layout: DataLayout, index: Arc<TabularMetadataIndex>) -> Self {
    Self { layout, index }
  }

  pub fn layout(&self) -> &DataLayout {
    &self.layout
  }

  pub fn index(&self) -> &TabularMetadataIndex {
    &self.index
  }

  /// 某一模态的源文件路径
  pub fn modality_file(&self, recording_id: &str, modality: Modality) -> Option<PathBuf> {
    let dir = self.layout.recording_dir(recording_id);
    let found = match modality {
      Modality::Ecg => find_file(&dir, is_ecg_image),
      Modality::Angiography => find_file(&dir, is_angio_image),
      Modality::Echocardiography => find_video(&dir),
    };
    found.unwrap_or_else(|e| {
      warn!("无法列出 {}: {}", dir.display(), e);
      None
    })
  }

  pub fn load_ecg(&self, recording_id: &str) -> LoadOutcome<StillImage> {
    self.load_still(recording_id, Modality::Ecg, is_ecg_image)
  }

  pub fn load_angio(&self, recording_id: &str) -> LoadOutcome<StillImage> {
    self.load_still(recording_id, Modality::Angiography, is_angio_image)
  }

  fn load_still(
    &self,
    recording_id: &str,
    modality: Modality,
    accept: fn(&str) -> bool,
  ) -> LoadOutcome<StillImage> {
    let dir = self.layout.recording_dir(recording_id);
    let result = find_file(&dir, accept).and_then(|found| {
      found
        .map(|path| read_image_file(&path, modality))
        .transpose()
    });
    log_outcome(recording_id, modality, LoadOutcome::from_result(result))
  }

  /// 加载超声心动图视频并关联表格元数据
  ///
  /// 先找 `*.mp4` 再找 `*.avi`；容器能解码但没有帧时返回空序列，而不是未找到。
  pub fn load_echo<D: VideoDecoder>(&self, recording_id: &str, decoder: &D) -> LoadOutcome<EchoVideo> {
    let dir = self.layout.recording_dir(recording_id);
    let result = find_video(&dir).and_then(|found| {
      found
        .map(|path| {
          let decoded = decoder.decode(&path).map_err(|e| LoadError::VideoDecode {
            path: path.clone(),
            source: Box::new(e),
          })?;
          Ok(EchoVideo::from_decoded(&path, decoded, &self.index))
        })
        .transpose()
    });
    log_outcome(
      recording_id,
      Modality::Echocardiography,
      LoadOutcome::from_result(result),
    )
  }

  pub fn load_patient<D: VideoDecoder>(&self, recording_id: &str, decoder: &D) -> PatientData {
    info!("加载录像 {}", recording_id);
    PatientData {
      recording_id: recording_id.to_string(),
      ecg: self.load_ecg(recording_id),
      angio: self.load_angio(recording_id),
      echo: self.load_echo(recording_id, decoder),
    }
  }
}

fn find_video(dir: &Path) -> Result<Option<PathBuf>, LoadError> {
  for extension in VIDEO_EXTENSIONS {
    let found = find_file(dir, |name| {
      split_extension(name).is_some_and(|(_, ext)| ext == extension)
    })?;
    if found.is_some() {
      return Ok(found);
    }
  }
  Ok(None)
}

fn log_outcome<T>(recording_id: &str, modality: Modality, outcome: LoadOutcome<T>) -> LoadOutcome<T> {
  match &outcome {
    LoadOutcome::Loaded(_) => debug!("{}: 已加载 {}", recording_id, modality),
    LoadOutcome::NotFound => debug!("{}: 未找到 {}", recording_id, modality),
    LoadOutcome::Failed(e) => warn!("{}: 加载 {} 失败: {}", recording_id, modality, e),
  }
  outcome
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_name_rules() {
    assert!(is_ecg_image("ecg_visualization_1.png"));
    assert!(!is_ecg_image("ecg_visualization_1.jpg"));
    assert!(!is_ecg_image("angio.png"));

    assert!(is_angio_image("angio.png"));
    assert!(is_angio_image("ecg_notes.png"));
    assert!(!is_angio_image("ecg.png"));
    assert!(!is_angio_image("ecg_visualization_1.png"));
    assert!(!is_angio_image(".png"));
    assert!(!is_angio_image("angio.jpg"));
  }

  #[test]
  fn metadata_dir_defaults_to_sibling() {
    let layout = DataLayout::new("/srv/cardiac/data");
    assert_eq!(
      layout.metadata_dir(),
      Path::new("/srv/cardiac/Echocardiography")
    );
    assert_eq!(
      layout.recording_dir("p001"),
      PathBuf::from("/srv/cardiac/data/p001")
    );

    let custom = layout.with_metadata_dir("/tmp/meta");
    assert_eq!(custom.metadata_dir(), Path::new("/tmp/meta"));
  }

  #[test]
  fn recordings_are_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["p010", "p002", "q001"] {
      std::fs::create_dir(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("p999.txt"), b"").unwrap();

    let layout = DataLayout::new(dir.path());
    assert_eq!(layout.recordings(Some("p")).unwrap(), vec!["p002", "p010"]);
    assert_eq!(layout.recordings(None).unwrap().len(), 3);
  }

  #[test]
  fn video_search_prefers_mp4() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.avi"), b"").unwrap();
    std::fs::write(dir.path().join("z.mp4"), b"").unwrap();

    let found = find_video(dir.path()).unwrap();
    assert_eq!(found, Some(dir.path().join("z.mp4")));
    assert_eq!(find_video(&dir.path().join("missing")).unwrap(), None);
  }

  #[test]
  fn placeholder_messages() {
    let not_found: LoadOutcome<()> = LoadOutcome::NotFound;
    assert_eq!(
      not_found.placeholder_message(Modality::Angiography).as_deref(),
      Some("Angiography image not found")
    );

    let failed: LoadOutcome<()> = LoadOutcome::Failed(LoadError::from(
      FrameError::UnsupportedFrameShape { shape: vec![2] },
    ));
    let message = failed.placeholder_message(Modality::Ecg).unwrap();
    assert!(message.starts_with("Error displaying ECG: "));

    assert_eq!(LoadOutcome::Loaded(()).placeholder_message(Modality::Ecg), None);
  }
}
