// 该文件是 Xinjing （心镜） 项目的一部分。
// src/metadata.rs - 超声心动图表格元数据索引
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

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

mod correlate;
pub use self::correlate::{Correlation, MatchStrategy, correlate};

pub const FILE_LIST_CSV: &str = "FileList.csv";
pub const VOLUME_TRACINGS_CSV: &str = "VolumeTracings.csv";

#[derive(Error, Debug)]
pub enum MetadataError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("表格格式错误: {0}")]
  Csv(#[from] csv::Error),
}

/// 单个录像的临床指标（FileList.csv 的一行）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalRecord {
  pub filename: String,
  /// 射血分数（%）
  pub ef: f64,
  /// 收缩末期容积
  pub esv: f64,
  /// 舒张末期容积
  pub edv: f64,
  pub frame_height: u32,
  pub frame_width: u32,
  pub fps: f64,
  pub number_of_frames: u32,
}

/// 一条标注线段，坐标为帧像素坐标，可能超出帧边界
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnnotationSegment {
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
}

impl AnnotationSegment {
  pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
    Self { x1, y1, x2, y2 }
  }
}

/// 帧序号到标注线段的稀疏映射，同一帧内保持表格行顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrameAnnotationIndex {
  frames: BTreeMap<u32, Vec<AnnotationSegment>>,
}

impl FrameAnnotationIndex {
  pub fn push(&mut self, frame: u32, segment: AnnotationSegment) {
    self.frames.entry(frame).or_default().push(segment);
  }

  /// 指定帧的线段，没有标注时返回空切片
  pub fn segments(&self, frame: u32) -> &[AnnotationSegment] {
    self
      .frames
      .get(&frame)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn contains(&self, frame: u32) -> bool {
    self.frames.contains_key(&frame)
  }

  /// 有标注的帧数
  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &[AnnotationSegment])> {
    self
      .frames
      .iter()
      .map(|(frame, segments)| (*frame, segments.as_slice()))
  }
}

// 整数列按浮点读入，兼容 `112.0` 这样的写法
#[derive(Debug, Clone, Deserialize)]
struct FileListRow {
  #[serde(rename = "FileName")]
  filename: String,
  #[serde(rename = "EF")]
  ef: f64,
  #[serde(rename = "ESV")]
  esv: f64,
  #[serde(rename = "EDV")]
  edv: f64,
  #[serde(rename = "FrameHeight")]
  frame_height: f64,
  #[serde(rename = "FrameWidth")]
  frame_width: f64,
  #[serde(rename = "FPS")]
  fps: f64,
  #[serde(rename = "NumberOfFrames")]
  number_of_frames: f64,
}

impl From<&FileListRow> for ClinicalRecord {
  fn from(row: &FileListRow) -> Self {
    ClinicalRecord {
      filename: row.filename.clone(),
      ef: row.ef,
      esv: row.esv,
      edv: row.edv,
      frame_height: row.frame_height as u32,
      frame_width: row.frame_width as u32,
      fps: row.fps,
      number_of_frames: row.number_of_frames as u32,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
struct TracingRow {
  #[serde(rename = "FileName")]
  filename: String,
  #[serde(rename = "Frame")]
  frame: f64,
  #[serde(rename = "X1")]
  x1: f64,
  #[serde(rename = "Y1")]
  y1: f64,
  #[serde(rename = "X2")]
  x2: f64,
  #[serde(rename = "Y2")]
  y2: f64,
}

impl TracingRow {
  fn segment(&self) -> AnnotationSegment {
    AnnotationSegment::new(self.x1, self.y1, self.x2, self.y2)
  }

  /// 负数、非有限值或超出 `u32` 的帧号不对应任何视频帧
  fn frame_index(&self) -> Option<u32> {
    if !self.frame.is_finite() || self.frame < 0.0 || self.frame > u32::MAX as f64 {
      return None;
    }
    Some(self.frame as u32)
  }
}

fn read_table<T, R>(reader: R) -> Result<Vec<T>, MetadataError>
where
  T: for<'de> Deserialize<'de>,
  R: Read,
{
  let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
  let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
  Ok(rows)
}

/// 只读的表格元数据索引
///
/// 启动时构造一次，之后不再修改，可以被多个调用方同时读取。
/// 任一表格缺失或格式错误时，对应的查询一律返回“未找到”。
#[derive(Debug, Clone, Default)]
pub struct TabularMetadataIndex {
  clinical: Option<Vec<FileListRow>>,
  tracings: Option<Vec<TracingRow>>,
}

impl TabularMetadataIndex {
  pub fn empty() -> Self {
    Self::default()
  }

  /// 从目录读取 `FileList.csv` 和 `VolumeTracings.csv`
  ///
  /// 缺失的文件静默跳过，格式错误的文件记录警告后视为缺失。
  pub fn load_dir(dir: impl AsRef<Path>) -> Self {
    let dir = dir.as_ref();
    let mut index = Self::empty();

    let file_list = dir.join(FILE_LIST_CSV);
    if file_list.is_file() {
      match File::open(&file_list)
        .map_err(MetadataError::from)
        .and_then(read_table::<FileListRow, _>)
      {
        Ok(rows) => {
          info!("已加载 {}: {} 行", file_list.display(), rows.len());
          index.clinical = Some(rows);
        }
        Err(e) => warn!("无法加载 {}: {}", file_list.display(), e),
      }
    } else {
      debug!("未找到 {}", file_list.display());
    }

    let tracings = dir.join(VOLUME_TRACINGS_CSV);
    if tracings.is_file() {
      match File::open(&tracings)
        .map_err(MetadataError::from)
        .and_then(read_table::<TracingRow, _>)
      {
        Ok(rows) => {
          info!("已加载 {}: {} 行", tracings.display(), rows.len());
          index.tracings = Some(rows);
        }
        Err(e) => warn!("无法加载 {}: {}", tracings.display(), e),
      }
    } else {
      debug!("未找到 {}", tracings.display());
    }

    index
  }

  pub fn with_clinical_csv<R: Read>(mut self, reader: R) -> Result<Self, MetadataError> {
    self.clinical = Some(read_table(reader)?);
    Ok(self)
  }

  pub fn with_tracings_csv<R: Read>(mut self, reader: R) -> Result<Self, MetadataError> {
    self.tracings = Some(read_table(reader)?);
    Ok(self)
  }

  pub fn has_clinical(&self) -> bool {
    self.clinical.is_some()
  }

  pub fn has_tracings(&self) -> bool {
    self.tracings.is_some()
  }

  /// 按录像标识精确匹配，返回第一条记录
  pub fn lookup_clinical(&self, recording_id: &str) -> Option<ClinicalRecord> {
    self
      .clinical
      .as_deref()?
      .iter()
      .find(|row| row.filename == recording_id)
      .map(ClinicalRecord::from)
  }

  /// 按带扩展名的文件名查找标注
  ///
  /// 依次尝试 [`MatchStrategy::ORDER`] 中的策略，第一个有结果的策略生效。
  pub fn lookup_annotations(&self, filename: &str) -> FrameAnnotationIndex {
    let mut index = FrameAnnotationIndex::default();
    let Some(rows) = self.tracings.as_deref() else {
      return index;
    };

    for strategy in MatchStrategy::ORDER {
      let Some(key) = strategy.key(filename) else {
        continue;
      };

      let mut matched = rows
        .iter()
        .filter(|row| strategy.matches(key, &row.filename))
        .peekable();
      if matched.peek().is_none() {
        continue;
      }

      for row in matched {
        match row.frame_index() {
          Some(frame) => index.push(frame, row.segment()),
          None => warn!("{}: 跳过无效帧号 {}", row.filename, row.frame),
        }
      }
      debug!(
        "{} 使用 {:?} 匹配到 {} 帧标注",
        filename,
        strategy,
        index.len()
      );
      break;
    }

    index
  }
}
