// 该文件是 Xinjing （心镜） 项目的一部分。
// src/metadata/correlate.rs - 视频文件与表格元数据的关联
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

use std::path::Path;

use super::{ClinicalRecord, FrameAnnotationIndex, TabularMetadataIndex};

/// 标注表的文件名匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
  /// 与带扩展名的文件名完全相同
  Exact,
  /// 以第一个 `.` 之前的部分为前缀
  StemPrefix,
}

impl MatchStrategy {
  pub const ORDER: [MatchStrategy; 2] = [MatchStrategy::Exact, MatchStrategy::StemPrefix];

  /// 用于比较的键，空前缀会匹配所有行，因此不参与匹配
  pub fn key(self, filename: &str) -> Option<&str> {
    match self {
      MatchStrategy::Exact => Some(filename),
      MatchStrategy::StemPrefix => filename.split('.').next().filter(|stem| !stem.is_empty()),
    }
  }

  pub fn matches(self, key: &str, candidate: &str) -> bool {
    match self {
      MatchStrategy::Exact => candidate == key,
      MatchStrategy::StemPrefix => candidate.starts_with(key),
    }
  }
}

/// 一个视频文件关联到的全部元数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
  pub clinical: Option<ClinicalRecord>,
  pub annotations: FrameAnnotationIndex,
}

/// 以视频文件名关联临床指标与逐帧标注
///
/// 临床指标按去掉扩展名的文件名查找，标注按完整文件名查找。不修改索引。
pub fn correlate(video_filename: &str, index: &TabularMetadataIndex) -> Correlation {
  let stem = Path::new(video_filename)
    .file_stem()
    .and_then(|stem| stem.to_str())
    .unwrap_or(video_filename);

  Correlation {
    clinical: index.lookup_clinical(stem),
    annotations: index.lookup_annotations(video_filename),
  }
}
