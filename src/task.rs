// 该文件是 Xinjing （心镜） 项目的一部分。
// src/task.rs - 批处理与检查任务
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
  path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
  frame::canonicalize,
  input::{
    DataLoader, ImageMetadata, LoadOutcome, Modality, StillImage, VideoDecoder, VideoMetadata,
  },
};
#[cfg(feature = "save_image_file")]
use crate::output::{EcgFormat, EcgPlot};

pub trait Task<I>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I) -> Result<Self::Output, Self::Error>;
}

/// 单个录像的导出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
  Success(PathBuf),
  NotFound,
  Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
  pub results: Vec<(String, ExportStatus)>,
}

impl ExportSummary {
  pub fn success_count(&self) -> usize {
    self
      .results
      .iter()
      .filter(|(_, status)| matches!(status, ExportStatus::Success(_)))
      .count()
  }

  pub fn failures(&self) -> impl Iterator<Item = (&str, &ExportStatus)> {
    self
      .results
      .iter()
      .filter(|(_, status)| !matches!(status, ExportStatus::Success(_)))
      .map(|(id, status)| (id.as_str(), status))
  }
}

/// 把每个录像的心电图绘制为 `<recording_dir>/ecg.<png|jpg>`
#[cfg(feature = "save_image_file")]
#[derive(Default)]
pub struct EcgExportTask {
  format: EcgFormat,
  prefix: Option<String>,
  plot: EcgPlot,
}

#[cfg(feature = "save_image_file")]
impl EcgExportTask {
  pub fn with_format(mut self, format: EcgFormat) -> Self {
    self.format = format;
    self
  }

  pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
    self.prefix = prefix;
    self
  }

  pub fn with_plot(mut self, plot: EcgPlot) -> Self {
    self.plot = plot;
    self
  }

  fn export_one(&self, loader: &DataLoader, recording_id: &str) -> ExportStatus {
    let still = match loader.load_ecg(recording_id) {
      LoadOutcome::Loaded(still) => still,
      LoadOutcome::NotFound => return ExportStatus::NotFound,
      LoadOutcome::Failed(e) => return ExportStatus::Error(e.to_string()),
    };

    let path = loader
      .layout()
      .recording_dir(recording_id)
      .join(format!("ecg.{}", self.format.extension()));
    let title = format!("{} - 12-lead ECG", recording_id);

    match self.plot.save(&still.frame.first_channel(), &title, &path) {
      Ok(path) => ExportStatus::Success(path),
      Err(e) => ExportStatus::Error(e.to_string()),
    }
  }
}

#[cfg(feature = "save_image_file")]
impl<'a> Task<&'a DataLoader> for EcgExportTask {
  type Output = ExportSummary;
  type Error = anyhow::Error;

  fn run_task(self, loader: &'a DataLoader) -> Result<Self::Output, Self::Error> {
    let recordings = loader.layout().recordings(self.prefix.as_deref())?;
    info!(
      "开始导出心电图: {} 个录像, 格式 {}",
      recordings.len(),
      self.format.extension()
    );

    let mut summary = ExportSummary::default();
    for recording_id in recordings {
      let status = self.export_one(loader, &recording_id);
      match &status {
        ExportStatus::Success(path) => info!("{}: 已保存到 {}", recording_id, path.display()),
        ExportStatus::NotFound => warn!("{}: 未找到心电数据", recording_id),
        ExportStatus::Error(e) => warn!("{}: 导出失败: {}", recording_id, e),
      }
      summary.results.push((recording_id, status));
    }

    info!(
      "导出完成: {}/{} 成功",
      summary.success_count(),
      summary.results.len()
    );
    Ok(summary)
  }
}

/// 某一模态的检查结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModalityReport<M> {
  Loaded { detail: String, metadata: M },
  Placeholder { message: String },
}

impl<M> ModalityReport<M> {
  fn text(&self) -> &str {
    match self {
      ModalityReport::Loaded { detail, .. } => detail,
      ModalityReport::Placeholder { message } => message,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
  pub recording_id: String,
  pub ecg: ModalityReport<ImageMetadata>,
  pub angio: ModalityReport<ImageMetadata>,
  pub echo: ModalityReport<VideoMetadata>,
  /// 写出的图像文件，由调用方负责清理
  pub written: Vec<PathBuf>,
}

impl fmt::Display for InspectReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Patient {}", self.recording_id)?;
    let rows = [
      (Modality::Ecg, self.ecg.text()),
      (Modality::Angiography, self.angio.text()),
      (Modality::Echocardiography, self.echo.text()),
    ];
    for (modality, text) in rows {
      writeln!(f, "  {}: {}", modality, text.replace('\n', "\n    "))?;
    }
    for path in &self.written {
      writeln!(f, "  -> {}", path.display())?;
    }
    Ok(())
  }
}

/// 加载单个录像的全部模态并汇总元数据，可选地写出规范化后的图像
pub struct InspectTask<D> {
  decoder: D,
  frames: usize,
  output: Option<PathBuf>,
}

impl<D: VideoDecoder> InspectTask<D> {
  pub fn new(decoder: D) -> Self {
    Self {
      decoder,
      frames: 5,
      output: None,
    }
  }

  pub fn with_frames(mut self, frames: usize) -> Self {
    self.frames = frames;
    self
  }

  pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
    self.output = output;
    self
  }
}

fn still_report(
  outcome: &LoadOutcome<StillImage>,
  modality: Modality,
  output: Option<&Path>,
  written: &mut Vec<PathBuf>,
) -> anyhow::Result<ModalityReport<ImageMetadata>> {
  let Some(still) = outcome.loaded() else {
    return Ok(ModalityReport::Placeholder {
      message: outcome.placeholder_message(modality).unwrap_or_default(),
    });
  };

  if let Some(dir) = output {
    let name = match modality {
      Modality::Ecg => "ecg.png",
      _ => "angio.png",
    };
    match canonicalize(&still.frame) {
      Ok(image) => {
        let path = dir.join(name);
        image.save(&path)?;
        written.push(path);
      }
      Err(e) => warn!("{} 无法规范化: {}", modality, e),
    }
  }

  Ok(ModalityReport::Loaded {
    detail: still.metadata.detail(),
    metadata: still.metadata.clone(),
  })
}

impl<'a, D: VideoDecoder> Task<(&'a DataLoader, &'a str)> for InspectTask<D> {
  type Output = InspectReport;
  type Error = anyhow::Error;

  fn run_task(self, (loader, recording_id): (&'a DataLoader, &'a str)) -> Result<Self::Output, Self::Error> {
    info!("开始检查录像 {}", recording_id);
    let data = loader.load_patient(recording_id, &self.decoder);

    let output = self.output.as_ref().map(|dir| dir.join(recording_id));
    if let Some(dir) = &output {
      std::fs::create_dir_all(dir)?;
    }

    let mut written = Vec::new();
    let ecg = still_report(&data.ecg, Modality::Ecg, output.as_deref(), &mut written)?;
    let angio = still_report(&data.angio, Modality::Angiography, output.as_deref(), &mut written)?;

    let echo = match &data.echo {
      LoadOutcome::Loaded(video) if video.is_empty() => ModalityReport::Placeholder {
        message: "Echocardiography video empty".to_string(),
      },
      LoadOutcome::Loaded(video) => {
        if let Some(dir) = &output {
          for index in video.sample_indices(self.frames) {
            match video.render_frame(index) {
              Ok(Some(image)) => {
                let path = dir.join(format!("echo_frame_{:04}.png", index));
                image.save(&path)?;
                written.push(path);
              }
              Ok(None) => {}
              Err(e) => warn!("第 {} 帧无法规范化: {}", index, e),
            }
          }
        }
        ModalityReport::Loaded {
          detail: video.metadata().summary(),
          metadata: video.metadata().clone(),
        }
      }
      other => ModalityReport::Placeholder {
        message: other
          .placeholder_message(Modality::Echocardiography)
          .unwrap_or_default(),
      },
    };

    info!("{} 检查完成, 写出 {} 个文件", recording_id, written.len());
    Ok(InspectReport {
      recording_id: recording_id.to_string(),
      ecg,
      angio,
      echo,
      written,
    })
  }
}
