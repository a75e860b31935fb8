// 该文件是 Xinjing （心镜） 项目的一部分。
// src/bin/export_ecg.rs - 批量导出心电图
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use xinjing::{
  input::{DataLayout, DataLoader},
  output::{EcgFormat, EcgPlot},
  task::{EcgExportTask, ExportStatus, Task},
};

/// 把每个录像的心电图绘制为图像文件
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据根目录
  #[arg(long, value_name = "DIR")]
  pub data: PathBuf,
  /// 输出格式（png 或 jpg）
  #[arg(long, default_value = "png", value_name = "FORMAT")]
  pub format: EcgFormat,
  /// 只处理以此开头的录像目录
  #[arg(long, default_value = "p", value_name = "PREFIX")]
  pub prefix: String,
  /// 标题字体（TTF/OTF），缺省时使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("数据目录: {}", args.data.display());
  info!("输出格式: {}", args.format.extension());

  let mut plot = EcgPlot::default();
  if let Some(font) = &args.font {
    plot = plot.with_font_file(font)?;
  }

  let loader = DataLoader::new(DataLayout::new(&args.data));
  let summary = EcgExportTask::default()
    .with_format(args.format)
    .with_prefix(Some(args.prefix))
    .with_plot(plot)
    .run_task(&loader)?;

  info!(
    "成功: {}/{}",
    summary.success_count(),
    summary.results.len()
  );
  for (recording_id, status) in summary.failures() {
    match status {
      ExportStatus::NotFound => warn!("{}: not_found", recording_id),
      ExportStatus::Error(e) => warn!("{}: error: {}", recording_id, e),
      ExportStatus::Success(_) => {}
    }
  }

  Ok(())
}
