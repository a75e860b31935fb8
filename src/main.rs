// 该文件是 Xinjing （心镜） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use xinjing::{
  input::{DataLayout, DataLoader, GStreamerDecoder},
  task::{InspectTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("数据目录: {}", args.data.display());
  let mut layout = DataLayout::new(&args.data);
  if let Some(metadata) = &args.metadata {
    layout = layout.with_metadata_dir(metadata);
  }
  info!("元数据目录: {}", layout.metadata_dir().display());

  let loader = DataLoader::new(layout);
  let recordings = match &args.patient {
    Some(patient) => vec![patient.clone()],
    None => loader.layout().recordings(None)?,
  };

  let mut reports = Vec::with_capacity(recordings.len());
  for recording_id in &recordings {
    let report = InspectTask::new(GStreamerDecoder::default())
      .with_frames(args.frames)
      .with_output(args.output.clone())
      .run_task((&loader, recording_id.as_str()))?;
    if !args.json {
      println!("{}", report);
    }
    reports.push(report);
  }

  if args.json {
    println!("{}", serde_json::to_string_pretty(&reports)?);
  }

  info!("共检查 {} 个录像", reports.len());
  Ok(())
}
