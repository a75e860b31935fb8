// 该文件是 Xinjing （心镜） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;

/// Xinjing 录像检查工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据根目录，每个录像一个子目录
  #[arg(long, value_name = "DIR")]
  pub data: PathBuf,

  /// 表格元数据目录（默认 <DATA>/../Echocardiography）
  #[arg(long, value_name = "DIR")]
  pub metadata: Option<PathBuf>,

  /// 只检查指定录像，缺省时检查全部录像
  #[arg(long, value_name = "ID")]
  pub patient: Option<String>,

  /// 每个视频抽取并写出的帧数
  #[arg(long, default_value = "5", value_name = "COUNT")]
  pub frames: usize,

  /// 规范化图像的输出目录，缺省时不写文件
  #[arg(long, value_name = "DIR")]
  pub output: Option<PathBuf>,

  /// 以 JSON 输出检查结果
  #[arg(long)]
  pub json: bool,
}
