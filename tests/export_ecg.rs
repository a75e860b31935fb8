// 该文件是 Xinjing （心镜） 项目的一部分。
// tests/export_ecg.rs - 心电图批量导出
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

#![cfg(feature = "save_image_file")]

mod common;

use common::Fixture;
use image::{Rgb, RgbImage};
use xinjing::{
  output::{EcgFormat, EcgPlot},
  task::{EcgExportTask, ExportStatus, Task},
};

#[test]
fn exports_each_recording_and_reports_missing_ones() {
  let fixture = Fixture::new();
  let p001 = fixture.recording("p001");
  let ecg = RgbImage::from_fn(8, 6, |_, y| Rgb([(y * 40) as u8, 0, 0]));
  ecg.save(p001.join("ecg_visualization_1.png")).unwrap();
  fixture.recording("p002");
  fixture.recording("q003");

  let loader = fixture.loader();
  let summary = EcgExportTask::default()
    .with_format(EcgFormat::Jpg)
    .with_prefix(Some("p".to_string()))
    .with_plot(EcgPlot::default().with_size(320, 200))
    .run_task(&loader)
    .unwrap();

  assert_eq!(summary.results.len(), 2);
  assert_eq!(summary.success_count(), 1);
  assert_eq!(
    summary.results[0],
    ("p001".to_string(), ExportStatus::Success(p001.join("ecg.jpg")))
  );
  assert_eq!(summary.results[1], ("p002".to_string(), ExportStatus::NotFound));
  assert_eq!(summary.failures().count(), 1);

  let exported = image::open(p001.join("ecg.jpg")).unwrap();
  assert_eq!((exported.width(), exported.height()), (320, 200));

  // 导出的 ecg.jpg 不是 png，也不会被当成造影图像
  assert!(loader.load_angio("p001").is_not_found());
}
