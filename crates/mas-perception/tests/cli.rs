#![cfg(feature = "cli")]

use std::fs;

use assert_cmd::Command;
use image::RgbImage;
use mas_perception::core::{BoundingBox2D, PixelRect};
use mas_perception::io::{write_boxes_2d, CropJobReport};
use mas_perception::msgs::{encode, BoundingBoxList, CameraInfo};
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("mas-perception").unwrap()
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("crop").and(predicate::str::contains("draw")));
}

#[test]
fn crop_requires_inputs_without_config() {
    cli().args(["crop", "--out-dir", "x"]).assert().failure();
}

#[test]
fn crop_with_empty_box_list_writes_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("scene.png");
    RgbImage::new(16, 16).save(&image).unwrap();
    let camera = dir.path().join("camera.json");
    fs::write(&camera, encode(&CameraInfo::default()).unwrap()).unwrap();
    let boxes = dir.path().join("boxes.json");
    fs::write(&boxes, encode(&BoundingBoxList::default()).unwrap()).unwrap();
    let out = dir.path().join("crops");
    let saved = dir.path().join("job.json");

    cli()
        .arg("crop")
        .arg("--image")
        .arg(&image)
        .arg("--camera-info")
        .arg(&camera)
        .arg("--boxes")
        .arg(&boxes)
        .arg("--out-dir")
        .arg(&out)
        .args(["--offset", "3", "--encoding", "rgb8"])
        .arg("--save-config")
        .arg(&saved)
        .assert()
        .success();

    let report = CropJobReport::load_json(out.join("report.json")).unwrap();
    assert!(report.crops.is_empty());
    assert!(report.vertices.is_empty());

    let job = fs::read_to_string(&saved).unwrap();
    assert!(job.contains("\"crop_offset\": 3"));
    assert!(job.contains("\"rgb8\""));
}

#[test]
fn draw_rejects_zero_thickness() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("blank.png");
    RgbImage::new(8, 8).save(&image).unwrap();
    let boxes = dir.path().join("boxes.json");
    write_boxes_2d(
        &boxes,
        &[BoundingBox2D::new("a", [1, 2, 3], PixelRect::new(1, 1, 3, 3)).unwrap()],
    )
    .unwrap();

    cli()
        .arg("draw")
        .arg("--image")
        .arg(&image)
        .arg("--boxes")
        .arg(&boxes)
        .arg("--out")
        .arg(dir.path().join("out.png"))
        .args(["--thickness", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("thickness"));
}
