//! File-based jobs: JSON configs, image files and reports.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbImage;
use mas_perception_core::{
    draw_labeled_boxes, get_crops_and_bounding_boxes, image_from_msg, BoundingBox2D,
    BoundingBox3D, Detection, DrawStyle, PerceptionError, PipelineParams,
};
use mas_perception_msgs::{decode, BoundingBoxList, CameraInfo, Header, Message, MsgError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum PerceptionIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Msg(#[from] MsgError),
    #[error(transparent)]
    Perception(#[from] PerceptionError),
}

fn default_output_dir() -> String {
    "crops".to_string()
}

/// A batch crop job: one image, its calibration and a list of 3D boxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropJobConfig {
    pub image_path: String,
    /// `sensor_msgs/CameraInfo` as JSON.
    pub camera_info_path: String,
    /// `BoundingBoxList` as JSON.
    pub boxes_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Frame id stamped on the crops.
    #[serde(default)]
    pub frame_id: String,
    #[serde(default)]
    pub params: PipelineParams,
}

impl CropJobConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PerceptionIoError> {
        read_json(path)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PerceptionIoError> {
        write_json(path, self)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// Result of [`run_crop_job`], also written to `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropJobReport {
    pub crops: Vec<PathBuf>,
    /// Per crop: top-left, top-right, bottom-right, bottom-left.
    pub vertices: Vec<[[f32; 2]; 4]>,
}

impl CropJobReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PerceptionIoError> {
        read_json(path)
    }
}

fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, PerceptionIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), PerceptionIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a message of type `T` from a JSON file.
pub fn load_msg<T: Message>(path: impl AsRef<Path>) -> Result<T, PerceptionIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(decode(&raw)?)
}

/// Open any image file `image` can decode, as RGB.
pub fn load_rgb_image(path: impl AsRef<Path>) -> Result<RgbImage, PerceptionIoError> {
    Ok(image::open(path)?.to_rgb8())
}

/// Read a JSON array of 2D boxes (`label`, `color`, `x`, `y`, `width`,
/// `height`).
pub fn load_boxes_2d(path: impl AsRef<Path>) -> Result<Vec<BoundingBox2D>, PerceptionIoError> {
    read_json(path)
}

pub fn write_boxes_2d(
    path: impl AsRef<Path>,
    boxes: &[BoundingBox2D],
) -> Result<(), PerceptionIoError> {
    write_json(path, &boxes)
}

/// Crop every box of the job and write `crop_NNN.png` files plus
/// `report.json` into the output directory.
pub fn run_crop_job(cfg: &CropJobConfig) -> Result<CropJobReport, PerceptionIoError> {
    let image = load_rgb_image(&cfg.image_path)?;
    let camera: CameraInfo = load_msg(&cfg.camera_info_path)?;
    let boxes: BoundingBoxList = load_msg(&cfg.boxes_path)?;
    let header = Header::with_frame(cfg.frame_id.clone());
    log::info!(
        "cropping {} boxes from {} ({}x{})",
        boxes.bounding_boxes.len(),
        cfg.image_path,
        image.width(),
        image.height()
    );

    let detections = boxes
        .bounding_boxes
        .iter()
        .map(|msg| BoundingBox3D::from_msg(msg, header.clone()).map(Detection::from))
        .collect::<Result<Vec<_>, _>>()?;
    let result = get_crops_and_bounding_boxes(&image, &header, &camera, &detections, &cfg.params)?;

    let out_dir = cfg.output_dir();
    fs::create_dir_all(&out_dir)?;
    let mut crops = Vec::with_capacity(result.len());
    for (i, msg) in result.crops.images.iter().enumerate() {
        let path = out_dir.join(format!("crop_{i:03}.png"));
        image_from_msg(msg)?.save(&path)?;
        crops.push(path);
    }

    let report = CropJobReport {
        crops,
        vertices: result.vertex_arrays(),
    };
    write_json(out_dir.join("report.json"), &report)?;
    log::info!("wrote {} crops to {}", report.crops.len(), out_dir.display());
    Ok(report)
}

/// Draw the boxes listed in `boxes_path` onto the image and save it to
/// `out_path` (format from the extension).
pub fn run_draw(
    image_path: impl AsRef<Path>,
    boxes_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    style: &DrawStyle,
) -> Result<(), PerceptionIoError> {
    let image = load_rgb_image(image_path)?;
    let boxes = load_boxes_2d(boxes_path)?;
    log::debug!("drawing {} boxes", boxes.len());
    let drawn = draw_labeled_boxes(&image, &boxes, style)?;
    drawn.save(out_path)?;
    Ok(())
}
