//! Per-detection crops and image-plane vertices for a batch of detections.

use image::RgbImage;
use mas_perception_msgs::{
    decode, encode, BoundingBoxList, CameraInfo, Header, Image, ImageList,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bbox2d::{BoundingBox2D, PixelRect};
use crate::bbox3d::BoundingBox3D;
use crate::camera::PinholeCamera;
use crate::crop::{copy_region, fitted_crop_rect};
use crate::image_msg::{image_from_msg, image_to_msg, ImageEncoding};
use crate::PerceptionError;

/// Tunables of [`get_crops_and_bounding_boxes`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Margin in pixels added on every side of a box before cropping.
    pub crop_offset: i32,
    /// Encoding of the crops in the output image list.
    pub output_encoding: ImageEncoding,
}

/// One object to crop: an image-plane box or an oriented 3D box.
#[derive(Clone, Debug, PartialEq)]
pub enum Detection {
    Box2D(BoundingBox2D),
    Box3D(BoundingBox3D),
}

impl From<BoundingBox2D> for Detection {
    fn from(value: BoundingBox2D) -> Self {
        Detection::Box2D(value)
    }
}

impl From<BoundingBox3D> for Detection {
    fn from(value: BoundingBox3D) -> Self {
        Detection::Box3D(value)
    }
}

/// Crops and their corner polygons, one entry per detection, in input order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropsAndVertices {
    pub crops: ImageList,
    /// Corners of each detection's footprint in the source image, before the
    /// crop margin and fitting: top-left, top-right, bottom-right, bottom-left.
    pub vertices: Vec<[Point2<f32>; 4]>,
}

impl CropsAndVertices {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices as plain `[x, y]` pairs.
    pub fn vertex_arrays(&self) -> Vec<[[f32; 2]; 4]> {
        self.vertices
            .iter()
            .map(|poly| poly.map(|p| [p.x, p.y]))
            .collect()
    }
}

fn at_detection(index: usize, err: PerceptionError) -> PerceptionError {
    match err {
        PerceptionError::InvalidArgument(msg) => {
            PerceptionError::InvalidArgument(format!("detection {index}: {msg}"))
        }
        PerceptionError::OutOfRange(msg) => {
            PerceptionError::OutOfRange(format!("detection {index}: {msg}"))
        }
        other => other,
    }
}

fn projected_rect(bbox: &BoundingBox3D, camera: &PinholeCamera) -> Result<PixelRect, PerceptionError> {
    let pixels = bbox
        .vertices()
        .iter()
        .map(|v| camera.project(v))
        .collect::<Result<Vec<_>, _>>()?;
    PixelRect::bounding(&pixels)
        .ok_or_else(|| PerceptionError::out_of_range("box vertices do not project to the image"))
}

/// Crop every detection out of `image`.
///
/// 2D detections are cropped as given. 3D detections are projected through
/// the calibration in `camera` and cropped by the bounding rectangle of their
/// projected vertices. Each crop is the box grown by `params.crop_offset` and
/// fitted to the image; the returned vertices are the unexpanded footprint
/// and may lie outside the image. The camera model is only built when a 3D detection
/// is present.
///
/// Fails on the first detection that cannot be cropped; the error message
/// names its index.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(image, header, camera, detections),
        fields(width = image.width(), height = image.height(), detections = detections.len())
    )
)]
pub fn get_crops_and_bounding_boxes(
    image: &RgbImage,
    header: &Header,
    camera: &CameraInfo,
    detections: &[Detection],
    params: &PipelineParams,
) -> Result<CropsAndVertices, PerceptionError> {
    let mut model: Option<PinholeCamera> = None;
    let mut out = CropsAndVertices {
        crops: ImageList {
            images: Vec::with_capacity(detections.len()),
        },
        vertices: Vec::with_capacity(detections.len()),
    };

    for (index, detection) in detections.iter().enumerate() {
        let footprint = match detection {
            Detection::Box2D(bbox) => Ok(bbox.rect()),
            Detection::Box3D(bbox) => {
                let cam = match model {
                    Some(cam) => cam,
                    None => {
                        let cam = PinholeCamera::from_camera_info(camera)?;
                        model = Some(cam);
                        cam
                    }
                };
                projected_rect(bbox, &cam)
            }
        }
        .map_err(|e| at_detection(index, e))?;
        let rect = fitted_crop_rect(image.dimensions(), footprint, params.crop_offset)
            .map_err(|e| at_detection(index, e))?;

        log::debug!("detection {index}: footprint {footprint:?}, cropping {rect:?}");
        let crop = copy_region(image, rect);
        out.crops
            .images
            .push(image_to_msg(&crop, params.output_encoding, header));
        out.vertices.push(footprint.corners());
    }

    Ok(out)
}

/// [`get_crops_and_bounding_boxes`] over JSON-serialized messages.
///
/// Takes an `Image`, a `CameraInfo` and a `BoundingBoxList` (every entry a 3D
/// detection) and returns the serialized `ImageList` and the vertex lists.
pub fn get_crops_and_bounding_boxes_serialized(
    image_json: &str,
    camera_json: &str,
    boxes_json: &str,
    params: &PipelineParams,
) -> Result<(String, Vec<[[f32; 2]; 4]>), PerceptionError> {
    let image_msg: Image = decode(image_json)?;
    let camera: CameraInfo = decode(camera_json)?;
    let boxes: BoundingBoxList = decode(boxes_json)?;

    let image = image_from_msg(&image_msg)?;
    let detections = boxes
        .bounding_boxes
        .iter()
        .enumerate()
        .map(|(index, msg)| {
            BoundingBox3D::from_msg(msg, image_msg.header.clone())
                .map(Detection::from)
                .map_err(|e| at_detection(index, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let result =
        get_crops_and_bounding_boxes(&image, &image_msg.header, &camera, &detections, params)?;
    Ok((encode(&result.crops)?, result.vertex_arrays()))
}
