//! Geometry, image and point-cloud routines for object perception.
//!
//! Detections arrive as image-plane boxes ([`BoundingBox2D`]) or oriented 3D
//! boxes ([`BoundingBox3D`]). This crate fits them to images, crops the
//! covered regions, projects 3D boxes through the camera calibration and
//! works on organized point clouds that share the image grid. Messages
//! come from `mas-perception-msgs`.
//!
//! ```
//! use image::RgbImage;
//! use mas_perception_core::{crop_image, BoundingBox2D, PixelRect};
//!
//! let img = RgbImage::new(64, 48);
//! let bbox = BoundingBox2D::new("cup", [255, 0, 0], PixelRect::new(-8, 40, 20, 20)).unwrap();
//! let crop = crop_image(&img, &bbox, 0).unwrap();
//! assert_eq!(crop.dimensions(), (12, 8));
//! ```

mod bbox2d;
mod bbox3d;
mod camera;
mod cloud;
mod crop;
mod draw;
mod error;
mod image_msg;
mod logger;
mod pipeline;

pub use bbox2d::{fit_box_to_image, fit_rect_to_bounds, BoundingBox2D, PixelRect};
pub use bbox3d::BoundingBox3D;
pub use camera::PinholeCamera;
pub use cloud::{
    cloud_msg_to_image, cloud_msg_to_image_msg, crop_cloud_msg_to_xyz, crop_organized_cloud_msg,
    transform_point_cloud, transform_point_cloud_mat4, XyzGrid,
};
pub use crop::crop_image;
pub use draw::{draw_labeled_boxes, draw_labeled_boxes_mut, DrawStyle, PaintPixel};
pub use error::PerceptionError;
pub use image_msg::{image_from_msg, image_to_msg, ImageEncoding};
pub use pipeline::{
    get_crops_and_bounding_boxes, get_crops_and_bounding_boxes_serialized, CropsAndVertices,
    Detection, PipelineParams,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV_VAR};
