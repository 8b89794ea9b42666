//! Detection list messages produced by the scene segmentation nodes.

use serde::{Deserialize, Serialize};

use crate::geometry_msgs::{Point, Vector3};
use crate::sensor_msgs::Image;
use crate::serial::{Message, MsgError};

/// An oriented 3D box: center, edge lengths and its 8 corner vertices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center: Point,
    pub dimensions: Vector3,
    pub vertices: Vec<Point>,
}

impl Message for BoundingBox {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxList {
    pub bounding_boxes: Vec<BoundingBox>,
}

impl Message for BoundingBoxList {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageList {
    pub images: Vec<Image>,
}

impl Message for ImageList {
    fn validate(&self) -> Result<(), MsgError> {
        self.images.iter().try_for_each(|img| img.validate())
    }
}
