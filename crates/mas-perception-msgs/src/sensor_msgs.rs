//! Definitions for the `sensor_msgs` package.

use serde::{Deserialize, Serialize};

use crate::serial::{Message, MsgError};
use crate::std_msgs::Header;

/// Channel count and bytes per channel of a known image encoding.
pub fn encoding_layout(encoding: &str) -> Option<(usize, usize)> {
    let layout = match encoding {
        "mono8" | "8UC1" => (1, 1),
        "mono16" | "16UC1" => (1, 2),
        "rgb8" | "bgr8" | "8UC3" => (3, 1),
        "rgba8" | "bgra8" | "8UC4" => (4, 1),
        "rgb16" | "bgr16" | "16UC3" => (3, 2),
        "32FC1" => (1, 4),
        "32FC3" => (3, 4),
        _ => return None,
    };
    Some(layout)
}

/// An uncompressed image. `(0, 0)` is the top-left corner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    #[serde(default)]
    pub is_bigendian: u8,
    /// Full row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Build an image message with a tightly packed row step.
    ///
    /// Unknown encodings get a one-byte-per-pixel step; `validate` only
    /// checks the buffer length for those.
    pub fn from_raw(encoding: &str, width: u32, height: u32, data: Vec<u8>) -> Self {
        let (channels, depth) = encoding_layout(encoding).unwrap_or((1, 1));
        Self {
            header: Header::default(),
            height,
            width,
            encoding: encoding.to_string(),
            is_bigendian: 0,
            step: width * (channels * depth) as u32,
            data,
        }
    }
}

impl Message for Image {
    fn validate(&self) -> Result<(), MsgError> {
        if let Some((channels, depth)) = encoding_layout(&self.encoding) {
            let min_step = self.width as usize * channels * depth;
            if (self.step as usize) < min_step {
                return Err(MsgError::Layout {
                    what: "image",
                    reason: format!(
                        "step {} is shorter than a {} row of width {}",
                        self.step, self.encoding, self.width
                    ),
                });
            }
        }
        let expected = self.step as usize * self.height as usize;
        if self.data.len() < expected {
            return Err(MsgError::Truncated {
                what: "image",
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Sub-window of an image, used by `CameraInfo`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x_offset: u32,
    pub y_offset: u32,
    pub height: u32,
    pub width: u32,
    pub do_rectify: bool,
}

/// Calibration of a pinhole camera.
///
/// `k` is the 3x3 intrinsic matrix and `p` the 3x4 projection matrix, both
/// row-major. A zero `p` means the camera is uncalibrated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    #[serde(rename = "D")]
    pub d: Vec<f64>,
    #[serde(rename = "K")]
    pub k: [f64; 9],
    #[serde(rename = "R")]
    pub r: [f64; 9],
    #[serde(rename = "P")]
    pub p: [f64; 12],
    pub binning_x: u32,
    pub binning_y: u32,
    pub roi: RegionOfInterest,
}

impl CameraInfo {
    /// Distortion-free calibration with the given intrinsics.
    pub fn pinhole(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            distortion_model: "plumb_bob".to_string(),
            d: vec![0.0; 5],
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
            ..Self::default()
        }
    }
}

impl Message for CameraInfo {}

/// Description of one channel of a `PointCloud2` point.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: u8,
    pub count: u32,
}

impl PointField {
    pub const INT8: u8 = 1;
    pub const UINT8: u8 = 2;
    pub const INT16: u8 = 3;
    pub const UINT16: u8 = 4;
    pub const INT32: u8 = 5;
    pub const UINT32: u8 = 6;
    pub const FLOAT32: u8 = 7;
    pub const FLOAT64: u8 = 8;

    pub fn new(name: &str, offset: u32, datatype: u8, count: u32) -> Self {
        Self {
            name: name.to_string(),
            offset,
            datatype,
            count,
        }
    }

    /// Size in bytes of one element, `None` for unknown datatypes.
    pub fn datatype_size(datatype: u8) -> Option<usize> {
        match datatype {
            Self::INT8 | Self::UINT8 => Some(1),
            Self::INT16 | Self::UINT16 => Some(2),
            Self::INT32 | Self::UINT32 | Self::FLOAT32 => Some(4),
            Self::FLOAT64 => Some(8),
            _ => None,
        }
    }
}

/// A collection of N-dimensional points.
///
/// Organized clouds have `height > 1` and map one point to one image pixel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud2 {
    #[serde(default)]
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    #[serde(default)]
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: Vec<u8>,
    #[serde(default)]
    pub is_dense: bool,
}

impl PointCloud2 {
    pub fn field(&self, name: &str) -> Option<&PointField> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[inline]
    pub fn is_organized(&self) -> bool {
        self.height > 1
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Little-endian cloud with `x`, `y`, `z` float32 fields.
    pub fn xyz32(header: Header, width: u32, height: u32, points: &[[f32; 3]]) -> Self {
        let fields = vec![
            PointField::new("x", 0, PointField::FLOAT32, 1),
            PointField::new("y", 4, PointField::FLOAT32, 1),
            PointField::new("z", 8, PointField::FLOAT32, 1),
        ];
        let mut data = Vec::with_capacity(points.len() * 12);
        for p in points {
            for v in p {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        Self::packed(header, width, height, fields, 12, data)
    }

    /// Little-endian `x`, `y`, `z`, `rgb` cloud, with PCL's packed float rgb.
    pub fn xyzrgb32(
        header: Header,
        width: u32,
        height: u32,
        points: &[[f32; 3]],
        colors: &[[u8; 3]],
    ) -> Self {
        let fields = vec![
            PointField::new("x", 0, PointField::FLOAT32, 1),
            PointField::new("y", 4, PointField::FLOAT32, 1),
            PointField::new("z", 8, PointField::FLOAT32, 1),
            PointField::new("rgb", 12, PointField::FLOAT32, 1),
        ];
        let mut data = Vec::with_capacity(points.len() * 16);
        for (p, c) in points.iter().zip(colors) {
            for v in p {
                data.extend_from_slice(&v.to_le_bytes());
            }
            let packed = ((c[0] as u32) << 16) | ((c[1] as u32) << 8) | c[2] as u32;
            data.extend_from_slice(&packed.to_le_bytes());
        }
        Self::packed(header, width, height, fields, 16, data)
    }

    fn packed(
        header: Header,
        width: u32,
        height: u32,
        fields: Vec<PointField>,
        point_step: u32,
        data: Vec<u8>,
    ) -> Self {
        Self {
            header,
            height,
            width,
            fields,
            is_bigendian: false,
            point_step,
            row_step: point_step * width,
            data,
            is_dense: true,
        }
    }
}

impl Message for PointCloud2 {
    fn validate(&self) -> Result<(), MsgError> {
        let point_step = self.point_step as usize;
        for field in &self.fields {
            let Some(size) = PointField::datatype_size(field.datatype) else {
                return Err(MsgError::Layout {
                    what: "point cloud",
                    reason: format!(
                        "field '{}' has unknown datatype {}",
                        field.name, field.datatype
                    ),
                });
            };
            let end = field.offset as usize + size * field.count.max(1) as usize;
            if end > point_step {
                return Err(MsgError::Layout {
                    what: "point cloud",
                    reason: format!(
                        "field '{}' ends at byte {end}, past point_step {point_step}",
                        field.name
                    ),
                });
            }
        }
        if point_step * self.width as usize > self.row_step as usize {
            return Err(MsgError::Layout {
                what: "point cloud",
                reason: format!(
                    "row_step {} cannot hold {} points of {point_step} bytes",
                    self.row_step, self.width
                ),
            });
        }
        let expected = self.row_step as usize * self.height as usize;
        if self.data.len() < expected {
            return Err(MsgError::Truncated {
                what: "point cloud",
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_packs_the_row_step() {
        let img = Image::from_raw("bgr8", 4, 2, vec![0; 24]);
        assert_eq!(img.step, 12);
        assert!(img.validate().is_ok());
    }

    #[test]
    fn short_step_is_a_layout_error() {
        let mut img = Image::from_raw("rgb8", 4, 1, vec![0; 12]);
        img.step = 8;
        assert!(matches!(img.validate(), Err(MsgError::Layout { .. })));
    }

    #[test]
    fn camera_info_uses_ros_field_names() {
        let cam = CameraInfo::pinhole(640, 480, 500.0, 500.0, 320.0, 240.0);
        let json = serde_json::to_value(&cam).unwrap();
        assert_eq!(json["K"][0], 500.0);
        assert_eq!(json["P"][6], 240.0);
        assert!(json.get("k").is_none());
    }

    #[test]
    fn xyzrgb_layout_is_consistent() {
        let cloud = PointCloud2::xyzrgb32(
            Header::default(),
            2,
            1,
            &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            &[[255, 0, 0], [0, 0, 255]],
        );
        assert_eq!(cloud.row_step, 32);
        assert_eq!(cloud.data.len(), 32);
        assert!(cloud.validate().is_ok());
        assert_eq!(cloud.field("rgb").map(|f| f.offset), Some(12));
        assert_eq!(&cloud.data[12..16], &0x00ff0000u32.to_le_bytes());
    }

    #[test]
    fn unknown_field_datatype_is_rejected() {
        let mut cloud = PointCloud2::xyz32(Header::default(), 1, 1, &[[0.0; 3]]);
        cloud.fields[0].datatype = 42;
        assert!(matches!(cloud.validate(), Err(MsgError::Layout { .. })));
    }
}
