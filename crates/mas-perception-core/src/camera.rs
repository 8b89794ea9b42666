use mas_perception_msgs::CameraInfo;
use nalgebra::{Matrix3x4, Point2, Point3, Vector4};

use crate::PerceptionError;

/// Points closer to the image plane than this are not projected.
const MIN_DEPTH: f64 = 1e-9;

/// Pinhole projection built from a `CameraInfo` message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinholeCamera {
    projection: Matrix3x4<f64>,
}

impl PinholeCamera {
    pub fn new(projection: Matrix3x4<f64>) -> Self {
        Self { projection }
    }

    /// Use the projection matrix `P`; fall back to `[K | 0]` when `P` is all
    /// zero. Fails when both are zero or not finite.
    pub fn from_camera_info(info: &CameraInfo) -> Result<Self, PerceptionError> {
        let usable = |m: &[f64]| m.iter().all(|v| v.is_finite()) && m.iter().any(|&v| v != 0.0);

        if usable(&info.p[..]) {
            return Ok(Self::new(Matrix3x4::from_row_slice(&info.p)));
        }
        if usable(&info.k[..]) {
            let k = &info.k;
            return Ok(Self::new(Matrix3x4::new(
                k[0], k[1], k[2], 0.0, //
                k[3], k[4], k[5], 0.0, //
                k[6], k[7], k[8], 0.0,
            )));
        }
        Err(PerceptionError::invalid(
            "camera info carries neither a projection nor an intrinsic matrix",
        ))
    }

    #[inline]
    pub fn projection(&self) -> &Matrix3x4<f64> {
        &self.projection
    }

    /// Project a point given in the camera optical frame to pixel
    /// coordinates.
    ///
    /// Fails with [`PerceptionError::OutOfRange`] for points on or behind
    /// the image plane.
    pub fn project(&self, p: &Point3<f64>) -> Result<Point2<f32>, PerceptionError> {
        let v = self.projection * Vector4::new(p.x, p.y, p.z, 1.0);
        if v.z.is_nan() || v.z <= MIN_DEPTH {
            return Err(PerceptionError::out_of_range(format!(
                "point ({:.3}, {:.3}, {:.3}) is not in front of the camera",
                p.x, p.y, p.z
            )));
        }
        Ok(Point2::new((v.x / v.z) as f32, (v.y / v.z) as f32))
    }
}
