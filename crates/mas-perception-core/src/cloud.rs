//! Utilities on `sensor_msgs/PointCloud2` messages.
//!
//! Organized clouds are treated as a `width x height` grid that lines up with
//! the camera image, so they can be cropped with the same boxes as images.

use image::{Rgb, RgbImage};
use mas_perception_msgs::{Image, Message, PointCloud2, PointField};
use nalgebra::{DMatrix, Matrix3, Matrix4, Point3, Vector3, Vector4};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bbox2d::{BoundingBox2D, PixelRect};
use crate::crop::fitted_crop_rect;
use crate::image_msg::{image_to_msg, ImageEncoding};
use crate::PerceptionError;

/// Reads and writes one scalar channel of a point record.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldAccessor {
    offset: usize,
    datatype: u8,
    big_endian: bool,
}

#[inline]
fn array_at<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

impl FieldAccessor {
    /// Accessor for a FLOAT32 or FLOAT64 field.
    pub(crate) fn float(cloud: &PointCloud2, name: &str) -> Result<Self, PerceptionError> {
        let field = cloud.field(name).ok_or_else(|| {
            PerceptionError::invalid(format!("point cloud has no '{name}' field"))
        })?;
        match field.datatype {
            PointField::FLOAT32 | PointField::FLOAT64 => Ok(Self::from_field(cloud, field)),
            other => Err(PerceptionError::invalid(format!(
                "field '{name}' has datatype {other}, expected FLOAT32 or FLOAT64"
            ))),
        }
    }

    /// Accessor for the packed `rgb`/`rgba` field (PCL stores it as a float
    /// whose bits are `0xAARRGGBB`).
    fn packed_color(cloud: &PointCloud2) -> Result<Self, PerceptionError> {
        let field = cloud
            .field("rgb")
            .or_else(|| cloud.field("rgba"))
            .ok_or_else(|| PerceptionError::invalid("point cloud has no 'rgb' or 'rgba' field"))?;
        match field.datatype {
            PointField::FLOAT32 | PointField::UINT32 | PointField::INT32 => {
                Ok(Self::from_field(cloud, field))
            }
            other => Err(PerceptionError::invalid(format!(
                "color field '{}' has datatype {other}, expected a packed 32-bit value",
                field.name
            ))),
        }
    }

    fn from_field(cloud: &PointCloud2, field: &PointField) -> Self {
        Self {
            offset: field.offset as usize,
            datatype: field.datatype,
            big_endian: cloud.is_bigendian,
        }
    }

    fn read_bits(&self, point: &[u8]) -> u32 {
        let raw = array_at::<4>(point, self.offset);
        if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        }
    }

    pub(crate) fn read(&self, point: &[u8]) -> f64 {
        if self.datatype == PointField::FLOAT64 {
            let raw = array_at::<8>(point, self.offset);
            if self.big_endian {
                f64::from_be_bytes(raw)
            } else {
                f64::from_le_bytes(raw)
            }
        } else {
            f64::from(f32::from_bits(self.read_bits(point)))
        }
    }

    fn write(&self, point: &mut [u8], value: f64) {
        let at = self.offset;
        if self.datatype == PointField::FLOAT64 {
            let raw = if self.big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            point[at..at + 8].copy_from_slice(&raw);
        } else {
            let value = value as f32;
            let raw = if self.big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            point[at..at + 4].copy_from_slice(&raw);
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Vec3Accessor([FieldAccessor; 3]);

impl Vec3Accessor {
    fn new(cloud: &PointCloud2, names: [&str; 3]) -> Result<Self, PerceptionError> {
        Ok(Self([
            FieldAccessor::float(cloud, names[0])?,
            FieldAccessor::float(cloud, names[1])?,
            FieldAccessor::float(cloud, names[2])?,
        ]))
    }

    fn xyz(cloud: &PointCloud2) -> Result<Self, PerceptionError> {
        Self::new(cloud, ["x", "y", "z"])
    }

    fn read(&self, point: &[u8]) -> Vector3<f64> {
        Vector3::new(
            self.0[0].read(point),
            self.0[1].read(point),
            self.0[2].read(point),
        )
    }

    fn write(&self, point: &mut [u8], v: &Vector3<f64>) {
        for (field, value) in self.0.iter().zip(v.iter()) {
            field.write(point, *value);
        }
    }
}

#[inline]
fn point_offset(cloud: &PointCloud2, col: usize, row: usize) -> usize {
    row * cloud.row_step as usize + col * cloud.point_step as usize
}

#[inline]
fn point_bytes(cloud: &PointCloud2, col: usize, row: usize) -> &[u8] {
    let at = point_offset(cloud, col, row);
    &cloud.data[at..at + cloud.point_step as usize]
}

fn require_organized(cloud: &PointCloud2) -> Result<(), PerceptionError> {
    if !cloud.is_organized() {
        return Err(PerceptionError::invalid(format!(
            "input point cloud is not organized (height = {})",
            cloud.height
        )));
    }
    Ok(())
}

/// All x/y/z coordinates in row-major order, non-finite points included.
pub(crate) fn xyz_points(cloud: &PointCloud2) -> Result<Vec<Point3<f64>>, PerceptionError> {
    cloud.validate()?;
    let xyz = Vec3Accessor::xyz(cloud)?;
    let mut out = Vec::with_capacity(cloud.num_points());
    for row in 0..cloud.height as usize {
        for col in 0..cloud.width as usize {
            out.push(Point3::from(xyz.read(point_bytes(cloud, col, row))));
        }
    }
    Ok(out)
}

/// Dense `width x height` grid of x/y/z coordinates, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct XyzGrid {
    pub width: usize,
    pub height: usize,
    pub points: Vec<[f32; 3]>,
}

impl XyzGrid {
    pub fn get(&self, col: usize, row: usize) -> Option<[f32; 3]> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.points.get(row * self.width + col).copied()
    }

    /// Flatten to `height * width * 3` values, the layout of an `(H, W, 3)`
    /// array.
    pub fn to_flat_vec(&self) -> Vec<f32> {
        self.points.iter().flatten().copied().collect()
    }
}

/// Extract the color channel of an organized cloud as an RGB image.
///
/// Fails with [`PerceptionError::InvalidArgument`] for unorganized clouds
/// (`height <= 1`) and clouds without a packed `rgb`/`rgba` field.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(cloud), fields(width = cloud.width, height = cloud.height))
)]
pub fn cloud_msg_to_image(cloud: &PointCloud2) -> Result<RgbImage, PerceptionError> {
    cloud.validate()?;
    require_organized(cloud)?;
    let color = FieldAccessor::packed_color(cloud)?;

    Ok(RgbImage::from_fn(cloud.width, cloud.height, |x, y| {
        let bits = color.read_bits(point_bytes(cloud, x as usize, y as usize));
        Rgb([(bits >> 16) as u8, (bits >> 8) as u8, bits as u8])
    }))
}

/// Same as [`cloud_msg_to_image`], packaged as a `bgr8` image message with
/// the cloud's header.
pub fn cloud_msg_to_image_msg(cloud: &PointCloud2) -> Result<Image, PerceptionError> {
    let img = cloud_msg_to_image(cloud)?;
    Ok(image_to_msg(&img, ImageEncoding::Bgr8, &cloud.header))
}

fn crop_cloud_rect(cloud: &PointCloud2, rect: PixelRect) -> PointCloud2 {
    let point_step = cloud.point_step as usize;
    let row_len = rect.width as usize * point_step;
    let mut data = Vec::with_capacity(row_len * rect.height as usize);
    for row in rect.y as usize..rect.bottom() as usize {
        let at = point_offset(cloud, rect.x as usize, row);
        data.extend_from_slice(&cloud.data[at..at + row_len]);
    }

    PointCloud2 {
        header: cloud.header.clone(),
        height: rect.height as u32,
        width: rect.width as u32,
        fields: cloud.fields.clone(),
        is_bigendian: cloud.is_bigendian,
        point_step: cloud.point_step,
        row_step: row_len as u32,
        data,
        is_dense: cloud.is_dense,
    }
}

/// Crop the grid of an organized cloud to the region of `bbox`.
///
/// The box is fitted to the cloud grid the same way an image crop is. Point
/// layout, endianness and header are kept; only the extent shrinks.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(cloud, bbox), fields(width = cloud.width, height = cloud.height))
)]
pub fn crop_organized_cloud_msg(
    cloud: &PointCloud2,
    bbox: &BoundingBox2D,
) -> Result<PointCloud2, PerceptionError> {
    cloud.validate()?;
    require_organized(cloud)?;
    let rect = fitted_crop_rect((cloud.width, cloud.height), bbox.rect(), 0)?;
    log::debug!("cropping {}x{} cloud to {rect:?}", cloud.width, cloud.height);
    Ok(crop_cloud_rect(cloud, rect))
}

/// Crop an organized cloud and keep only its x/y/z coordinates.
pub fn crop_cloud_msg_to_xyz(
    cloud: &PointCloud2,
    bbox: &BoundingBox2D,
) -> Result<XyzGrid, PerceptionError> {
    let cropped = crop_organized_cloud_msg(cloud, bbox)?;
    let points = xyz_points(&cropped)?
        .into_iter()
        .map(|p| [p.x as f32, p.y as f32, p.z as f32])
        .collect();
    Ok(XyzGrid {
        width: cropped.width as usize,
        height: cropped.height as usize,
        points,
    })
}

/// Apply a 4x4 homogeneous transform to every point of `cloud`.
///
/// Fails with [`PerceptionError::DimensionMismatch`] unless `transform` is
/// exactly 4x4. See [`transform_point_cloud_mat4`].
pub fn transform_point_cloud(
    cloud: &PointCloud2,
    transform: &DMatrix<f64>,
) -> Result<PointCloud2, PerceptionError> {
    let (rows, cols) = transform.shape();
    if (rows, cols) != (4, 4) {
        return Err(PerceptionError::DimensionMismatch { rows, cols });
    }
    let m = Matrix4::from_iterator(transform.iter().copied());
    transform_point_cloud_mat4(cloud, &m)
}

/// Apply an affine transform to the x/y/z of every point.
///
/// Points with a non-finite coordinate are copied unchanged. When the cloud
/// carries `normal_x/y/z` fields those are rotated by the linear part. The
/// header (and its frame id) is not touched; updating it is the caller's job.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(cloud, transform), fields(points = cloud.num_points()))
)]
pub fn transform_point_cloud_mat4(
    cloud: &PointCloud2,
    transform: &Matrix4<f64>,
) -> Result<PointCloud2, PerceptionError> {
    if transform.iter().any(|v| !v.is_finite()) {
        return Err(PerceptionError::invalid(
            "transformation matrix contains non-finite values",
        ));
    }
    cloud.validate()?;
    let xyz = Vec3Accessor::xyz(cloud)?;
    let normals = Vec3Accessor::new(cloud, ["normal_x", "normal_y", "normal_z"]).ok();
    let linear: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();

    let mut out = cloud.clone();
    let point_step = cloud.point_step as usize;
    for row in 0..cloud.height as usize {
        for col in 0..cloud.width as usize {
            let at = point_offset(cloud, col, row);
            let point = &mut out.data[at..at + point_step];

            let p = xyz.read(point);
            if p.iter().all(|v| v.is_finite()) {
                let q = transform * Vector4::new(p.x, p.y, p.z, 1.0);
                xyz.write(point, &q.xyz());
            }
            if let Some(normals) = normals {
                let n = normals.read(point);
                if n.iter().all(|v| v.is_finite()) {
                    normals.write(point, &(linear * n));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mas_perception_msgs::Header;

    fn grid_cloud(width: u32, height: u32) -> PointCloud2 {
        let mut points = Vec::new();
        let mut colors = Vec::new();
        for row in 0..height {
            for col in 0..width {
                points.push([col as f32, row as f32, 1.0 + (col + row) as f32]);
                colors.push([col as u8 * 10, row as u8 * 10, 7]);
            }
        }
        PointCloud2::xyzrgb32(Header::with_frame("cam"), width, height, &points, &colors)
    }

    fn rect_box(x: i32, y: i32, w: i32, h: i32) -> BoundingBox2D {
        BoundingBox2D::new("roi", [0; 3], PixelRect::new(x, y, w, h)).unwrap()
    }

    #[test]
    fn unorganized_cloud_has_no_image() {
        let cloud = grid_cloud(4, 1);
        assert!(matches!(
            cloud_msg_to_image(&cloud),
            Err(PerceptionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn organized_cloud_to_image() {
        let img = cloud_msg_to_image(&grid_cloud(3, 2)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1), &Rgb([20, 10, 7]));
    }

    #[test]
    fn image_msg_is_bgr_with_cloud_header() {
        let msg = cloud_msg_to_image_msg(&grid_cloud(3, 2)).unwrap();
        assert_eq!(msg.encoding, "bgr8");
        assert_eq!(msg.header.frame_id, "cam");
        assert_eq!(&msg.data[15..18], &[7, 10, 20]);
    }

    #[test]
    fn cloud_without_color_is_rejected() {
        let cloud = PointCloud2::xyz32(Header::default(), 2, 2, &[[0.0; 3]; 4]);
        assert!(cloud_msg_to_image(&cloud).is_err());
    }

    #[test]
    fn crop_keeps_layout_and_selects_rows() {
        let cloud = grid_cloud(5, 4);
        let cropped = crop_organized_cloud_msg(&cloud, &rect_box(1, 2, 3, 5)).unwrap();
        assert_eq!((cropped.width, cropped.height), (3, 2));
        assert_eq!(cropped.row_step, 3 * 16);
        assert_eq!(cropped.fields, cloud.fields);
        assert!(cropped.validate().is_ok());

        let pts = xyz_points(&cropped).unwrap();
        assert_eq!(pts[0], Point3::new(1.0, 2.0, 4.0));
        assert_eq!(pts[5], Point3::new(3.0, 3.0, 7.0));
    }

    #[test]
    fn crop_to_xyz_matches_crop_shape() {
        let grid = crop_cloud_msg_to_xyz(&grid_cloud(5, 4), &rect_box(-2, 0, 4, 2)).unwrap();
        assert_eq!((grid.width, grid.height), (2, 2));
        assert_eq!(grid.get(1, 1), Some([1.0, 1.0, 3.0]));
        assert_eq!(grid.get(2, 0), None);
        assert_eq!(grid.to_flat_vec().len(), 12);
    }

    #[test]
    fn crop_outside_is_out_of_range() {
        let err = crop_organized_cloud_msg(&grid_cloud(5, 4), &rect_box(9, 9, 2, 2)).unwrap_err();
        assert!(matches!(err, PerceptionError::OutOfRange(_)));
    }

    #[test]
    fn wrong_matrix_shape_is_a_dimension_mismatch() {
        let m = DMatrix::<f64>::identity(3, 4);
        let err = transform_point_cloud(&grid_cloud(2, 2), &m).unwrap_err();
        assert!(matches!(
            err,
            PerceptionError::DimensionMismatch { rows: 3, cols: 4 }
        ));
    }

    #[test]
    fn identity_keeps_points_exactly() {
        let cloud = grid_cloud(3, 2);
        let out = transform_point_cloud(&cloud, &DMatrix::identity(4, 4)).unwrap();
        assert_eq!(out, cloud);
    }

    #[test]
    fn translation_and_rotation_are_applied() {
        let cloud = PointCloud2::xyz32(Header::default(), 2, 1, &[[1.0, 0.0, 0.0], [f32::NAN, 0.0, 0.0]]);
        // 90 degrees about z, then +1 along x
        let m = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, -1.0, 0.0, 1.0, //
                1.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        );
        let out = transform_point_cloud(&cloud, &m).unwrap();
        let pts = xyz_points(&out).unwrap();
        assert_relative_eq!(pts[0], Point3::new(1.0, 1.0, 0.0), epsilon = 1e-6);
        assert!(pts[1].x.is_nan());
    }

    #[test]
    fn normals_are_rotated_not_translated() {
        let mut cloud = PointCloud2::xyz32(Header::default(), 1, 1, &[[0.0, 0.0, 0.0]]);
        cloud.fields.extend([
            PointField::new("normal_x", 12, PointField::FLOAT32, 1),
            PointField::new("normal_y", 16, PointField::FLOAT32, 1),
            PointField::new("normal_z", 20, PointField::FLOAT32, 1),
        ]);
        cloud.point_step = 24;
        cloud.row_step = 24;
        cloud.data.extend(
            [1.0f32, 0.0, 0.0]
                .iter()
                .flat_map(|v| v.to_le_bytes()),
        );

        let mut m = Matrix4::identity();
        m[(0, 0)] = 0.0;
        m[(0, 1)] = -1.0;
        m[(1, 0)] = 1.0;
        m[(1, 1)] = 0.0;
        m[(2, 3)] = 5.0;
        let out = transform_point_cloud_mat4(&cloud, &m).unwrap();

        let normals = Vec3Accessor::new(&out, ["normal_x", "normal_y", "normal_z"]).unwrap();
        let n = normals.read(point_bytes(&out, 0, 0));
        assert_relative_eq!(n, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(xyz_points(&out).unwrap()[0], Point3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn reads_big_endian_float64_fields() {
        let mut data = Vec::new();
        for v in [1.5f64, -2.0, 3.25] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        let cloud = PointCloud2 {
            header: Header::default(),
            height: 1,
            width: 1,
            fields: vec![
                PointField::new("x", 0, PointField::FLOAT64, 1),
                PointField::new("y", 8, PointField::FLOAT64, 1),
                PointField::new("z", 16, PointField::FLOAT64, 1),
            ],
            is_bigendian: true,
            point_step: 24,
            row_step: 24,
            data,
            is_dense: true,
        };
        assert_eq!(xyz_points(&cloud).unwrap(), vec![Point3::new(1.5, -2.0, 3.25)]);

        let moved = transform_point_cloud_mat4(&cloud, &Matrix4::new_translation(&Vector3::new(1.0, 1.0, 1.0)))
            .unwrap();
        assert_eq!(xyz_points(&moved).unwrap(), vec![Point3::new(2.5, -1.0, 4.25)]);
    }

    #[test]
    fn integer_xyz_fields_are_rejected() {
        let mut cloud = PointCloud2::xyz32(Header::default(), 1, 1, &[[0.0; 3]]);
        cloud.fields[2].datatype = PointField::INT32;
        assert!(matches!(
            xyz_points(&cloud),
            Err(PerceptionError::InvalidArgument(_))
        ));
    }
}
