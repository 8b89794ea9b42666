//! Oriented 3D boxes around detected objects.

use mas_perception_msgs::{
    BoundingBox, Header, Point, PointCloud2, Pose, PoseStamped, Quaternion,
    Vector3 as Vector3Msg,
};
use nalgebra::{Matrix2, Matrix3, Point3, Rotation3, SymmetricEigen, UnitQuaternion, Vector3};

use crate::cloud::xyz_points;
use crate::PerceptionError;

const EPS: f64 = 1e-12;

/// Box corner signs along the three box axes. Bottom face first, then the
/// top face, each counter-clockwise about the third axis.
const CORNER_SIGNS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Oriented box with the header of the data it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox3D {
    header: Header,
    center: Point3<f64>,
    dimensions: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
    vertices: Vec<Point3<f64>>,
}

fn to_point3(p: &Point) -> Point3<f64> {
    Point3::new(p.x, p.y, p.z)
}

fn to_point_msg(p: &Point3<f64>) -> Point {
    Point::new(p.x, p.y, p.z)
}

impl BoundingBox3D {
    /// Box from its center, edge lengths along the rotated axes and
    /// orientation. Vertices are derived.
    pub fn from_parts(
        header: Header,
        center: Point3<f64>,
        dimensions: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        let axes = rotation.to_rotation_matrix().into_inner();
        let half = dimensions * 0.5;
        let vertices = CORNER_SIGNS
            .iter()
            .map(|s| {
                let local = Vector3::new(s[0] * half.x, s[1] * half.y, s[2] * half.z);
                center + axes * local
            })
            .collect();
        Self {
            header,
            center,
            dimensions,
            rotation,
            vertices,
        }
    }

    /// Fit a box around the finite points of `cloud`, with its third axis
    /// along the plane `normal` (typically the supporting surface normal).
    ///
    /// The first axis is the principal direction of the points projected onto
    /// the plane orthogonal to the normal; the second completes a
    /// right-handed frame.
    pub fn from_cloud(cloud: &PointCloud2, normal: &[f64]) -> Result<Self, PerceptionError> {
        let n = match normal {
            [x, y, z] => Vector3::new(*x, *y, *z),
            _ => {
                return Err(PerceptionError::invalid(format!(
                    "normal must have 3 components, got {}",
                    normal.len()
                )))
            }
        };
        if n.iter().any(|v| !v.is_finite()) || n.norm() <= EPS {
            return Err(PerceptionError::invalid(
                "normal must be a finite non-zero vector",
            ));
        }
        let n = n.normalize();

        let points: Vec<Point3<f64>> = xyz_points(cloud)?
            .into_iter()
            .filter(|p| p.iter().all(|v| v.is_finite()))
            .collect();
        if points.is_empty() {
            return Err(PerceptionError::invalid("point cloud has no finite points"));
        }

        // Any orthonormal basis (u, v) of the plane, then the principal axis
        // of the projected points within it.
        let seed = if n.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = (seed - n * n.dot(&seed)).normalize();
        let v = n.cross(&u);

        let count = points.len() as f64;
        let mean = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / count;
        let mut cov = Matrix2::zeros();
        for p in &points {
            let d = p.coords - mean;
            let q = nalgebra::Vector2::new(d.dot(&u), d.dot(&v));
            cov += q * q.transpose();
        }
        let eigen = SymmetricEigen::new(cov / count);
        let major = eigen.eigenvalues.imax();
        let e = eigen.eigenvectors.column(major);
        let a1 = (u * e[0] + v * e[1]).normalize();
        let a2 = n.cross(&a1);
        let axes = [a1, a2, n];

        let mut lo = Vector3::repeat(f64::INFINITY);
        let mut hi = Vector3::repeat(f64::NEG_INFINITY);
        for p in &points {
            for (i, axis) in axes.iter().enumerate() {
                let t = p.coords.dot(axis);
                lo[i] = lo[i].min(t);
                hi[i] = hi[i].max(t);
            }
        }
        let mid = (lo + hi) * 0.5;
        let center = Point3::from(a1 * mid.x + a2 * mid.y + n * mid.z);
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            Matrix3::from_columns(&axes),
        ));

        log::debug!(
            "fitted box around {} points: center {:?}, dimensions {:?}",
            points.len(),
            center,
            hi - lo
        );
        Ok(Self::from_parts(
            cloud.header.clone(),
            center,
            hi - lo,
            rotation,
        ))
    }

    /// Rebuild a box from its message. The orientation is recovered from the
    /// edges `v1 - v0` and `v3 - v0`; degenerate vertices give identity.
    pub fn from_msg(msg: &BoundingBox, header: Header) -> Result<Self, PerceptionError> {
        if msg.vertices.len() != 8 {
            return Err(PerceptionError::invalid(format!(
                "bounding box needs 8 vertices, got {}",
                msg.vertices.len()
            )));
        }
        let vertices: Vec<Point3<f64>> = msg.vertices.iter().map(to_point3).collect();
        let center = to_point3(&msg.center);
        if vertices
            .iter()
            .chain(std::iter::once(&center))
            .any(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(PerceptionError::invalid(
                "bounding box has non-finite coordinates",
            ));
        }

        Ok(Self {
            header,
            center,
            dimensions: Vector3::new(msg.dimensions.x, msg.dimensions.y, msg.dimensions.z),
            rotation: rotation_from_edges(&vertices),
            vertices,
        })
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    #[inline]
    pub fn dimensions(&self) -> Vector3<f64> {
        self.dimensions
    }

    #[inline]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    #[inline]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Stamped pose: position at the center, orientation of the box axes.
    pub fn pose(&self) -> PoseStamped {
        let q = self.rotation.quaternion();
        PoseStamped {
            header: self.header.clone(),
            pose: Pose {
                position: to_point_msg(&self.center),
                orientation: Quaternion {
                    x: q.i,
                    y: q.j,
                    z: q.k,
                    w: q.w,
                },
            },
        }
    }

    pub fn to_msg(&self) -> BoundingBox {
        BoundingBox {
            center: to_point_msg(&self.center),
            dimensions: Vector3Msg::new(self.dimensions.x, self.dimensions.y, self.dimensions.z),
            vertices: self.vertices.iter().map(to_point_msg).collect(),
        }
    }
}

fn rotation_from_edges(v: &[Point3<f64>]) -> UnitQuaternion<f64> {
    let e1 = v[1] - v[0];
    let e2 = v[3] - v[0];
    if e1.norm() <= EPS {
        return UnitQuaternion::identity();
    }
    let a1 = e1.normalize();
    let ortho = e2 - a1 * a1.dot(&e2);
    if ortho.norm() <= EPS {
        return UnitQuaternion::identity();
    }
    let a2 = ortho.normalize();
    let a3 = a1.cross(&a2);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
        Matrix3::from_columns(&[a1, a2, a3]),
    ))
}
