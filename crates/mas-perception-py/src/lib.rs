use ::mas_perception::core::{
    self as perception, BoundingBox2D, BoundingBox3D, DrawStyle, PerceptionError, PipelineParams,
    PixelRect,
};
use ::mas_perception::msgs::{decode, encode, MsgError, PointCloud2};
use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::DMatrix;
use numpy::ndarray::{Array2, Array3};
use numpy::{
    Element, IntoPyArray, PyArrayDyn, PyArrayMethods, PyReadonlyArrayDyn, PyUntypedArrayMethods,
};
use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(err: PerceptionError) -> PyErr {
    match &err {
        PerceptionError::InvalidArgument(_) | PerceptionError::DimensionMismatch { .. } => {
            PyValueError::new_err(err.to_string())
        }
        PerceptionError::OutOfRange(_) => PyIndexError::new_err(err.to_string()),
        PerceptionError::Deserialization(_) => PyRuntimeError::new_err(err.to_string()),
    }
}

fn msg_err(err: MsgError) -> PyErr {
    to_py_err(err.into())
}

fn decode_cloud(serial_cloud: &str) -> PyResult<PointCloud2> {
    decode(serial_cloud).map_err(msg_err)
}

/// numpy image: `(H, W)` mono or `(H, W, 3)` BGR, held as an `image` buffer.
enum NdImage {
    Gray(GrayImage),
    Bgr(RgbImage),
}

fn image_dims(h: usize, w: usize) -> PyResult<(u32, u32)> {
    let w = u32::try_from(w).map_err(|_| PyValueError::new_err("image width is too large"))?;
    let h = u32::try_from(h).map_err(|_| PyValueError::new_err("image height is too large"))?;
    Ok((w, h))
}

/// `obj` as a numpy array of `T`. Arrays of another numeric dtype, and
/// nested sequences, go through `numpy.asarray(obj, dtype)`.
fn numeric_array<'py, T: Element>(
    obj: &Bound<'py, PyAny>,
    dtype: &str,
) -> PyResult<PyReadonlyArrayDyn<'py, T>> {
    let array = match obj.downcast::<PyArrayDyn<T>>() {
        Ok(array) => array.clone(),
        Err(_) => PyModule::import(obj.py(), "numpy")?
            .getattr("asarray")?
            .call1((obj, dtype))?
            .downcast_into::<PyArrayDyn<T>>()
            .map_err(|_| PyValueError::new_err(format!("expected an array convertible to {dtype}")))?,
    };
    array
        .try_readonly()
        .map_err(|e| PyRuntimeError::new_err(format!("cannot borrow array: {e}")))
}

fn image_from_array(image: &Bound<'_, PyAny>) -> PyResult<NdImage> {
    let array = numeric_array::<u8>(image, "uint8")?;
    let view = array.as_array();
    match *array.shape() {
        [h, w] => {
            let (w, h) = image_dims(h, w)?;
            Ok(NdImage::Gray(GrayImage::from_fn(w, h, |x, y| {
                Luma([view[[y as usize, x as usize]]])
            })))
        }
        [h, w, 3] => {
            let (w, h) = image_dims(h, w)?;
            Ok(NdImage::Bgr(RgbImage::from_fn(w, h, |x, y| {
                let (x, y) = (x as usize, y as usize);
                Rgb([view[[y, x, 2]], view[[y, x, 1]], view[[y, x, 0]]])
            })))
        }
        _ => Err(PyValueError::new_err(
            "expected an image array with shape (H, W) or (H, W, 3)",
        )),
    }
}

fn shape_err(err: impl std::fmt::Display) -> PyErr {
    PyRuntimeError::new_err(format!("failed to build output array: {err}"))
}

fn bgr_array<'py>(py: Python<'py>, img: &RgbImage) -> PyResult<Bound<'py, PyAny>> {
    let (w, h) = img.dimensions();
    let data: Vec<u8> = img.pixels().flat_map(|&Rgb([r, g, b])| [b, g, r]).collect();
    let array = Array3::from_shape_vec((h as usize, w as usize, 3), data).map_err(shape_err)?;
    Ok(array.into_pyarray(py).into_any())
}

fn image_to_array(py: Python<'_>, img: NdImage) -> PyResult<Bound<'_, PyAny>> {
    match img {
        NdImage::Gray(gray) => {
            let (w, h) = gray.dimensions();
            let array = Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
                .map_err(shape_err)?;
            Ok(array.into_pyarray(py).into_any())
        }
        NdImage::Bgr(rgb) => bgr_array(py, &rgb),
    }
}

/// Image size component from Python: truncated like the box geometry.
fn pixel_extent(value: f64) -> PyResult<u32> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(PyValueError::new_err(format!(
            "image size must be non-negative, got {value}"
        )));
    }
    Ok(value as u32)
}

/// 2D box with a label and a display color. Colors are BGR tuples, matching
/// the numpy images.
#[pyclass(name = "BoundingBox2DWrapper", module = "mas_perception")]
#[derive(Clone)]
struct PyBoundingBox2D {
    inner: BoundingBox2D,
}

#[pymethods]
impl PyBoundingBox2D {
    #[new]
    #[pyo3(signature = (label, color, geometry))]
    fn new(label: String, color: Vec<f64>, geometry: Vec<f64>) -> PyResult<Self> {
        let rgb: Vec<f64> = color.iter().rev().copied().collect();
        let inner = BoundingBox2D::from_numeric(label, &rgb, &geometry).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn label(&self) -> &str {
        self.inner.label()
    }

    #[setter]
    fn set_label(&mut self, label: String) {
        self.inner.set_label(label);
    }

    #[getter]
    fn color(&self) -> (u8, u8, u8) {
        let [r, g, b] = self.inner.color();
        (b, g, r)
    }

    #[getter]
    fn x(&self) -> i32 {
        self.inner.x()
    }

    #[setter]
    fn set_x(&mut self, x: i32) {
        let rect = self.inner.rect();
        self.inner.update_geometry(PixelRect { x, ..rect });
    }

    #[getter]
    fn y(&self) -> i32 {
        self.inner.y()
    }

    #[setter]
    fn set_y(&mut self, y: i32) {
        let rect = self.inner.rect();
        self.inner.update_geometry(PixelRect { y, ..rect });
    }

    #[getter]
    fn width(&self) -> i32 {
        self.inner.width()
    }

    #[setter]
    fn set_width(&mut self, width: i32) {
        let rect = self.inner.rect();
        self.inner.update_geometry(PixelRect { width, ..rect });
    }

    #[getter]
    fn height(&self) -> i32 {
        self.inner.height()
    }

    #[setter]
    fn set_height(&mut self, height: i32) {
        let rect = self.inner.rect();
        self.inner.update_geometry(PixelRect { height, ..rect });
    }

    fn __repr__(&self) -> String {
        format!(
            "BoundingBox2DWrapper(label={:?}, x={}, y={}, width={}, height={})",
            self.inner.label(),
            self.inner.x(),
            self.inner.y(),
            self.inner.width(),
            self.inner.height()
        )
    }
}

/// Oriented 3D box fitted around a serialized point cloud.
#[pyclass(name = "BoundingBoxWrapper", module = "mas_perception")]
struct PyBoundingBox3D {
    inner: BoundingBox3D,
}

#[pymethods]
impl PyBoundingBox3D {
    #[new]
    fn new(py: Python<'_>, serial_cloud: &str, normal: Vec<f64>) -> PyResult<Self> {
        let cloud = decode_cloud(serial_cloud)?;
        let inner = py
            .allow_threads(|| BoundingBox3D::from_cloud(&cloud, &normal))
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Serialized `geometry_msgs/PoseStamped`.
    fn get_pose(&self) -> PyResult<String> {
        encode(&self.inner.pose()).map_err(msg_err)
    }

    /// Serialized `BoundingBox` message.
    fn get_ros_message(&self) -> PyResult<String> {
        encode(&self.inner.to_msg()).map_err(msg_err)
    }
}

#[pyfunction]
#[pyo3(signature = (serial_image, serial_camera_info, serial_bounding_box_list, offset=0))]
fn get_crops_and_bounding_boxes_wrapper(
    py: Python<'_>,
    serial_image: &str,
    serial_camera_info: &str,
    serial_bounding_box_list: &str,
    offset: i32,
) -> PyResult<(String, Vec<[[f32; 2]; 4]>)> {
    let params = PipelineParams {
        crop_offset: offset,
        ..PipelineParams::default()
    };
    py.allow_threads(|| {
        perception::get_crops_and_bounding_boxes_serialized(
            serial_image,
            serial_camera_info,
            serial_bounding_box_list,
            &params,
        )
    })
    .map_err(to_py_err)
}

#[pyfunction]
#[pyo3(signature = (image, boxes, thickness=2, font_scale=1.0, font_path=None))]
fn _draw_labeled_boxes<'py>(
    py: Python<'py>,
    image: &Bound<'py, PyAny>,
    boxes: Vec<PyBoundingBox2D>,
    thickness: i32,
    font_scale: f32,
    font_path: Option<&str>,
) -> PyResult<Bound<'py, PyAny>> {
    let mut style = DrawStyle::new(thickness, font_scale);
    if let Some(path) = font_path {
        let bytes = std::fs::read(path)
            .map_err(|e| PyValueError::new_err(format!("cannot read font '{path}': {e}")))?;
        style = style.with_font_bytes(bytes).map_err(to_py_err)?;
    }
    let boxes: Vec<BoundingBox2D> = boxes.into_iter().map(|b| b.inner).collect();
    let img = image_from_array(image)?;

    let drawn = py
        .allow_threads(|| match img {
            NdImage::Gray(gray) => {
                perception::draw_labeled_boxes(&gray, &boxes, &style).map(NdImage::Gray)
            }
            NdImage::Bgr(rgb) => perception::draw_labeled_boxes(&rgb, &boxes, &style).map(NdImage::Bgr),
        })
        .map_err(to_py_err)?;
    image_to_array(py, drawn)
}

#[pyfunction]
fn _fit_box_to_image(
    image_size: Vec<f64>,
    bbox: PyRef<'_, PyBoundingBox2D>,
    offset: i32,
) -> PyResult<PyBoundingBox2D> {
    let &[width, height] = image_size.as_slice() else {
        return Err(PyValueError::new_err(
            "image size is not a tuple containing 2 numerics",
        ));
    };
    let size = (pixel_extent(width)?, pixel_extent(height)?);
    let inner = perception::fit_box_to_image(size, &bbox.inner, offset).map_err(to_py_err)?;
    Ok(PyBoundingBox2D { inner })
}

#[pyfunction]
fn _crop_image<'py>(
    py: Python<'py>,
    image: &Bound<'py, PyAny>,
    bbox: PyRef<'py, PyBoundingBox2D>,
    offset: i32,
) -> PyResult<Bound<'py, PyAny>> {
    let cropped = match image_from_array(image)? {
        NdImage::Gray(gray) => perception::crop_image(&gray, &bbox.inner, offset).map(NdImage::Gray),
        NdImage::Bgr(rgb) => perception::crop_image(&rgb, &bbox.inner, offset).map(NdImage::Bgr),
    }
    .map_err(to_py_err)?;
    image_to_array(py, cropped)
}

#[pyfunction]
fn _cloud_msg_to_cv_image<'py>(py: Python<'py>, serial_cloud: &str) -> PyResult<Bound<'py, PyAny>> {
    let cloud = decode_cloud(serial_cloud)?;
    let img = py
        .allow_threads(|| perception::cloud_msg_to_image(&cloud))
        .map_err(to_py_err)?;
    bgr_array(py, &img)
}

#[pyfunction]
fn _cloud_msg_to_image_msg(py: Python<'_>, serial_cloud: &str) -> PyResult<String> {
    let cloud = decode_cloud(serial_cloud)?;
    let msg = py
        .allow_threads(|| perception::cloud_msg_to_image_msg(&cloud))
        .map_err(to_py_err)?;
    encode(&msg).map_err(msg_err)
}

#[pyfunction]
fn _crop_organized_cloud_msg(
    py: Python<'_>,
    serial_cloud: &str,
    bbox: PyRef<'_, PyBoundingBox2D>,
) -> PyResult<String> {
    let cloud = decode_cloud(serial_cloud)?;
    let bbox = bbox.inner.clone();
    let cropped = py
        .allow_threads(|| perception::crop_organized_cloud_msg(&cloud, &bbox))
        .map_err(to_py_err)?;
    encode(&cropped).map_err(msg_err)
}

#[pyfunction]
fn _crop_cloud_to_xyz<'py>(
    py: Python<'py>,
    serial_cloud: &str,
    bbox: PyRef<'py, PyBoundingBox2D>,
) -> PyResult<Bound<'py, PyAny>> {
    let cloud = decode_cloud(serial_cloud)?;
    let bbox = bbox.inner.clone();
    let grid = py
        .allow_threads(|| perception::crop_cloud_msg_to_xyz(&cloud, &bbox))
        .map_err(to_py_err)?;
    let array = Array3::from_shape_vec((grid.height, grid.width, 3), grid.to_flat_vec())
        .map_err(shape_err)?;
    Ok(array.into_pyarray(py).into_any())
}

#[pyfunction]
fn _transform_point_cloud(
    py: Python<'_>,
    serial_cloud: &str,
    transform: &Bound<'_, PyAny>,
) -> PyResult<String> {
    let transform = numeric_array::<f64>(transform, "float64")?;
    let shape = transform.shape();
    let &[rows, cols] = shape else {
        return Err(PyValueError::new_err(format!(
            "transformation must be a 2D array, got {} dimensions",
            shape.len()
        )));
    };
    let matrix = DMatrix::from_row_iterator(rows, cols, transform.as_array().iter().copied());
    let cloud = decode_cloud(serial_cloud)?;
    let moved = py
        .allow_threads(|| perception::transform_point_cloud(&cloud, &matrix))
        .map_err(to_py_err)?;
    encode(&moved).map_err(msg_err)
}

#[pymodule]
fn mas_perception(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBoundingBox2D>()?;
    m.add_class::<PyBoundingBox3D>()?;

    m.add_function(wrap_pyfunction!(get_crops_and_bounding_boxes_wrapper, m)?)?;
    m.add_function(wrap_pyfunction!(_draw_labeled_boxes, m)?)?;
    m.add_function(wrap_pyfunction!(_fit_box_to_image, m)?)?;
    m.add_function(wrap_pyfunction!(_crop_image, m)?)?;
    m.add_function(wrap_pyfunction!(_cloud_msg_to_cv_image, m)?)?;
    m.add_function(wrap_pyfunction!(_cloud_msg_to_image_msg, m)?)?;
    m.add_function(wrap_pyfunction!(_crop_organized_cloud_msg, m)?)?;
    m.add_function(wrap_pyfunction!(_crop_cloud_to_xyz, m)?)?;
    m.add_function(wrap_pyfunction!(_transform_point_cloud, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
