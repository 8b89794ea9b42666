use image::{Rgb, RgbImage};
use mas_perception_core::{
    get_crops_and_bounding_boxes, get_crops_and_bounding_boxes_serialized, image_to_msg,
    BoundingBox2D, BoundingBox3D, Detection, ImageEncoding, PerceptionError, PipelineParams,
    PixelRect,
};
use mas_perception_msgs::{decode, encode, BoundingBoxList, CameraInfo, Header, ImageList};
use nalgebra::{Point3, UnitQuaternion, Vector3};

fn scene() -> RgbImage {
    RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 100]))
}

fn camera() -> CameraInfo {
    CameraInfo::pinhole(64, 48, 50.0, 50.0, 32.0, 24.0)
}

fn cube_at(center: Point3<f64>) -> BoundingBox3D {
    BoundingBox3D::from_parts(
        Header::with_frame("camera_optical"),
        center,
        Vector3::new(0.2, 0.2, 0.2),
        UnitQuaternion::identity(),
    )
}

#[test]
fn mixed_detections_keep_order() {
    let detections: Vec<Detection> = vec![
        cube_at(Point3::new(0.0, 0.0, 2.0)).into(),
        BoundingBox2D::new("left", [0, 0, 255], PixelRect::new(-3, -3, 10, 10))
            .unwrap()
            .into(),
    ];
    let out = get_crops_and_bounding_boxes(
        &scene(),
        &Header::with_frame("camera_optical"),
        &camera(),
        &detections,
        &PipelineParams::default(),
    )
    .unwrap();

    assert_eq!(out.crops.images.len(), 2);
    assert_eq!(out.vertices.len(), 2);

    // the cube spans u, v in [29.37, 34.63] x [21.37, 26.63]
    let cube = &out.crops.images[0];
    assert_eq!((cube.width, cube.height), (6, 6));
    assert_eq!(
        out.vertex_arrays()[0],
        [[29.0, 21.0], [35.0, 21.0], [35.0, 27.0], [29.0, 27.0]]
    );

    let left = &out.crops.images[1];
    assert_eq!((left.width, left.height), (7, 7));
}

#[test]
fn box_behind_the_camera_is_out_of_range() {
    let err = get_crops_and_bounding_boxes(
        &scene(),
        &Header::default(),
        &camera(),
        &[cube_at(Point3::new(0.0, 0.0, -2.0)).into()],
        &PipelineParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PerceptionError::OutOfRange(_)));
}

#[test]
fn uncalibrated_camera_fails_for_3d_boxes() {
    let err = get_crops_and_bounding_boxes(
        &scene(),
        &Header::default(),
        &CameraInfo::default(),
        &[cube_at(Point3::new(0.0, 0.0, 2.0)).into()],
        &PipelineParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PerceptionError::InvalidArgument(_)));
}

#[test]
fn serialized_entry_point_round_trips_messages() {
    let header = Header::with_frame("camera_optical");
    let image_json = encode(&image_to_msg(&scene(), ImageEncoding::Bgr8, &header)).unwrap();
    let camera_json = encode(&camera()).unwrap();
    let boxes = BoundingBoxList {
        bounding_boxes: vec![
            cube_at(Point3::new(0.0, 0.0, 2.0)).to_msg(),
            cube_at(Point3::new(0.2, 0.0, 2.0)).to_msg(),
        ],
    };
    let boxes_json = encode(&boxes).unwrap();

    let (crops_json, vertices) = get_crops_and_bounding_boxes_serialized(
        &image_json,
        &camera_json,
        &boxes_json,
        &PipelineParams {
            crop_offset: 2,
            ..PipelineParams::default()
        },
    )
    .unwrap();

    let crops: ImageList = decode(&crops_json).unwrap();
    assert_eq!(crops.images.len(), 2);
    assert_eq!(vertices.len(), 2);
    assert_eq!((crops.images[0].width, crops.images[0].height), (10, 10));
    assert_eq!(crops.images[0].header.frame_id, "camera_optical");
    assert!(vertices[1][0][0] > vertices[0][0][0]);
}

#[test]
fn serialized_entry_point_rejects_malformed_json() {
    let err = get_crops_and_bounding_boxes_serialized(
        "{not json",
        "{}",
        r#"{"bounding_boxes": []}"#,
        &PipelineParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PerceptionError::Deserialization(_)));
}

#[test]
fn empty_box_list_is_not_an_error() {
    let image_json =
        encode(&image_to_msg(&scene(), ImageEncoding::Rgb8, &Header::default())).unwrap();
    let (crops_json, vertices) = get_crops_and_bounding_boxes_serialized(
        &image_json,
        &encode(&CameraInfo::default()).unwrap(),
        r#"{"bounding_boxes": []}"#,
        &PipelineParams::default(),
    )
    .unwrap();
    let crops: ImageList = decode(&crops_json).unwrap();
    assert!(crops.images.is_empty());
    assert!(vertices.is_empty());
}
