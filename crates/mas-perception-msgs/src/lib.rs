//! Message schemas exchanged with the scripting side, plus the typed
//! serialization boundary.
//!
//! The structs mirror the ROS message definitions the perception stack
//! consumes (`std_msgs`, `geometry_msgs`, `sensor_msgs` and the detection
//! list messages). Payloads cross the boundary as JSON documents; use
//! [`decode`] and [`encode`] instead of calling `serde_json` directly so that
//! every decoded message is shape-checked before it reaches the geometry code.
//!
//! ```
//! use mas_perception_msgs::{decode, encode, sensor_msgs::Image};
//!
//! # fn main() -> Result<(), mas_perception_msgs::MsgError> {
//! let img = Image::from_raw("mono8", 2, 1, vec![7, 9]);
//! let json = encode(&img)?;
//! let back: Image = decode(&json)?;
//! assert_eq!(back.data, vec![7, 9]);
//! # Ok(())
//! # }
//! ```

pub mod detection_msgs;
pub mod geometry_msgs;
pub mod sensor_msgs;
mod serial;
pub mod std_msgs;

pub use detection_msgs::{BoundingBox, BoundingBoxList, ImageList};
pub use geometry_msgs::{Point, Point32, Pose, PoseStamped, Quaternion, Vector3};
pub use sensor_msgs::{CameraInfo, Image, PointCloud2, PointField, RegionOfInterest};
pub use serial::{decode, decode_slice, encode, Message, MsgError};
pub use std_msgs::{Header, Time};
