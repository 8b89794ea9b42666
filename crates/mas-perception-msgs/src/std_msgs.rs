use serde::{Deserialize, Serialize};

/// ROS1 time stamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

/// Standard metadata for higher-level stamped data types.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: String,
}

impl Header {
    pub fn with_frame(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            ..Self::default()
        }
    }
}
