use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors raised while crossing the serialization boundary.
#[derive(thiserror::Error, Debug)]
pub enum MsgError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{what}: buffer holds {got} bytes, layout requires {expected}")]
    Truncated {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what}: {reason}")]
    Layout { what: &'static str, reason: String },
}

/// A message that can cross the boundary.
///
/// `validate` runs after every [`decode`]; the default accepts anything.
/// Messages carrying raw buffers override it to check that the declared
/// layout fits the data.
pub trait Message: Serialize + DeserializeOwned {
    fn validate(&self) -> Result<(), MsgError> {
        Ok(())
    }
}

/// Decode a JSON payload into a validated message.
pub fn decode<T: Message>(payload: &str) -> Result<T, MsgError> {
    let msg: T = serde_json::from_str(payload)?;
    msg.validate()?;
    Ok(msg)
}

/// Byte-slice flavour of [`decode`].
pub fn decode_slice<T: Message>(payload: &[u8]) -> Result<T, MsgError> {
    let msg: T = serde_json::from_slice(payload)?;
    msg.validate()?;
    Ok(msg)
}

/// Encode a message as a compact JSON payload.
pub fn encode<T: Message>(msg: &T) -> Result<String, MsgError> {
    Ok(serde_json::to_string(msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundingBoxList, Header, Image, PointCloud2, PoseStamped};

    #[test]
    fn corrupt_payload_is_a_json_error() {
        let err = decode::<Image>("{\"height\": 2, ").unwrap_err();
        assert!(matches!(err, MsgError::Json(_)));
    }

    #[test]
    fn image_with_short_buffer_is_rejected() {
        let payload = r#"{"height":2,"width":2,"encoding":"mono8","step":2,"data":[1,2,3]}"#;
        let err = decode::<Image>(payload).unwrap_err();
        assert!(matches!(
            err,
            MsgError::Truncated {
                expected: 4,
                got: 3,
                ..
            }
        ));
    }

    #[test]
    fn cloud_with_short_rows_is_rejected() {
        let mut cloud = PointCloud2::xyz32(Header::default(), 2, 2, &[[0.0; 3]; 4]);
        cloud.row_step = 4;
        let json = serde_json::to_string(&cloud).unwrap();
        assert!(matches!(
            decode::<PointCloud2>(&json),
            Err(MsgError::Layout { .. })
        ));
    }

    #[test]
    fn missing_header_defaults() {
        let payload = r#"{"pose":{"position":{"x":1.0,"y":2.0,"z":3.0},"orientation":{"x":0.0,"y":0.0,"z":0.0,"w":1.0}}}"#;
        let pose: PoseStamped = decode(payload).unwrap();
        assert_eq!(pose.header.frame_id, "");
        assert_eq!(pose.pose.position.y, 2.0);
    }

    #[test]
    fn slice_and_str_agree() {
        let payload = r#"{"bounding_boxes":[]}"#;
        let a: BoundingBoxList = decode(payload).unwrap();
        let b: BoundingBoxList = decode_slice(payload.as_bytes()).unwrap();
        assert_eq!(a, b);
        assert_eq!(encode(&a).unwrap(), payload);
    }
}
