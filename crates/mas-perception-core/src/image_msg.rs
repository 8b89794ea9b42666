//! Conversion between `sensor_msgs/Image` messages and `image` buffers.

use image::{Rgb, RgbImage};
use mas_perception_msgs::{Header, Image, Message};
use serde::{Deserialize, Serialize};

use crate::PerceptionError;

/// Color encodings produced when writing image messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Rgb8,
    #[default]
    Bgr8,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Rgb8 => "rgb8",
            ImageEncoding::Bgr8 => "bgr8",
        }
    }
}

/// Decode an 8-bit image message into an RGB buffer.
///
/// Supported encodings: `rgb8`, `bgr8`, `rgba8`, `bgra8`, `mono8`. Alpha is
/// dropped and mono is replicated into all three channels. Row padding
/// (`step` larger than the packed row) is honoured.
pub fn image_from_msg(msg: &Image) -> Result<RgbImage, PerceptionError> {
    msg.validate()?;

    // (bytes per pixel, channel index of r, g, b)
    let (bpp, [ri, gi, bi]) = match msg.encoding.as_str() {
        "rgb8" => (3, [0, 1, 2]),
        "bgr8" => (3, [2, 1, 0]),
        "rgba8" => (4, [0, 1, 2]),
        "bgra8" => (4, [2, 1, 0]),
        "mono8" => (1, [0, 0, 0]),
        other => {
            return Err(PerceptionError::invalid(format!(
                "unsupported image encoding '{other}'"
            )))
        }
    };

    let step = msg.step as usize;
    Ok(RgbImage::from_fn(msg.width, msg.height, |x, y| {
        let at = y as usize * step + x as usize * bpp;
        let px = &msg.data[at..at + bpp];
        Rgb([px[ri], px[gi], px[bi]])
    }))
}

/// Encode an RGB buffer as a tightly packed image message.
pub fn image_to_msg(img: &RgbImage, encoding: ImageEncoding, header: &Header) -> Image {
    let data = match encoding {
        ImageEncoding::Rgb8 => img.as_raw().clone(),
        ImageEncoding::Bgr8 => img
            .pixels()
            .flat_map(|&Rgb([r, g, b])| [b, g, r])
            .collect(),
    };
    let mut msg = Image::from_raw(encoding.as_str(), img.width(), img.height(), data);
    msg.header = header.clone();
    msg
}
