use image::{ImageBuffer, Pixel};

use crate::bbox2d::{fit_rect_to_bounds, BoundingBox2D, PixelRect};
use crate::PerceptionError;

/// Fit `rect` (grown by `offset`) into a grid of `dims` and require a
/// non-empty result.
pub(crate) fn fitted_crop_rect(
    dims: (u32, u32),
    rect: PixelRect,
    offset: i32,
) -> Result<PixelRect, PerceptionError> {
    let fitted = fit_rect_to_bounds(dims, rect, offset);
    if fitted.is_empty() {
        return Err(PerceptionError::out_of_range(format!(
            "crop region {rect:?} (offset {offset}) does not overlap the {}x{} grid",
            dims.0, dims.1
        )));
    }
    Ok(fitted)
}

/// Copy the pixels under `rect` (already fitted, non-empty) into a new image.
pub(crate) fn copy_region<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    rect: PixelRect,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let (x0, y0) = (rect.x as u32, rect.y as u32);
    ImageBuffer::from_fn(rect.width as u32, rect.height as u32, |x, y| {
        *image.get_pixel(x0 + x, y0 + y)
    })
}

/// Crop `image` to the region of `bbox`, grown by `offset` and fitted to the
/// image bounds.
///
/// The output is an independent copy whose size equals the fitted box.
/// Fails with [`PerceptionError::OutOfRange`] when the fitted box is empty.
pub fn crop_image<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    bbox: &BoundingBox2D,
    offset: i32,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, PerceptionError>
where
    P: Pixel,
{
    let rect = fitted_crop_rect(image.dimensions(), bbox.rect(), offset)?;
    Ok(copy_region(image, rect))
}
