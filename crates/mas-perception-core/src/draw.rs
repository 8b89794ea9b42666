//! Rendering labeled boxes onto images.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{ImageBuffer, Luma, Pixel, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::bbox2d::{BoundingBox2D, PixelRect};
use crate::PerceptionError;

/// Label font used when [`DrawStyle::font`] is `None`.
const BUILTIN_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");
/// Glyph height in pixels at `font_scale == 1.0`.
const BASE_FONT_PX: f32 = 22.0;
/// Padding between the label text and its strip border.
const LABEL_PAD: u32 = 2;

/// 8-bit pixels that box colors can be painted in.
pub trait PaintPixel: Pixel<Subpixel = u8> {
    fn from_rgb(rgb: [u8; 3]) -> Self;
}

impl PaintPixel for Rgb<u8> {
    fn from_rgb(rgb: [u8; 3]) -> Self {
        Rgb(rgb)
    }
}

impl PaintPixel for Luma<u8> {
    fn from_rgb(rgb: [u8; 3]) -> Self {
        Luma([luminance(rgb)])
    }
}

fn luminance([r, g, b]: [u8; 3]) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Line and label settings for [`draw_labeled_boxes`].
#[derive(Clone, Debug)]
pub struct DrawStyle {
    /// Border width in pixels, grown outward from the box edge.
    pub thickness: i32,
    pub font_scale: f32,
    /// Label font; `None` selects the built-in DejaVu Sans Mono.
    pub font: Option<FontArc>,
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            font_scale: 1.0,
            font: None,
        }
    }
}

impl DrawStyle {
    pub fn new(thickness: i32, font_scale: f32) -> Self {
        Self {
            thickness,
            font_scale,
            font: None,
        }
    }

    /// Load a TrueType/OpenType font for the labels.
    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self, PerceptionError> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| PerceptionError::invalid(format!("cannot load font: {e}")))?;
        self.font = Some(font);
        Ok(self)
    }

    fn validate(&self) -> Result<(), PerceptionError> {
        if self.thickness < 1 {
            return Err(PerceptionError::invalid(format!(
                "line thickness must be at least 1, got {}",
                self.thickness
            )));
        }
        if !(self.font_scale.is_finite() && self.font_scale > 0.0) {
            return Err(PerceptionError::invalid(format!(
                "font scale must be positive, got {}",
                self.font_scale
            )));
        }
        Ok(())
    }
}

/// Draw `boxes` on a copy of `image` and return it.
pub fn draw_labeled_boxes<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    boxes: &[BoundingBox2D],
    style: &DrawStyle,
) -> Result<ImageBuffer<P, Vec<u8>>, PerceptionError>
where
    P: PaintPixel,
{
    let mut out = image.clone();
    draw_labeled_boxes_mut(&mut out, boxes, style)?;
    Ok(out)
}

/// Draw `boxes` onto `image` in list order, so later boxes cover earlier
/// ones. Boxes with an empty extent are skipped.
pub fn draw_labeled_boxes_mut<P>(
    image: &mut ImageBuffer<P, Vec<u8>>,
    boxes: &[BoundingBox2D],
    style: &DrawStyle,
) -> Result<(), PerceptionError>
where
    P: PaintPixel,
{
    style.validate()?;
    let builtin;
    let font = match &style.font {
        Some(font) => font,
        None => {
            builtin = builtin_font()?;
            &builtin
        }
    };

    for bbox in boxes {
        let rect = bbox.rect();
        if rect.is_empty() {
            log::debug!("skipping empty box '{}'", bbox.label());
            continue;
        }
        let color = P::from_rgb(bbox.color());
        draw_border(image, rect, style.thickness, color);
        if !bbox.label().is_empty() {
            draw_label(image, bbox, font, style, color);
        }
    }
    Ok(())
}

fn builtin_font() -> Result<FontArc, PerceptionError> {
    FontArc::try_from_slice(BUILTIN_FONT)
        .map_err(|e| PerceptionError::invalid(format!("cannot load built-in font: {e}")))
}

/// The inclusive pixel span `[x0, x1] x [y0, y1]` clipped to `dims`, or
/// `None` when nothing of it is on the image.
fn clip_span(x0: i64, y0: i64, x1: i64, y1: i64, (w, h): (u32, u32)) -> Option<Rect> {
    let (x0, y0) = (x0.max(0), y0.max(0));
    let (x1, y1) = (x1.min(i64::from(w) - 1), y1.min(i64::from(h) - 1));
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}

/// Paint a frame `thickness` pixels wide whose inner edge is the outline of
/// `rect`, as four clipped bands.
fn draw_border<P>(image: &mut ImageBuffer<P, Vec<u8>>, rect: PixelRect, thickness: i32, color: P)
where
    P: PaintPixel,
{
    let dims = image.dimensions();
    let grow = i64::from(thickness) - 1;
    let (l, t) = (i64::from(rect.x), i64::from(rect.y));
    let (r, b) = (l + i64::from(rect.width) - 1, t + i64::from(rect.height) - 1);
    let (ol, ot, or, ob) = (l - grow, t - grow, r + grow, b + grow);

    for (x0, y0, x1, y1) in [(ol, ot, or, t), (ol, b, or, ob), (ol, t, l, b), (r, t, or, b)] {
        if let Some(band) = clip_span(x0, y0, x1, y1, dims) {
            draw_filled_rect_mut(image, band, color);
        }
    }
}

fn draw_label<P>(
    image: &mut ImageBuffer<P, Vec<u8>>,
    bbox: &BoundingBox2D,
    font: &FontArc,
    style: &DrawStyle,
    fill: P,
) where
    P: PaintPixel,
{
    let scale = PxScale::from(BASE_FONT_PX * style.font_scale);
    let (text_w, _) = text_size(scale, font, bbox.label());
    let metrics = font.as_scaled(scale);
    let line_h = (metrics.ascent() - metrics.descent()).ceil() as i64;
    let strip_w = i64::from(text_w) + 2 * i64::from(LABEL_PAD);
    let strip_h = line_h + 2 * i64::from(LABEL_PAD);

    // Above the box, or just inside its top edge when there is no room.
    let grow = i64::from(style.thickness) - 1;
    let left = i64::from(bbox.x()) - grow;
    let above = i64::from(bbox.y()) - grow - strip_h;
    let top = if above < 0 { i64::from(bbox.y()) } else { above };

    let Some(strip) = clip_span(left, top, left + strip_w - 1, top + strip_h - 1, image.dimensions())
    else {
        return;
    };
    draw_filled_rect_mut(image, strip, fill);
    let ink = if luminance(bbox.color()) > 128 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    };
    draw_text_mut(
        image,
        P::from_rgb(ink),
        // the strip overlaps the image, so both fit in i32
        (left + i64::from(LABEL_PAD)) as i32,
        (top + i64::from(LABEL_PAD)) as i32,
        scale,
        font,
        bbox.label(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    fn red_box(x: i32, y: i32, w: i32, h: i32) -> BoundingBox2D {
        labeled("", x, y, w, h)
    }

    fn labeled(label: &str, x: i32, y: i32, w: i32, h: i32) -> BoundingBox2D {
        BoundingBox2D::new(label, [255, 0, 0], PixelRect::new(x, y, w, h)).unwrap()
    }

    #[test]
    fn pure_draw_leaves_input_untouched() {
        let img = RgbImage::new(20, 20);
        let out = draw_labeled_boxes(&img, &[red_box(5, 5, 6, 6)], &DrawStyle::new(1, 1.0)).unwrap();
        assert_eq!(img.get_pixel(5, 5), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(5, 5), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(10, 10), &Rgb([255, 0, 0]));
        // interior stays clear
        assert_eq!(out.get_pixel(8, 8), &Rgb([0, 0, 0]));
    }

    #[test]
    fn thickness_grows_outward() {
        let mut img = RgbImage::new(20, 20);
        draw_labeled_boxes_mut(&mut img, &[red_box(5, 5, 6, 6)], &DrawStyle::new(3, 1.0)).unwrap();
        assert_eq!(img.get_pixel(3, 3), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(2, 2), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(6, 6), &Rgb([0, 0, 0]));
    }

    #[test]
    fn later_boxes_draw_over_earlier() {
        let mut img = RgbImage::new(20, 20);
        let blue = BoundingBox2D::new("b", [0, 0, 255], PixelRect::new(5, 5, 6, 6)).unwrap();
        draw_labeled_boxes_mut(&mut img, &[red_box(5, 5, 6, 6), blue], &DrawStyle::default()).unwrap();
        assert_eq!(img.get_pixel(5, 5), &Rgb([0, 0, 255]));
    }

    #[test]
    fn boxes_may_leave_the_image() {
        let img = GrayImage::new(10, 10);
        let out = draw_labeled_boxes(&img, &[red_box(-4, 6, 30, 30)], &DrawStyle::default()).unwrap();
        assert_eq!(out.get_pixel(0, 6)[0], luminance([255, 0, 0]));
    }

    #[test]
    fn empty_boxes_are_skipped() {
        let mut bbox = red_box(1, 1, 2, 2);
        bbox.update_geometry(PixelRect::new(1, 1, 0, 5));
        let img = RgbImage::new(8, 8);
        let out = draw_labeled_boxes(&img, &[bbox], &DrawStyle::default()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn invalid_style_is_rejected() {
        let img = RgbImage::new(4, 4);
        for style in [DrawStyle::new(0, 1.0), DrawStyle::new(1, 0.0), DrawStyle::new(1, f32::NAN)] {
            assert!(matches!(
                draw_labeled_boxes(&img, &[], &style),
                Err(PerceptionError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn labels_use_the_builtin_font_by_default() {
        let img = RgbImage::new(80, 80);
        let out =
            draw_labeled_boxes(&img, &[labeled("cup", 10, 40, 20, 20)], &DrawStyle::default()).unwrap();

        // strip sits on top of the 2 px border, starting at its outer column
        assert_eq!(out.get_pixel(9, 38), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(9, 39), &Rgb([255, 0, 0]));
        // white ink on the red strip
        let inked = (0..39)
            .flat_map(|y| (0..80).map(move |x| (x, y)))
            .filter(|&(x, y)| out.get_pixel(x, y)[1] > 0)
            .count();
        assert!(inked > 0);
        // box interior stays clear
        assert_eq!(out.get_pixel(20, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn label_moves_inside_when_no_room_above() {
        let img = RgbImage::new(40, 40);
        let out =
            draw_labeled_boxes(&img, &[labeled("cup", 5, 1, 30, 30)], &DrawStyle::new(1, 0.5)).unwrap();
        assert_eq!(out.get_pixel(6, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn saturated_width_box_is_clipped() {
        let bbox = BoundingBox2D::from_numeric("", &[255.0, 0.0, 0.0], &[0.0, 0.0, 1e12, 5.0]).unwrap();
        assert_eq!(bbox.width(), i32::MAX);
        let out = draw_labeled_boxes(&RgbImage::new(10, 10), &[bbox], &DrawStyle::new(2, 1.0)).unwrap();
        assert_eq!(out.get_pixel(9, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(0, 3), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(9, 5), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(5, 2), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(5, 7), &Rgb([0, 0, 0]));

        let labeled = BoundingBox2D::from_numeric("big", &[255.0, 0.0, 0.0], &[0.0, 0.0, 1e12, 1e12]).unwrap();
        draw_labeled_boxes(&RgbImage::new(10, 10), &[labeled], &DrawStyle::new(2, 1.0)).unwrap();
    }

    #[test]
    fn box_at_minimum_origin_only_touches_its_corner() {
        let far = BoundingBox2D::new(
            "far",
            [255, 0, 0],
            PixelRect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
        )
        .unwrap();
        let img = RgbImage::new(6, 6);
        assert_eq!(draw_labeled_boxes(&img, &[far.clone()], &DrawStyle::new(1, 1.0)).unwrap(), img);

        // the last covered pixel is (-2, -2), so a 4 px frame reaches column and row 1
        let out = draw_labeled_boxes(&img, &[far], &DrawStyle::new(4, 1.0)).unwrap();
        assert_eq!(out.get_pixel(1, 1), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(2, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(0, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let err = DrawStyle::default().with_font_bytes(vec![0; 16]).unwrap_err();
        assert!(matches!(err, PerceptionError::InvalidArgument(_)));
    }
}
