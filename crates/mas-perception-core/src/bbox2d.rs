use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::PerceptionError;

/// Integer pixel rectangle; `(x, y)` is the top-left corner and the right and
/// bottom edges are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Corners in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let (l, t) = (self.x as f32, self.y as f32);
        let (r, b) = (self.right() as f32, self.bottom() as f32);
        [
            Point2::new(l, t),
            Point2::new(r, t),
            Point2::new(r, b),
            Point2::new(l, b),
        ]
    }

    /// Smallest integer rectangle containing all points.
    ///
    /// Coordinates are floored, so a point at `x = 3.7` lands in pixel
    /// column 3 and the rectangle spans `floor(max) - floor(min) + 1` pixels.
    /// Returns `None` for an empty slice or non-finite coordinates.
    pub fn bounding(points: &[Point2<f32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y) = (first.x, first.y);
        let (mut max_x, mut max_y) = (first.x, first.y);
        for p in points {
            if !p.x.is_finite() || !p.y.is_finite() {
                return None;
            }
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let x = min_x.floor() as i32;
        let y = min_y.floor() as i32;
        Some(Self::new(
            x,
            y,
            (max_x.floor() as i32).saturating_sub(x).saturating_add(1),
            (max_y.floor() as i32).saturating_sub(y).saturating_add(1),
        ))
    }
}

/// Grow `rect` by `offset` on every side, then clamp each edge into a
/// `bounds.0 x bounds.1` grid.
///
/// Edges are clamped independently: a violated edge is pulled back to the
/// boundary and the opposite edge stays where it was requested. The result
/// may be empty (zero width or height) but never has negative extents.
pub fn fit_rect_to_bounds(bounds: (u32, u32), rect: PixelRect, offset: i32) -> PixelRect {
    let w = i64::from(bounds.0).min(i64::from(i32::MAX));
    let h = i64::from(bounds.1).min(i64::from(i32::MAX));
    let offset = i64::from(offset);

    let left = (i64::from(rect.x) - offset).clamp(0, w);
    let top = (i64::from(rect.y) - offset).clamp(0, h);
    let right = (i64::from(rect.x) + i64::from(rect.width) + offset).clamp(left, w);
    let bottom = (i64::from(rect.y) + i64::from(rect.height) + offset).clamp(top, h);

    PixelRect::new(
        left as i32,
        top as i32,
        (right - left) as i32,
        (bottom - top) as i32,
    )
}

#[derive(Serialize, Deserialize)]
struct BoundingBox2DRepr {
    #[serde(default)]
    label: String,
    #[serde(default)]
    color: [u8; 3],
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

/// Axis-aligned pixel box with a display color (RGB) and a text label.
///
/// Construction requires a positive width and height. The geometry can only
/// change through [`BoundingBox2D::update_geometry`], which also accepts the
/// empty rectangles that fitting may produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoundingBox2DRepr", into = "BoundingBox2DRepr")]
pub struct BoundingBox2D {
    label: String,
    color: [u8; 3],
    rect: PixelRect,
}

impl BoundingBox2D {
    pub fn new(
        label: impl Into<String>,
        color: [u8; 3],
        rect: PixelRect,
    ) -> Result<Self, PerceptionError> {
        if rect.is_empty() {
            return Err(PerceptionError::invalid(format!(
                "box geometry must have a positive size, got {}x{}",
                rect.width, rect.height
            )));
        }
        Ok(Self {
            label: label.into(),
            color,
            rect,
        })
    }

    /// Build a box from loosely typed numeric sequences, as handed over by a
    /// scripting caller.
    ///
    /// `color` must hold 3 channel values and `geometry` the 4 values
    /// `(x, y, width, height)`. Values are truncated toward zero, never
    /// rounded: `(1.9, 2.9, 3.9, 4.9)` becomes `x=1, y=2, w=3, h=4`. Color
    /// channels are truncated the same way and saturated into `0..=255`.
    pub fn from_numeric(
        label: impl Into<String>,
        color: &[f64],
        geometry: &[f64],
    ) -> Result<Self, PerceptionError> {
        let color: [f64; 3] = color.try_into().map_err(|_| {
            PerceptionError::invalid(format!(
                "color must contain 3 numeric channels, got {}",
                color.len()
            ))
        })?;
        let geometry: [f64; 4] = geometry.try_into().map_err(|_| {
            PerceptionError::invalid(format!(
                "box geometry must contain 4 numerics (x, y, width, height), got {}",
                geometry.len()
            ))
        })?;
        if color.iter().chain(&geometry).any(|v| !v.is_finite()) {
            return Err(PerceptionError::invalid(
                "color and box geometry must be finite numbers",
            ));
        }

        let [x, y, width, height] = geometry.map(truncate);
        let color = color.map(|c| truncate(c).clamp(0, 255) as u8);
        Self::new(label, color, PixelRect::new(x, y, width, height))
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    #[inline]
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    #[inline]
    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.rect.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.rect.y
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.rect.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.rect.height
    }

    /// Replace x, y, width and height in one step.
    pub fn update_geometry(&mut self, rect: PixelRect) {
        self.rect = rect;
    }
}

impl TryFrom<BoundingBox2DRepr> for BoundingBox2D {
    type Error = PerceptionError;

    fn try_from(repr: BoundingBox2DRepr) -> Result<Self, Self::Error> {
        Self::new(
            repr.label,
            repr.color,
            PixelRect::new(repr.x, repr.y, repr.width, repr.height),
        )
    }
}

impl From<BoundingBox2D> for BoundingBox2DRepr {
    fn from(b: BoundingBox2D) -> Self {
        Self {
            label: b.label,
            color: b.color,
            x: b.rect.x,
            y: b.rect.y,
            width: b.rect.width,
            height: b.rect.height,
        }
    }
}

/// Float to integer conversion that truncates toward zero and saturates.
#[inline]
fn truncate(v: f64) -> i32 {
    v as i32
}

/// Fit a box into an image of `image_size = (width, height)`, grown by
/// `offset` pixels on each side.
///
/// Label and color are kept. The fitted geometry may be empty when the box
/// lies entirely outside the image; only a zero image size is an error.
pub fn fit_box_to_image(
    image_size: (u32, u32),
    bbox: &BoundingBox2D,
    offset: i32,
) -> Result<BoundingBox2D, PerceptionError> {
    if image_size.0 == 0 || image_size.1 == 0 {
        return Err(PerceptionError::invalid(format!(
            "image size must be positive, got {}x{}",
            image_size.0, image_size.1
        )));
    }
    let mut fitted = bbox.clone();
    fitted.update_geometry(fit_rect_to_bounds(image_size, bbox.rect(), offset));
    Ok(fitted)
}
