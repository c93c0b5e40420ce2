use geo::{BoundingRect, Geometry, Point, Rect};
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding envelope.
///
/// This is a wrapper around `geo::Rect`; corners are normalized on
/// construction so `min_* <= max_*` always holds. An envelope may degenerate
/// to a single point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The underlying geometric rectangle
    pub rect: Rect,
}

impl Envelope {
    /// Create a new envelope from minimum and maximum coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocache_types::bbox::Envelope;
    ///
    /// let env = Envelope::new(0.0, 0.0, 6.0, 6.0);
    /// assert_eq!(env.width(), 6.0);
    /// ```
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Rect::new(
                geo::coord! { x: min_x, y: min_y },
                geo::coord! { x: max_x, y: max_y },
            ),
        }
    }

    /// Envelope covering a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self { rect }
    }

    /// Bounding envelope of a geometry, or `None` for empty geometries.
    pub fn of_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(Self::from_rect)
    }

    pub fn min_x(&self) -> f64 {
        self.rect.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.rect.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.rect.max().y
    }

    pub fn width(&self) -> f64 {
        self.max_x() - self.min_x()
    }

    pub fn height(&self) -> f64 {
        self.max_y() - self.min_y()
    }

    /// True when the envelope has zero width and zero height.
    pub fn is_point(&self) -> bool {
        self.min_x() == self.max_x() && self.min_y() == self.max_y()
    }

    /// True when all four coordinates are finite.
    pub fn is_finite(&self) -> bool {
        [self.min_x(), self.min_y(), self.max_x(), self.max_y()]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Check if this envelope intersects with another. Touching edges count.
    pub fn intersects(&self, other: &Envelope) -> bool {
        !(self.max_x() < other.min_x()
            || self.min_x() > other.max_x()
            || self.max_y() < other.min_y()
            || self.min_y() > other.max_y())
    }
}

impl From<Rect> for Envelope {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}

/// Bounding shape stored in a spatial index.
///
/// Zero-area rectangles are kept as points; see [`Shape::from_envelope`].
/// Shape equality is meant for bounding-box bookkeeping, not exact geometry
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(Point),
    Rect(Rect),
}

impl Shape {
    pub fn point(x: f64, y: f64) -> Self {
        Shape::Point(Point::new(x, y))
    }

    /// Rectangle shape from corner coordinates, collapsed to a point when it
    /// has zero width and height.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::from_envelope(&Envelope::new(min_x, min_y, max_x, max_y))
    }

    /// Convert an envelope into the shape the index stores for it.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocache_types::bbox::{Envelope, Shape};
    ///
    /// assert_eq!(
    ///     Shape::from_envelope(&Envelope::new(5.0, 5.0, 5.0, 5.0)),
    ///     Shape::point(5.0, 5.0)
    /// );
    /// ```
    pub fn from_envelope(envelope: &Envelope) -> Self {
        if envelope.is_point() {
            Shape::point(envelope.min_x(), envelope.min_y())
        } else {
            Shape::Rect(envelope.rect)
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Shape::Point(_))
    }

    /// Axis-aligned bounding envelope of this shape.
    pub fn envelope(&self) -> Envelope {
        match self {
            Shape::Point(p) => Envelope::point(p.x(), p.y()),
            Shape::Rect(r) => Envelope::from_rect(*r),
        }
    }
}

impl From<Envelope> for Shape {
    fn from(envelope: Envelope) -> Self {
        Self::from_envelope(&envelope)
    }
}
