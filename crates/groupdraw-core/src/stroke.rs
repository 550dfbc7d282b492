//! Strokes: the atomic unit of ink exchanged between participants.

use kurbo::{Line, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default tolerance used when simplifying a finished stroke.
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.5;

/// Unique identifier of a stroke.
pub type StrokeId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Ink style carried with every stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    /// Ink color.
    pub color: SerializableColor,
    /// Pen width.
    pub width: f64,
}

impl StrokeStyle {
    /// Get the ink color as a peniko Color.
    pub fn color(&self) -> Color {
        self.color.into()
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: SerializableColor::black(),
            width: 2.0,
        }
    }
}

/// One continuous ink mark.
///
/// A stroke is immutable once built; two strokes are the same stroke when
/// their encoded forms are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    id: StrokeId,
    points: Vec<Point>,
    style: StrokeStyle,
}

impl Stroke {
    /// Create a stroke from finished points.
    pub fn new(points: Vec<Point>, style: StrokeStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            style,
        }
    }

    pub fn id(&self) -> StrokeId {
        self.id
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn style(&self) -> &StrokeStyle {
        &self.style
    }

    /// Get the number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounds of the path (not including pen width).
    pub fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };
        self.points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |rect, p| rect.union_pt(*p))
    }
}

/// Accumulates pointer samples for the stroke currently being drawn.
///
/// Nothing leaves the builder until [`StrokeBuilder::finish`] is called on
/// pen-up, so in-progress movement never reaches the session.
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    points: Vec<Point>,
    style: StrokeStyle,
    tolerance: f64,
}

impl StrokeBuilder {
    pub fn new(style: StrokeStyle) -> Self {
        Self {
            points: Vec::new(),
            style,
            tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
        }
    }

    /// Set the simplification tolerance; zero keeps every sample.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    /// Add a pointer sample to the path.
    pub fn add_point(&mut self, point: Point) {
        if self.points.last() == Some(&point) {
            return;
        }
        self.points.push(point);
    }

    /// Number of samples collected so far.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop the in-progress stroke.
    pub fn cancel(&mut self) {
        self.points.clear();
    }

    /// Finish the stroke on pen-up. Returns `None` if nothing was drawn.
    pub fn finish(&mut self) -> Option<Stroke> {
        if self.points.is_empty() {
            return None;
        }
        let points = std::mem::take(&mut self.points);
        let points = if self.tolerance > 0.0 {
            rdp_simplify(&points, self.tolerance)
        } else {
            points
        };
        Some(Stroke::new(points, self.style))
    }
}

/// Ramer-Douglas-Peucker simplification, driven by an explicit span stack
/// so long strokes cannot exhaust the call stack. Endpoints always survive.
fn rdp_simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut spans = vec![(0, n - 1)];
    while let Some((start, end)) = spans.pop() {
        let chord = Line::new(points[start], points[end]);
        let farthest = (start + 1..end)
            .map(|i| (i, chord_distance(points[i], chord)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((split, distance)) = farthest {
            if distance > tolerance {
                keep[split] = true;
                spans.push((start, split));
                spans.push((split, end));
            }
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect()
}

/// Distance from `point` to the infinite line through `chord`.
fn chord_distance(point: Point, chord: Line) -> f64 {
    let direction = chord.p1 - chord.p0;
    let length = direction.hypot();
    if length < f64::EPSILON {
        return point.distance(chord.p0);
    }
    direction.cross(point - chord.p0).abs() / length
}
