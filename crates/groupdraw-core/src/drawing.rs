//! Ordered collection of strokes rendered on a canvas.

use crate::stroke::Stroke;
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// An ordered, append-biased sequence of strokes.
///
/// Order is both rendering order (back to front) and history order. All
/// mutation happens at the end of the sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    strokes: Vec<Stroke>,
}

impl Drawing {
    /// Create a new empty drawing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A drawing holding exactly one stroke, used for incremental draws.
    pub fn fragment(stroke: Stroke) -> Self {
        Self {
            strokes: vec![stroke],
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Most recently appended stroke.
    pub fn last(&self) -> Option<&Stroke> {
        self.strokes.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter()
    }

    /// Append a stroke at the end.
    pub fn push(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    pub(crate) fn pop(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    pub(crate) fn clear(&mut self) {
        self.strokes.clear();
    }

    /// Consume a fragment, yielding its stroke if it carries exactly one.
    pub fn into_single(mut self) -> Option<Stroke> {
        if self.strokes.len() == 1 {
            self.strokes.pop()
        } else {
            None
        }
    }

    /// Bounding box of all strokes, or `None` for an empty drawing.
    pub fn bounds(&self) -> Option<Rect> {
        self.strokes
            .iter()
            .filter(|s| !s.is_empty())
            .map(Stroke::bounds)
            .reduce(|a, b| a.union(b))
    }
}

impl From<Vec<Stroke>> for Drawing {
    fn from(strokes: Vec<Stroke>) -> Self {
        Self { strokes }
    }
}

impl FromIterator<Stroke> for Drawing {
    fn from_iter<I: IntoIterator<Item = Stroke>>(iter: I) -> Self {
        Self {
            strokes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Drawing {
    type Item = &'a Stroke;
    type IntoIter = std::slice::Iter<'a, Stroke>;

    fn into_iter(self) -> Self::IntoIter {
        self.strokes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;
    use kurbo::Point;

    fn stroke(x: f64) -> Stroke {
        Stroke::new(
            vec![Point::new(x, 0.0), Point::new(x + 10.0, 10.0)],
            StrokeStyle::default(),
        )
    }

    #[test]
    fn test_fragment_holds_one_stroke() {
        let s = stroke(0.0);
        let fragment = Drawing::fragment(s.clone());
        assert_eq!(fragment.len(), 1);
        assert_eq!(fragment.into_single(), Some(s));
    }

    #[test]
    fn test_into_single_rejects_other_sizes() {
        assert_eq!(Drawing::new().into_single(), None);
        let two: Drawing = vec![stroke(0.0), stroke(1.0)].into();
        assert_eq!(two.into_single(), None);
    }

    #[test]
    fn test_push_pop_at_end() {
        let (a, b) = (stroke(0.0), stroke(1.0));
        let mut drawing = Drawing::new();
        drawing.push(a.clone());
        drawing.push(b.clone());
        assert_eq!(drawing.last(), Some(&b));
        assert_eq!(drawing.pop(), Some(b));
        assert_eq!(drawing.strokes(), &[a]);
    }

    #[test]
    fn test_bounds() {
        assert!(Drawing::new().bounds().is_none());
        let drawing: Drawing = vec![stroke(0.0), stroke(100.0)].into_iter().collect();
        let bounds = drawing.bounds().unwrap();
        assert!((bounds.x1 - 110.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 10.0).abs() < f64::EPSILON);
    }
}
