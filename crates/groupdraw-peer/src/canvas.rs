//! A canvas that lives in the terminal.

use groupdraw_core::{CanvasBridge, CanvasEvents, CanvasNotifier, Drawing, Stroke, StrokeBuilder, StrokeStyle};
use kurbo::Point;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct TextCanvas {
    drawing: Arc<Mutex<Drawing>>,
    notifier: CanvasNotifier,
    style: StrokeStyle,
}

impl TextCanvas {
    pub fn new(style: StrokeStyle) -> (Self, CanvasEvents) {
        let (notifier, events) = CanvasNotifier::channel();
        let canvas = Self {
            drawing: Arc::new(Mutex::new(Drawing::new())),
            notifier,
            style,
        };
        (canvas, events)
    }

    fn lock(&self) -> MutexGuard<'_, Drawing> {
        self.drawing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draw a stroke through `points` as if the pen followed them.
    pub fn draw(&self, points: &[Point]) -> Option<Stroke> {
        let mut builder = StrokeBuilder::new(self.style);
        for point in points {
            builder.add_point(*point);
        }
        let stroke = builder.finish()?;
        self.lock().push(stroke.clone());
        self.notifier.stroke_completed(stroke.clone());
        Some(stroke)
    }

    pub fn render(&self) -> String {
        let drawing = self.lock();
        let mut out = String::new();
        if drawing.is_empty() {
            out.push_str("(empty canvas)");
            return out;
        }
        for (i, stroke) in drawing.iter().enumerate() {
            let b = stroke.bounds();
            let _ = writeln!(
                out,
                "{:>3}: {} points, bounds ({:.1},{:.1})-({:.1},{:.1})",
                i + 1,
                stroke.len(),
                b.x0,
                b.y0,
                b.x1,
                b.y1
            );
        }
        if let Some(b) = drawing.bounds() {
            let _ = write!(
                out,
                "{} strokes, {:.0}x{:.0}",
                drawing.len(),
                b.width(),
                b.height()
            );
        }
        out
    }
}

impl CanvasBridge for TextCanvas {
    fn current_drawing(&self) -> Drawing {
        self.lock().clone()
    }

    fn set_drawing(&mut self, drawing: Drawing) {
        log::info!("Canvas now has {} strokes", drawing.len());
        *self.lock() = drawing;
    }

    fn append_stroke(&mut self, stroke: Stroke) {
        let mut drawing = self.lock();
        drawing.push(stroke);
        log::info!("Stroke added, canvas now has {} strokes", drawing.len());
    }
}
