//! Boundary to the drawing surface.
//!
//! The canvas renders a projection of the session drawing. The coordinator
//! replaces or extends that projection after every change, and learns about
//! new user strokes only through [`CanvasEvent::StrokeCompleted`]. Calls to
//! [`CanvasBridge::set_drawing`] and [`CanvasBridge::append_stroke`] must
//! not raise that notification.

use crate::drawing::Drawing;
use crate::stroke::Stroke;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Notifications raised by the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// The user finished drawing this stroke; it is already on the canvas.
    StrokeCompleted(Stroke),
}

/// Receiving end of canvas notifications. There is exactly one subscriber.
pub type CanvasEvents = mpsc::UnboundedReceiver<CanvasEvent>;

/// Sending end of canvas notifications, held by the canvas implementation.
#[derive(Debug, Clone)]
pub struct CanvasNotifier {
    tx: mpsc::UnboundedSender<CanvasEvent>,
}

impl CanvasNotifier {
    /// Create the notifier and its single subscription.
    pub fn channel() -> (Self, CanvasEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Announce a completed stroke. Returns `false` once nobody listens.
    pub fn stroke_completed(&self, stroke: Stroke) -> bool {
        self.tx.send(CanvasEvent::StrokeCompleted(stroke)).is_ok()
    }
}

/// Operations the coordinator needs from a drawing surface.
pub trait CanvasBridge: Send + 'static {
    /// Everything currently on the canvas.
    fn current_drawing(&self) -> Drawing;

    /// Replace the canvas contents.
    fn set_drawing(&mut self, drawing: Drawing);

    /// Add one stroke on top.
    fn append_stroke(&mut self, stroke: Stroke);
}

/// A canvas with no rendering, shareable across tasks.
///
/// Clones share the same drawing, so one clone can be handed to the
/// coordinator while another plays the user.
#[derive(Debug, Clone)]
pub struct MemoryCanvas {
    drawing: Arc<Mutex<Drawing>>,
    notifier: CanvasNotifier,
}

impl MemoryCanvas {
    /// Create an empty canvas and its notification stream.
    pub fn new() -> (Self, CanvasEvents) {
        let (notifier, events) = CanvasNotifier::channel();
        let canvas = Self {
            drawing: Arc::new(Mutex::new(Drawing::new())),
            notifier,
        };
        (canvas, events)
    }

    fn lock(&self) -> MutexGuard<'_, Drawing> {
        self.drawing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the user finishing a stroke.
    pub fn user_draw(&self, stroke: Stroke) {
        self.lock().push(stroke.clone());
        self.notifier.stroke_completed(stroke);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl CanvasBridge for MemoryCanvas {
    fn current_drawing(&self) -> Drawing {
        self.lock().clone()
    }

    fn set_drawing(&mut self, drawing: Drawing) {
        *self.lock() = drawing;
    }

    fn append_stroke(&mut self, stroke: Stroke) {
        self.lock().push(stroke);
    }
}
