//! Undo/redo history kept coherent under remote mutation.
//!
//! The history owns the live [`Drawing`] and the stack of strokes removed by
//! local undo. Local operations return the message to broadcast; remote
//! operations apply a message received from a peer.
//!
//! Two rules keep redo meaningful:
//! - any append, local or remote, clears the removed stack;
//! - strokes popped by a remote undo are not locally redoable.

use crate::drawing::Drawing;
use crate::message::GroupDrawMessage;
use crate::stroke::Stroke;

/// Owner of the shared drawing and the local redo stack.
#[derive(Debug, Clone, Default)]
pub struct HistoryManager {
    drawing: Drawing,
    /// Strokes removed by local undo, most recent last.
    removed: Vec<Stroke>,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing drawing with an empty redo stack.
    pub fn with_drawing(drawing: Drawing) -> Self {
        Self {
            drawing,
            removed: Vec::new(),
        }
    }

    /// The live drawing.
    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    /// Strokes available to redo, most recent last.
    pub fn removed(&self) -> &[Stroke] {
        &self.removed
    }

    pub fn can_undo(&self) -> bool {
        !self.drawing.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.removed.is_empty()
    }

    // --- Local operations ---

    /// Append a stroke the local user drew.
    pub fn append_local(&mut self, stroke: Stroke) -> GroupDrawMessage {
        self.drawing.push(stroke.clone());
        self.removed.clear();
        GroupDrawMessage::draw(stroke)
    }

    /// Undo the most recent stroke. Returns `None` if there is nothing to undo.
    pub fn undo_local(&mut self) -> Option<GroupDrawMessage> {
        let stroke = self.drawing.pop()?;
        self.removed.push(stroke);
        Some(GroupDrawMessage::Undo)
    }

    /// Restore the most recently undone stroke. Returns `None` if there is
    /// nothing to redo.
    pub fn redo_local(&mut self) -> Option<GroupDrawMessage> {
        let stroke = self.removed.pop()?;
        self.drawing.push(stroke.clone());
        Some(GroupDrawMessage::draw(stroke))
    }

    /// Discard every stroke and all redo history.
    pub fn clear_local(&mut self) -> GroupDrawMessage {
        self.drawing.clear();
        self.removed.clear();
        GroupDrawMessage::Clear
    }

    // --- Remote operations ---

    /// Adopt a peer's full drawing. History starts fresh.
    pub fn apply_remote_join(&mut self, drawing: Drawing) {
        self.drawing = drawing;
        self.removed.clear();
    }

    /// Append the stroke carried by a peer's fragment.
    ///
    /// Returns `false` if the fragment does not carry exactly one stroke.
    pub fn apply_remote_draw(&mut self, fragment: Drawing) -> bool {
        let count = fragment.len();
        let Some(stroke) = fragment.into_single() else {
            log::warn!("Ignoring draw fragment with {} strokes", count);
            return false;
        };
        self.drawing.push(stroke);
        self.removed.clear();
        true
    }

    /// Pop the last stroke on a peer's behalf. The stroke is not redoable here.
    pub fn apply_remote_undo(&mut self) -> bool {
        self.drawing.pop().is_some()
    }

    /// Discard every stroke on a peer's behalf.
    pub fn apply_remote_clear(&mut self) {
        self.drawing.clear();
        self.removed.clear();
    }

    /// Apply any message received from a peer. Returns `true` if the drawing
    /// changed.
    pub fn apply_remote(&mut self, message: GroupDrawMessage) -> bool {
        match message {
            GroupDrawMessage::Join { drawing } => {
                let changed = drawing != self.drawing;
                self.apply_remote_join(drawing);
                changed
            }
            GroupDrawMessage::Draw { drawing } => self.apply_remote_draw(drawing),
            GroupDrawMessage::Undo => self.apply_remote_undo(),
            GroupDrawMessage::Clear => {
                let changed = !self.drawing.is_empty();
                self.apply_remote_clear();
                changed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;
    use kurbo::Point;

    fn stroke(n: u8) -> Stroke {
        let x = f64::from(n);
        Stroke::new(
            vec![Point::new(x, x), Point::new(x + 5.0, x + 5.0)],
            StrokeStyle::default(),
        )
    }

    #[test]
    fn test_append_broadcasts_fragment() {
        let mut history = HistoryManager::new();
        let a = stroke(1);
        let msg = history.append_local(a.clone());
        assert_eq!(msg, GroupDrawMessage::Draw { drawing: Drawing::fragment(a.clone()) });
        assert_eq!(history.drawing().strokes(), &[a]);
    }

    #[test]
    fn test_undo_then_redo_restores() {
        let mut history = HistoryManager::new();
        let (a, b) = (stroke(1), stroke(2));
        history.append_local(a.clone());
        history.append_local(b.clone());

        assert_eq!(history.undo_local(), Some(GroupDrawMessage::Undo));
        assert_eq!(history.drawing().strokes(), &[a.clone()]);
        assert_eq!(history.removed(), &[b.clone()]);

        assert_eq!(history.redo_local(), Some(GroupDrawMessage::draw(b.clone())));
        assert_eq!(history.drawing().strokes(), &[a, b]);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_redo_after_new_append_is_noop() {
        let mut history = HistoryManager::new();
        let (a, b, c) = (stroke(1), stroke(2), stroke(3));
        history.append_local(a.clone());
        history.append_local(b);
        history.undo_local();
        history.append_local(c.clone());

        assert_eq!(history.redo_local(), None);
        assert_eq!(history.drawing().strokes(), &[a, c]);
    }

    #[test]
    fn test_undo_redo_on_empty_is_noop() {
        let mut history = HistoryManager::new();
        assert_eq!(history.undo_local(), None);
        assert_eq!(history.redo_local(), None);
        assert!(!history.apply_remote_undo());
        assert!(history.drawing().is_empty());
    }

    #[test]
    fn test_clear_local_drops_redo() {
        let mut history = HistoryManager::new();
        history.append_local(stroke(1));
        history.append_local(stroke(2));
        history.undo_local();

        assert_eq!(history.clear_local(), GroupDrawMessage::Clear);
        assert!(history.drawing().is_empty());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_remote_clear_empties_any_state() {
        let mut history = HistoryManager::new();
        history.append_local(stroke(1));
        history.append_local(stroke(2));
        history.undo_local();

        history.apply_remote_clear();
        assert!(history.drawing().is_empty());
        assert!(history.removed().is_empty());
    }

    #[test]
    fn test_remote_join_starts_fresh_history() {
        let mut history = HistoryManager::new();
        history.append_local(stroke(9));
        history.undo_local();
        assert!(history.can_redo());

        let joined: Drawing = vec![stroke(1), stroke(2), stroke(3)].into();
        history.apply_remote_join(joined.clone());
        assert_eq!(history.drawing(), &joined);
        assert!(!history.can_redo());

        history.undo_local();
        assert_eq!(history.drawing().len(), 2);
        history.undo_local();
        assert_eq!(history.drawing().strokes(), &[joined.strokes()[0].clone()]);

        // Only the two local undos are redoable.
        assert_eq!(history.removed().len(), 2);
    }

    #[test]
    fn test_remote_undo_is_not_redoable() {
        let mut history = HistoryManager::new();
        let (a, b, c) = (stroke(1), stroke(2), stroke(3));
        history.append_local(a.clone());
        history.append_local(b.clone());
        history.append_local(c.clone());
        history.undo_local();
        let removed_before = history.removed().to_vec();

        assert!(history.apply_remote_undo());
        assert_eq!(history.drawing().strokes(), &[a]);
        assert_eq!(history.removed(), removed_before.as_slice());
    }

    #[test]
    fn test_remote_draw_clears_redo() {
        let mut history = HistoryManager::new();
        history.append_local(stroke(1));
        history.undo_local();

        assert!(history.apply_remote_draw(Drawing::fragment(stroke(2))));
        assert!(!history.can_redo());
        assert_eq!(history.drawing().len(), 1);
    }

    #[test]
    fn test_remote_draw_rejects_bad_fragments() {
        let mut history = HistoryManager::new();
        history.append_local(stroke(1));
        history.undo_local();

        assert!(!history.apply_remote_draw(Drawing::new()));
        assert!(!history.apply_remote_draw(vec![stroke(2), stroke(3)].into()));
        assert!(history.drawing().is_empty());
        // A rejected fragment leaves redo intact.
        assert!(history.can_redo());
    }

    #[test]
    fn test_apply_remote_dispatch() {
        let mut history = HistoryManager::new();
        let a = stroke(1);
        assert!(history.apply_remote(GroupDrawMessage::draw(a.clone())));
        assert!(!history.apply_remote(GroupDrawMessage::Join {
            drawing: Drawing::fragment(a),
        }));
        assert!(history.apply_remote(GroupDrawMessage::Undo));
        assert!(!history.apply_remote(GroupDrawMessage::Clear));
    }
}
