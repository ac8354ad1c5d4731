use eframe::egui;
use std::collections::VecDeque;

use crate::io::ImageBuffer;

// ============================================================================
// MASK HISTORY - full-canvas snapshots, one per completed stroke
// ============================================================================

/// Ordered stack of encoded mask snapshots.
///
/// Append-only while drawing; shrinks only through `pop` (undo) or `clear`.
/// The last entry is the current mask.  When `max_steps` is exceeded the
/// oldest snapshot becomes the `floor`: it is no longer undoable, but undo
/// stops there instead of dropping the strokes it contains.
#[derive(Debug, Clone)]
pub struct MaskHistory {
    snapshots: VecDeque<ImageBuffer>,
    floor: Option<ImageBuffer>,
    max_steps: usize,
}

impl Default for MaskHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl MaskHistory {
    pub fn new(max_steps: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            floor: None,
            max_steps: max_steps.max(1),
        }
    }

    pub fn push(&mut self, snapshot: ImageBuffer) {
        self.snapshots.push_back(snapshot);
        self.enforce_cap();
    }

    /// Removes the current snapshot and returns the new current one.
    pub fn pop(&mut self) -> Option<&ImageBuffer> {
        self.snapshots.pop_back();
        self.last()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.floor = None;
    }

    /// Current mask: the newest snapshot, else the floor.
    pub fn last(&self) -> Option<&ImageBuffer> {
        self.snapshots.back().or(self.floor.as_ref())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn set_max_steps(&mut self, max_steps: usize) {
        self.max_steps = max_steps.max(1);
        self.enforce_cap();
    }

    /// Snapshot undo bottoms out at, once older steps were folded away.
    pub fn floor(&self) -> Option<&ImageBuffer> {
        self.floor.as_ref()
    }

    /// Total encoded bytes held.
    pub fn memory_size(&self) -> usize {
        self.snapshots.iter().chain(self.floor.iter()).map(ImageBuffer::len).sum()
    }

    fn enforce_cap(&mut self) {
        while self.snapshots.len() > self.max_steps {
            self.floor = self.snapshots.pop_front();
        }
    }
}

// ============================================================================
// HISTORY PANEL
// ============================================================================

/// Action requested from the history panel this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Clear,
}

#[derive(Default)]
pub struct HistoryPanel;

impl HistoryPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, history: &MaskHistory) -> Option<HistoryAction> {
        let mut action = None;

        ui.horizontal(|ui| {
            ui.strong("Mask History");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .add_enabled(!history.is_empty(), egui::Button::new("Clear"))
                    .clicked()
                {
                    action = Some(HistoryAction::Clear);
                }
                if ui
                    .add_enabled(!history.is_empty(), egui::Button::new("Undo"))
                    .clicked()
                {
                    action = Some(HistoryAction::Undo);
                }
            });
        });

        if history.is_empty() {
            ui.weak("No strokes yet");
            return action;
        }

        egui::ScrollArea::vertical()
            .max_height(120.0)
            .show(ui, |ui| {
                for i in (0..history.len()).rev() {
                    let is_current = i + 1 == history.len();
                    let label = format!("Stroke {}", i + 1);
                    if is_current {
                        ui.strong(label);
                    } else {
                        ui.label(label);
                    }
                }
            });
        ui.weak(format!("{} KB", history.memory_size() / 1024));

        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tag: u8) -> ImageBuffer {
        ImageBuffer::new(vec![tag], "image/png")
    }

    #[test]
    fn pop_returns_new_current() {
        let mut h = MaskHistory::new(10);
        h.push(snap(1));
        h.push(snap(2));
        assert_eq!(h.pop().map(|s| s.data()[0]), Some(1));
        assert_eq!(h.pop(), None);
        assert_eq!(h.pop(), None);
        assert!(h.is_empty());
    }

    #[test]
    fn undo_never_grows() {
        let mut h = MaskHistory::new(10);
        for i in 0..5 {
            h.push(snap(i));
        }
        let mut prev = h.len();
        for _ in 0..8 {
            h.pop();
            assert!(h.len() <= prev);
            prev = h.len();
        }
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn cap_folds_oldest_into_floor() {
        let mut h = MaskHistory::new(3);
        for i in 0..5 {
            h.push(snap(i));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.floor().map(|s| s.data()[0]), Some(1));
        assert_eq!(h.last().map(|s| s.data()[0]), Some(4));

        // Undo stops at the floor instead of falling through to blank.
        assert_eq!(h.pop().map(|s| s.data()[0]), Some(3));
        assert_eq!(h.pop().map(|s| s.data()[0]), Some(2));
        assert_eq!(h.pop().map(|s| s.data()[0]), Some(1));
        assert!(h.is_empty());
        assert_eq!(h.pop().map(|s| s.data()[0]), Some(1));
    }

    #[test]
    fn lowering_cap_keeps_current_mask() {
        let mut h = MaskHistory::new(10);
        for i in 0..4 {
            h.push(snap(i));
        }
        h.set_max_steps(1);
        assert_eq!(h.len(), 1);
        assert_eq!(h.last().map(|s| s.data()[0]), Some(3));
        assert_eq!(h.pop().map(|s| s.data()[0]), Some(2));
    }

    #[test]
    fn clear_empties() {
        let mut h = MaskHistory::default();
        h.push(snap(1));
        h.set_max_steps(1);
        h.push(snap(2));
        h.clear();
        assert!(h.is_empty());
        assert!(h.last().is_none());
        assert_eq!(h.memory_size(), 0);
    }
}
