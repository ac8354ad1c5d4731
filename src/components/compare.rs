use eframe::egui::{self, Align2, Color32, FontId, Pos2, Rect, Sense, Shape, Stroke, TextureId, Vec2, pos2, vec2};

use crate::ops::transform::ViewTransform;

// ============================================================================
// COMPARE SLIDER - before/after with a draggable vertical divider
// ============================================================================

/// Divider position a fresh comparison starts at.
pub const DEFAULT_DIVIDER_PERCENT: f32 = 50.0;

/// Width of the grab area around the divider line, in points.
const HANDLE_HIT_WIDTH: f32 = 16.0;

/// One side of the comparison: a texture and its natural pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareLayer {
    pub texture: TextureId,
    pub size: Vec2,
}

/// On-screen size of `layer` inside `container`, contain-fitted under `transform`.
pub fn fitted_layer_size(layer: &CompareLayer, container: Rect, transform: &ViewTransform) -> Vec2 {
    transform.fitted_size(layer.size, container.size())
}

/// Before/after comparison state.
///
/// Both images share one container; each is contain-fitted into it on its
/// own, so images of different aspect ratios are never stretched.  The
/// "after" image is the base layer; the "before" image is drawn on top and
/// clipped to the leftmost `percent` of the container.  0 shows only
/// "after", 100 shows only "before".
#[derive(Debug, Clone, PartialEq)]
pub struct CompareSlider {
    active: bool,
    percent: f32,
    dragging: bool,
}

impl Default for CompareSlider {
    fn default() -> Self {
        Self {
            active: false,
            percent: DEFAULT_DIVIDER_PERCENT,
            dragging: false,
        }
    }
}

impl CompareSlider {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn divider_percent(&self) -> f32 {
        self.percent
    }

    /// Comparison needs both the original upload and a generated image.
    pub fn can_activate(has_source: bool, has_result_image: bool) -> bool {
        has_source && has_result_image
    }

    /// Enter or leave compare mode. Entering is refused unless both images
    /// exist. Returns the new state.
    pub fn toggle(&mut self, has_source: bool, has_result_image: bool) -> bool {
        if self.active {
            self.active = false;
            self.dragging = false;
        } else if Self::can_activate(has_source, has_result_image) {
            self.active = true;
        }
        self.active
    }

    /// Leave compare mode and put the divider back in the middle.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_divider_percent(&mut self, percent: f32) {
        self.percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
    }

    /// Divider percent for a pointer at `pointer_x` over a container spanning
    /// `left..left + width`. `None` for a degenerate container.
    pub fn percent_from_pointer(pointer_x: f32, left: f32, width: f32) -> Option<f32> {
        if width <= 0.0 || !width.is_finite() {
            return None;
        }
        let x = (pointer_x - left).clamp(0.0, width);
        Some(100.0 * x / width)
    }

    pub fn begin_drag(&mut self) {
        if self.active {
            self.dragging = true;
        }
    }

    /// Track a pointer move. Ignored unless a drag is engaged.
    pub fn drag_to(&mut self, pointer_x: f32, container: Rect) {
        if !self.dragging {
            return;
        }
        if let Some(p) = Self::percent_from_pointer(pointer_x, container.left(), container.width()) {
            self.set_divider_percent(p);
        }
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Region of the container in which the "before" layer is visible.
    pub fn before_clip_rect(&self, container: Rect) -> Rect {
        let right = container.left() + container.width() * self.percent / 100.0;
        Rect::from_min_max(container.min, pos2(right, container.max.y))
    }

    pub fn divider_x(&self, container: Rect) -> f32 {
        container.left() + container.width() * self.percent / 100.0
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Paint both layers, labels and handle inside `container`, and run the
    /// drag interaction.  Both layers are centered in the container under
    /// the same transform; each keeps its own aspect ratio.
    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        container: Rect,
        before: CompareLayer,
        after: CompareLayer,
        transform: &ViewTransform,
    ) {
        let center = container.center();
        let painter = ui.painter_at(container);
        let after_drawn = fitted_layer_size(&after, container, transform);
        let before_drawn = fitted_layer_size(&before, container, transform);
        painter.add(Shape::mesh(transform.mesh(after.texture, center, after_drawn, Color32::WHITE)));
        painter
            .with_clip_rect(self.before_clip_rect(container))
            .add(Shape::mesh(transform.mesh(before.texture, center, before_drawn, Color32::WHITE)));

        draw_label(
            &painter,
            container.left_top() + vec2(12.0, 12.0),
            Align2::LEFT_TOP,
            "BEFORE",
            Color32::from_black_alpha(140),
        );
        draw_label(
            &painter,
            container.right_top() + vec2(-12.0, 12.0),
            Align2::RIGHT_TOP,
            "AFTER",
            Color32::from_rgba_unmultiplied(249, 115, 22, 140),
        );

        // Press anywhere on the track engages the drag.
        let response = ui.interact(container, ui.id().with("compare_track"), Sense::click_and_drag());
        if response.is_pointer_button_down_on() {
            self.begin_drag();
        }

        // While engaged, follow the pointer wherever it is, not just over the track.
        if self.dragging {
            let (pos, down) = ui.ctx().input(|i| (i.pointer.interact_pos(), i.pointer.primary_down()));
            if let Some(pos) = pos {
                self.drag_to(pos.x, container);
            }
            if !down {
                self.end_drag();
            }
            ui.ctx().request_repaint();
        }

        let x = self.divider_x(container);
        let handle_rect = Rect::from_center_size(pos2(x, center.y), vec2(HANDLE_HIT_WIDTH, container.height()));
        let hovered = response
            .hover_pos()
            .is_some_and(|p: Pos2| handle_rect.contains(p));
        if hovered || self.dragging {
            ui.ctx().set_cursor_icon(egui::CursorIcon::ResizeHorizontal);
        }
        painter.line_segment(
            [pos2(x, container.top()), pos2(x, container.bottom())],
            Stroke::new(3.0, Color32::WHITE),
        );
        painter.circle(pos2(x, center.y), 12.0, Color32::WHITE, Stroke::new(3.0, Color32::from_black_alpha(30)));
        painter.text(pos2(x, center.y), Align2::CENTER_CENTER, "⇔", FontId::proportional(14.0), Color32::from_gray(24));
    }
}

fn draw_label(painter: &egui::Painter, pos: Pos2, anchor: Align2, text: &str, fill: Color32) {
    // Reserve the background slot so it ends up underneath the text.
    let bg = painter.add(Shape::Noop);
    let text_rect = painter.text(pos, anchor, text, FontId::proportional(10.0), Color32::WHITE);
    painter.set(bg, Shape::rect_filled(text_rect.expand(4.0), 4.0, fill));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Rect {
        Rect::from_min_size(pos2(100.0, 0.0), vec2(200.0, 50.0))
    }

    #[test]
    fn divider_is_clamped() {
        let mut s = CompareSlider::default();
        s.set_divider_percent(150.0);
        assert_eq!(s.divider_percent(), 100.0);
        s.set_divider_percent(-20.0);
        assert_eq!(s.divider_percent(), 0.0);
        s.set_divider_percent(f32::NAN);
        assert_eq!(s.divider_percent(), 0.0);
    }

    #[test]
    fn pointer_maps_to_percent() {
        assert_eq!(CompareSlider::percent_from_pointer(150.0, 100.0, 200.0), Some(25.0));
        assert_eq!(CompareSlider::percent_from_pointer(0.0, 100.0, 200.0), Some(0.0));
        assert_eq!(CompareSlider::percent_from_pointer(900.0, 100.0, 200.0), Some(100.0));
        assert_eq!(CompareSlider::percent_from_pointer(150.0, 100.0, 0.0), None);
    }

    #[test]
    fn moves_only_while_engaged() {
        let mut s = CompareSlider::default();
        assert!(s.toggle(true, true));
        s.drag_to(120.0, container());
        assert_eq!(s.divider_percent(), 50.0);

        s.begin_drag();
        s.drag_to(120.0, container());
        assert_eq!(s.divider_percent(), 10.0);
        // Pointer far outside the container still tracks (clamped).
        s.drag_to(-500.0, container());
        assert_eq!(s.divider_percent(), 0.0);

        s.end_drag();
        s.drag_to(300.0, container());
        assert_eq!(s.divider_percent(), 0.0);
    }

    #[test]
    fn toggle_requires_both_images() {
        let mut s = CompareSlider::default();
        assert!(!s.toggle(true, false));
        assert!(!s.toggle(false, true));
        assert!(s.toggle(true, true));
        assert!(!s.toggle(true, true));
    }

    #[test]
    fn clip_covers_left_portion() {
        let mut s = CompareSlider::default();
        s.set_divider_percent(25.0);
        let clip = s.before_clip_rect(container());
        assert_eq!(clip.min, pos2(100.0, 0.0));
        assert_eq!(clip.max, pos2(150.0, 50.0));

        s.set_divider_percent(0.0);
        assert_eq!(s.before_clip_rect(container()).width(), 0.0);
        s.set_divider_percent(100.0);
        assert_eq!(s.before_clip_rect(container()), container());
    }

    #[test]
    fn layers_keep_their_own_aspect() {
        let view = Rect::from_min_size(pos2(0.0, 0.0), vec2(400.0, 200.0));
        let before = CompareLayer {
            texture: TextureId::default(),
            size: vec2(1600.0, 900.0),
        };
        let after = CompareLayer {
            texture: TextureId::default(),
            size: vec2(1024.0, 1024.0),
        };
        let identity = ViewTransform::default();
        let b = fitted_layer_size(&before, view, &identity);
        let a = fitted_layer_size(&after, view, &identity);
        assert!((b.x / b.y - 16.0 / 9.0).abs() < 1e-3);
        assert!((a.x - a.y).abs() < 1e-3);
        assert!(b.x <= 400.0 + 1e-3 && b.y <= 200.0 + 1e-3);
        assert!((a.y - 200.0).abs() < 1e-3);
    }

    #[test]
    fn reset_restores_default() {
        let mut s = CompareSlider::default();
        s.toggle(true, true);
        s.set_divider_percent(80.0);
        s.reset();
        assert!(!s.is_active());
        assert_eq!(s.divider_percent(), DEFAULT_DIVIDER_PERCENT);
    }
}
