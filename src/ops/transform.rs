// ============================================================================
// VIEW TRANSFORM — display-only rotate / flip of the shown image
// ============================================================================
//
// Nothing here touches pixels.  The transform only changes where the four
// corners of the displayed texture land on screen, and maps pointer
// positions back into image space so the mask lines up under rotation.

use eframe::egui::{self, Color32, Mesh, Pos2, Rect, TextureId, Vec2, pos2, vec2};

/// Rotation in degrees (always a multiple of 90, unbounded) plus a
/// horizontal mirror.  Equivalent to CSS `rotate(r) scaleX(±1)`: the mirror
/// is applied first, then the rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewTransform {
    pub rotation_degrees: i32,
    pub flipped_horizontally: bool,
}

impl ViewTransform {
    pub fn rotate_left(&mut self) {
        self.rotation_degrees -= 90;
    }

    pub fn rotate_right(&mut self) {
        self.rotation_degrees += 90;
    }

    pub fn flip_horizontal(&mut self) {
        self.flipped_horizontally = !self.flipped_horizontally;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_identity(&self) -> bool {
        self.quarter_turns() == 0 && !self.flipped_horizontally
    }

    /// Clockwise quarter turns in `0..4`.
    pub fn quarter_turns(&self) -> u8 {
        (self.rotation_degrees.rem_euclid(360) / 90) as u8
    }

    /// True when the rotated bounds are the image size with W and H swapped.
    pub fn swaps_axes(&self) -> bool {
        self.quarter_turns() % 2 == 1
    }

    /// Image-local offset (from the image center, y down) → screen offset.
    pub fn map_to_display(&self, local: Vec2) -> Vec2 {
        let mirrored = if self.flipped_horizontally {
            vec2(-local.x, local.y)
        } else {
            local
        };
        rotate_quarters(mirrored, self.quarter_turns())
    }

    /// Inverse of [`Self::map_to_display`].
    pub fn map_to_image(&self, display: Vec2) -> Vec2 {
        let v = rotate_quarters(display, (4 - self.quarter_turns()) % 4);
        if self.flipped_horizontally {
            vec2(-v.x, v.y)
        } else {
            v
        }
    }

    /// Unrotated draw size so that the rotated bounds fit inside `available`
    /// ("contain" fit).
    pub fn fitted_size(&self, image: Vec2, available: Vec2) -> Vec2 {
        if image.x <= 0.0 || image.y <= 0.0 {
            return Vec2::ZERO;
        }
        let bounds = self.rotated_bounds(image);
        let scale = (available.x / bounds.x).min(available.y / bounds.y).max(0.0);
        image * scale
    }

    /// Size of the on-screen bounding box of an image drawn at `drawn`.
    pub fn rotated_bounds(&self, drawn: Vec2) -> Vec2 {
        if self.swaps_axes() {
            vec2(drawn.y, drawn.x)
        } else {
            drawn
        }
    }

    /// Screen rect covered by an image of `drawn` size centered on `center`.
    pub fn display_rect(&self, center: Pos2, drawn: Vec2) -> Rect {
        Rect::from_center_size(center, self.rotated_bounds(drawn))
    }

    /// Screen position → image pixel coordinates (may fall outside the image).
    pub fn screen_to_image(&self, screen: Pos2, center: Pos2, drawn: Vec2, image_px: Vec2) -> (f32, f32) {
        if drawn.x <= 0.0 || drawn.y <= 0.0 {
            return (0.0, 0.0);
        }
        let local = self.map_to_image(screen - center);
        (
            (local.x + drawn.x / 2.0) / drawn.x * image_px.x,
            (local.y + drawn.y / 2.0) / drawn.y * image_px.y,
        )
    }

    /// Textured quad for painting an image with this transform.
    pub fn mesh(&self, texture: TextureId, center: Pos2, drawn: Vec2, tint: Color32) -> Mesh {
        let (hw, hh) = (drawn.x / 2.0, drawn.y / 2.0);
        let corners = [
            (vec2(-hw, -hh), pos2(0.0, 0.0)),
            (vec2(hw, -hh), pos2(1.0, 0.0)),
            (vec2(hw, hh), pos2(1.0, 1.0)),
            (vec2(-hw, hh), pos2(0.0, 1.0)),
        ];
        let mut mesh = Mesh::with_texture(texture);
        for (local, uv) in corners {
            mesh.vertices.push(egui::epaint::Vertex {
                pos: center + self.map_to_display(local),
                uv,
                color: tint,
            });
        }
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(0, 2, 3);
        mesh
    }
}

/// Exact clockwise rotation by `turns` quarter turns in screen space (y down).
fn rotate_quarters(v: Vec2, turns: u8) -> Vec2 {
    match turns % 4 {
        0 => v,
        1 => vec2(-v.y, v.x),
        2 => vec2(-v.x, -v.y),
        _ => vec2(v.y, -v.x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_accumulates_without_wrap() {
        let mut t = ViewTransform::default();
        for _ in 0..5 {
            t.rotate_right();
        }
        assert_eq!(t.rotation_degrees, 450);
        assert_eq!(t.quarter_turns(), 1);
        t.rotate_left();
        t.rotate_left();
        assert_eq!(t.rotation_degrees, 270);

        let mut l = ViewTransform::default();
        l.rotate_left();
        assert_eq!(l.rotation_degrees, -90);
        assert_eq!(l.quarter_turns(), 3);
        assert!(l.swaps_axes());
    }

    #[test]
    fn flip_toggles_and_reset_restores_identity() {
        let mut t = ViewTransform::default();
        t.flip_horizontal();
        assert!(t.flipped_horizontally);
        t.flip_horizontal();
        assert!(!t.flipped_horizontally);
        t.flip_horizontal();
        t.rotate_right();
        t.reset();
        assert_eq!(t, ViewTransform::default());
        assert!(t.is_identity());
    }

    #[test]
    fn full_turn_is_identity() {
        let t = ViewTransform {
            rotation_degrees: -720,
            flipped_horizontally: false,
        };
        assert!(t.is_identity());
    }

    #[test]
    fn quarter_turn_moves_top_left_to_top_right() {
        let t = ViewTransform {
            rotation_degrees: 90,
            flipped_horizontally: false,
        };
        // 200x100 image: top-left corner ends at the top-right of the 100x200 bounds.
        assert_eq!(t.map_to_display(vec2(-100.0, -50.0)), vec2(50.0, -100.0));
    }

    #[test]
    fn display_and_image_maps_are_inverse() {
        let p = vec2(13.0, -7.0);
        for deg in [-270, -90, 0, 90, 180, 630] {
            for flip in [false, true] {
                let t = ViewTransform {
                    rotation_degrees: deg,
                    flipped_horizontally: flip,
                };
                assert_eq!(t.map_to_image(t.map_to_display(p)), p, "deg={deg} flip={flip}");
            }
        }
    }

    #[test]
    fn fitted_size_accounts_for_swap() {
        let mut t = ViewTransform::default();
        let drawn = t.fitted_size(vec2(400.0, 200.0), vec2(200.0, 400.0));
        assert_eq!(drawn, vec2(200.0, 100.0));
        t.rotate_right();
        let drawn = t.fitted_size(vec2(400.0, 200.0), vec2(200.0, 400.0));
        assert_eq!(drawn, vec2(400.0, 200.0));
        assert_eq!(t.rotated_bounds(drawn), vec2(200.0, 400.0));
    }

    #[test]
    fn screen_to_image_under_flip() {
        let t = ViewTransform {
            rotation_degrees: 0,
            flipped_horizontally: true,
        };
        let center = pos2(100.0, 100.0);
        // Left edge of a mirrored image shows the image's right edge.
        let (x, y) = t.screen_to_image(pos2(50.0, 100.0), center, vec2(100.0, 50.0), vec2(1000.0, 500.0));
        assert_eq!((x, y), (1000.0, 250.0));
    }
}
