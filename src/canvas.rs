// ============================================================================
// MASK CANVAS — freehand brush overlay with snapshot undo
// ============================================================================
//
// The raster is bound 1:1 to the displayed image's natural pixel size.  The
// engine never touches the image itself; it only paints an additive overlay
// and hands out the current mask as an encoded PNG.

use image::{GrayImage, Luma, Rgba, RgbaImage};

use crate::components::history::MaskHistory;
use crate::io::{ImageBuffer, IoError};

/// Brush configuration captured when a stroke begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushConfig {
    /// Diameter in image pixels.
    pub size: f32,
    pub color: Rgba<u8>,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            size: 30.0,
            color: Rgba([255, 0, 0, 255]),
        }
    }
}

/// State of the stroke currently being drawn.
struct ActiveStroke {
    brush: BrushConfig,
    /// Raster as it was before the stroke started.
    base: RgbaImage,
    /// Per-pixel coverage reached so far (max over all segments), so
    /// overlapping segments of one stroke never blend twice.
    coverage: GrayImage,
    last: (f32, f32),
    touched: bool,
}

pub struct MaskCanvas {
    raster: RgbaImage,
    history: MaskHistory,
    stroke: Option<ActiveStroke>,
    enabled: bool,
    /// Bumped on every raster change so the UI knows when to re-upload.
    generation: u64,
}

impl Default for MaskCanvas {
    fn default() -> Self {
        Self::new(50)
    }
}

impl MaskCanvas {
    pub fn new(max_steps: usize) -> Self {
        Self {
            raster: RgbaImage::new(0, 0),
            history: MaskHistory::new(max_steps),
            stroke: None,
            enabled: false,
            generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    pub fn history(&self) -> &MaskHistory {
        &self.history
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn set_max_steps(&mut self, max_steps: usize) {
        self.history.set_max_steps(max_steps);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// The mask the orchestrator should submit: the last snapshot, if any.
    pub fn current_mask(&self) -> Option<&ImageBuffer> {
        self.history.last()
    }

    /// True when no pixel of the surface carries any paint.
    pub fn is_blank(&self) -> bool {
        self.raster.pixels().all(|p| p[3] == 0)
    }

    /// Enable or disable painting. Disabling mid-stroke commits what was drawn.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled && self.stroke.is_some() {
            self.end_stroke();
        }
        self.enabled = enabled;
    }

    /// Reallocate the surface. Content is lost; history is kept so callers
    /// can `resync_from_history` if they need the pixels back.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.raster = RgbaImage::new(width, height);
        self.stroke = None;
        self.generation += 1;
    }

    /// Repaint the surface from the current snapshot. Returns false when there
    /// is nothing to restore or the snapshot no longer matches the surface size.
    pub fn resync_from_history(&mut self) -> bool {
        let Some(snapshot) = self.history.last() else {
            return false;
        };
        match snapshot.decode() {
            Ok(img) if img.dimensions() == self.raster.dimensions() => {
                self.raster = img;
                self.stroke = None;
                self.generation += 1;
                true
            }
            Ok(img) => {
                log_warn!(
                    "Mask snapshot is {}x{} but surface is {}x{}; not restored",
                    img.width(),
                    img.height(),
                    self.raster.width(),
                    self.raster.height()
                );
                false
            }
            Err(e) => {
                log_err!("Mask snapshot could not be decoded: {}", e);
                false
            }
        }
    }

    /// Replace the surface with an externally supplied mask and record it as
    /// one history step. A mask of another size is scaled to the surface.
    pub fn load_mask(&mut self, mask: ImageBuffer) -> Result<(), IoError> {
        let (w, h) = self.raster.dimensions();
        if w == 0 || h == 0 {
            log_warn!("Mask ignored: no surface to load it onto");
            return Ok(());
        }
        let img = mask.decode()?;
        let (img, snapshot) = if img.dimensions() == (w, h) && mask.is_png() {
            (img, mask)
        } else {
            let scaled = image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle);
            let snapshot = ImageBuffer::encode_png(&scaled)?;
            (scaled, snapshot)
        };
        self.stroke = None;
        self.raster = img;
        self.history.push(snapshot);
        self.generation += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Strokes
    // ------------------------------------------------------------------

    /// Start a stroke and stamp its first point (a tap leaves a dot).
    /// Returns false when painting is disabled or the surface has no size.
    pub fn begin_stroke(&mut self, point: (f32, f32), brush: BrushConfig) -> bool {
        if !self.enabled || self.raster.width() == 0 || self.raster.height() == 0 {
            return false;
        }
        if self.stroke.is_some() {
            // Unpaired begin: close the previous stroke first.
            self.end_stroke();
        }
        let (w, h) = self.raster.dimensions();
        let mut stroke = ActiveStroke {
            brush,
            base: self.raster.clone(),
            coverage: GrayImage::new(w, h),
            last: point,
            touched: false,
        };
        paint_segment(&mut stroke, &mut self.raster, point, point);
        self.stroke = Some(stroke);
        self.generation += 1;
        true
    }

    /// Extend the active stroke with a segment to `point`. No-op without an
    /// active stroke or when the pointer has not moved.
    pub fn extend_stroke(&mut self, point: (f32, f32)) {
        let Some(stroke) = self.stroke.as_mut() else {
            return;
        };
        if stroke.last == point {
            return;
        }
        let from = stroke.last;
        paint_segment(stroke, &mut self.raster, from, point);
        stroke.last = point;
        self.generation += 1;
    }

    /// Finish the active stroke. When it painted anything, the whole surface
    /// is snapshotted and becomes the new current mask, which is returned.
    pub fn end_stroke(&mut self) -> Option<&ImageBuffer> {
        let stroke = self.stroke.take()?;
        if !stroke.touched {
            return None;
        }
        match ImageBuffer::encode_png(&self.raster) {
            Ok(snapshot) => {
                self.history.push(snapshot);
                self.history.last()
            }
            Err(e) => {
                log_err!("Mask snapshot failed, stroke discarded: {}", e);
                self.raster = stroke.base;
                self.generation += 1;
                None
            }
        }
    }

    /// Drop the last snapshot and repaint from the one before it. A stroke
    /// still in progress is cancelled instead. Returns the new current mask.
    pub fn undo(&mut self) -> Option<&ImageBuffer> {
        if let Some(stroke) = self.stroke.take() {
            self.raster = stroke.base;
            self.generation += 1;
            return self.history.last();
        }
        if self.history.is_empty() {
            // Nothing undoable; the floor (if any) stays on screen.
            return self.history.last();
        }
        self.history.pop();
        let (w, h) = self.raster.dimensions();
        self.raster = match self.history.last().map(ImageBuffer::decode) {
            Some(Ok(img)) if img.dimensions() == (w, h) => img,
            Some(Ok(_)) => {
                log_warn!("Mask snapshot size differs from surface; showing blank mask");
                RgbaImage::new(w, h)
            }
            Some(Err(e)) => {
                log_err!("Mask snapshot could not be decoded: {}", e);
                RgbaImage::new(w, h)
            }
            None => RgbaImage::new(w, h),
        };
        self.generation += 1;
        self.history.last()
    }

    /// Empty the history and the surface.
    pub fn clear(&mut self) {
        let (w, h) = self.raster.dimensions();
        self.history.clear();
        self.stroke = None;
        self.raster = RgbaImage::new(w, h);
        self.generation += 1;
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Paint a round-capped segment of the stroke's brush into `raster`.
/// A zero-length segment paints a disc.
fn paint_segment(stroke: &mut ActiveStroke, raster: &mut RgbaImage, a: (f32, f32), b: (f32, f32)) {
    let (width, height) = raster.dimensions();
    let radius = (stroke.brush.size / 2.0).max(0.5);

    // Bounding box of the capsule plus one pixel for the AA fringe.
    let pad = radius + 1.0;
    let min_x = (a.0.min(b.0) - pad).floor().max(0.0) as u32;
    let min_y = (a.1.min(b.1) - pad).floor().max(0.0) as u32;
    let max_x = (a.0.max(b.0) + pad).ceil();
    let max_y = (a.1.max(b.1) + pad).ceil();
    if max_x < 0.0 || max_y < 0.0 {
        return;
    }
    let max_x = (max_x as u32).min(width);
    let max_y = (max_y as u32).min(height);

    let color = stroke.brush.color;
    for y in min_y..max_y {
        for x in min_x..max_x {
            let center = (x as f32 + 0.5, y as f32 + 0.5);
            let dist = distance_to_segment(center, a, b);
            let cov = (radius + 0.5 - dist).clamp(0.0, 1.0);
            let cov8 = (cov * 255.0).round() as u8;
            if cov8 == 0 || cov8 <= stroke.coverage.get_pixel(x, y)[0] {
                continue;
            }
            stroke.coverage.put_pixel(x, y, Luma([cov8]));
            let under = *stroke.base.get_pixel(x, y);
            raster.put_pixel(x, y, blend_over(under, color, cov8));
            stroke.touched = true;
        }
    }
}

fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq < f32::EPSILON {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Source-over of `src` (scaled by `coverage`) onto `dst`, unpremultiplied.
fn blend_over(dst: Rgba<u8>, src: Rgba<u8>, coverage: u8) -> Rgba<u8> {
    let sa = (src[3] as f32 / 255.0) * (coverage as f32 / 255.0);
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: u32, h: u32) -> MaskCanvas {
        let mut c = MaskCanvas::new(50);
        c.resize(w, h);
        c.set_enabled(true);
        c
    }

    fn brush(size: f32) -> BrushConfig {
        BrushConfig {
            size,
            color: Rgba([255, 0, 0, 255]),
        }
    }

    #[test]
    fn tap_paints_a_dot() {
        let mut c = canvas(40, 40);
        assert!(c.begin_stroke((20.0, 20.0), brush(10.0)));
        assert!(c.end_stroke().is_some());
        assert_eq!(c.history_len(), 1);
        assert_eq!(*c.raster().get_pixel(20, 20), Rgba([255, 0, 0, 255]));
        assert_eq!(c.raster().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn segment_has_no_gap() {
        let mut c = canvas(100, 20);
        c.begin_stroke((5.0, 10.0), brush(4.0));
        c.extend_stroke((95.0, 10.0));
        c.end_stroke();
        for x in 5..95 {
            assert_eq!(c.raster().get_pixel(x, 10)[3], 255, "gap at x={x}");
        }
    }

    #[test]
    fn n_strokes_then_n_undos_is_blank() {
        let mut c = canvas(64, 64);
        for i in 0..4 {
            let y = 8.0 + i as f32 * 12.0;
            c.begin_stroke((4.0, y), brush(6.0));
            c.extend_stroke((60.0, y));
            c.end_stroke();
        }
        assert_eq!(c.history_len(), 4);
        for _ in 0..4 {
            c.undo();
        }
        assert!(c.current_mask().is_none());
        assert!(c.is_blank());
        assert_eq!(c.history_len(), 0);
    }

    #[test]
    fn undo_replays_previous_snapshot_exactly() {
        let mut c = canvas(32, 32);
        c.begin_stroke((5.0, 5.0), brush(6.0));
        c.extend_stroke((25.0, 25.0));
        c.end_stroke();
        let after_first = c.raster().clone();

        c.begin_stroke((25.0, 5.0), brush(6.0));
        c.extend_stroke((5.0, 25.0));
        c.end_stroke();
        assert_ne!(c.raster(), &after_first);

        let current = c.undo().cloned();
        assert!(current.is_some());
        assert_eq!(c.raster(), &after_first);
    }

    #[test]
    fn undo_on_empty_history_is_noop() {
        let mut c = canvas(8, 8);
        assert!(c.undo().is_none());
        assert_eq!(c.history_len(), 0);
    }

    #[test]
    fn clear_empties_history_and_surface() {
        let mut c = canvas(16, 16);
        c.begin_stroke((8.0, 8.0), brush(4.0));
        c.end_stroke();
        c.clear();
        assert_eq!(c.history_len(), 0);
        assert!(c.current_mask().is_none());
        assert!(c.is_blank());
        assert_eq!(c.raster().dimensions(), (16, 16));
    }

    #[test]
    fn disabled_canvas_ignores_strokes() {
        let mut c = canvas(16, 16);
        c.set_enabled(false);
        assert!(!c.begin_stroke((8.0, 8.0), brush(4.0)));
        c.extend_stroke((10.0, 10.0));
        assert!(c.end_stroke().is_none());
        assert_eq!(c.history_len(), 0);
        assert!(c.is_blank());
    }

    #[test]
    fn stray_end_and_move_are_noops() {
        let mut c = canvas(16, 16);
        c.extend_stroke((3.0, 3.0));
        assert!(c.end_stroke().is_none());
        assert!(c.is_blank());
        assert_eq!(c.history_len(), 0);
    }

    #[test]
    fn repeated_move_is_idempotent() {
        let mut c = canvas(32, 32);
        c.begin_stroke((4.0, 4.0), brush(4.0));
        c.extend_stroke((20.0, 4.0));
        let once = c.raster().clone();
        c.extend_stroke((20.0, 4.0));
        c.extend_stroke((20.0, 4.0));
        assert_eq!(c.raster(), &once);
    }

    #[test]
    fn translucent_stroke_does_not_double_blend() {
        let mut c = canvas(40, 10);
        let b = BrushConfig {
            size: 6.0,
            color: Rgba([0, 0, 255, 128]),
        };
        c.begin_stroke((5.0, 5.0), b);
        c.extend_stroke((20.0, 5.0));
        c.extend_stroke((5.0, 5.0));
        c.end_stroke();
        assert_eq!(c.raster().get_pixel(10, 5)[3], 128);
    }

    #[test]
    fn stroke_outside_surface_is_not_snapshotted() {
        let mut c = canvas(10, 10);
        c.begin_stroke((-100.0, -100.0), brush(4.0));
        c.extend_stroke((-50.0, -80.0));
        assert!(c.end_stroke().is_none());
        assert_eq!(c.history_len(), 0);
    }

    #[test]
    fn resize_clears_surface_but_keeps_history() {
        let mut c = canvas(20, 20);
        c.begin_stroke((10.0, 10.0), brush(6.0));
        c.end_stroke();
        let painted = c.raster().clone();

        c.resize(20, 20);
        assert!(c.is_blank());
        assert_eq!(c.history_len(), 1);
        assert!(c.resync_from_history());
        assert_eq!(c.raster(), &painted);

        c.resize(30, 30);
        assert!(!c.resync_from_history());
        assert!(c.is_blank());
    }

    #[test]
    fn disabling_mid_stroke_commits() {
        let mut c = canvas(20, 20);
        c.begin_stroke((10.0, 10.0), brush(6.0));
        c.set_enabled(false);
        assert!(!c.is_stroking());
        assert_eq!(c.history_len(), 1);
    }

    #[test]
    fn undo_past_cap_keeps_older_strokes() {
        let mut c = MaskCanvas::new(2);
        c.resize(30, 30);
        c.set_enabled(true);
        c.begin_stroke((5.0, 5.0), brush(4.0));
        c.end_stroke();
        let after_first = c.raster().clone();
        for y in [15.0, 25.0] {
            c.begin_stroke((5.0, y), brush(4.0));
            c.extend_stroke((25.0, y));
            c.end_stroke();
        }
        assert_eq!(c.history_len(), 2);

        c.undo();
        c.undo();
        assert_eq!(c.raster(), &after_first);
        assert!(c.current_mask().is_some());

        // Further undo is a no-op at the floor.
        assert!(c.undo().is_some());
        assert_eq!(c.raster(), &after_first);

        c.clear();
        assert!(c.is_blank());
        assert!(c.current_mask().is_none());
    }

    #[test]
    fn loaded_mask_is_scaled_and_undoable() {
        let mut c = canvas(10, 10);
        let mask = ImageBuffer::encode_png(&RgbaImage::from_pixel(20, 20, Rgba([0, 255, 0, 255]))).unwrap();
        c.load_mask(mask).unwrap();
        assert_eq!(c.history_len(), 1);
        assert_eq!(c.current_mask().unwrap().dimensions().unwrap(), (10, 10));
        let px = c.raster().get_pixel(5, 5);
        assert!(px[1] >= 250 && px[3] >= 250);
        assert!(c.undo().is_none());
        assert!(c.is_blank());
    }
}
