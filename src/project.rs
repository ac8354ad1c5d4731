use uuid::Uuid;

use crate::canvas::MaskCanvas;
use crate::components::compare::CompareSlider;
use crate::io::{ImageBuffer, ImageStore};
use crate::ops::ai::{DEFAULT_MODEL, GenerationResult};
use crate::ops::transform::ViewTransform;

/// Top-level orchestrator state. Exactly one is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppPhase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// One working session: the uploaded images, the last result, prompt inputs
/// and every piece of view state layered over the displayed image.
///
/// Phase, result and the in-flight request id only change through the
/// generation operations, so they are not public fields.
pub struct Project {
    pub id: Uuid,
    pub prompt: String,
    /// Refinement / additional instructions.
    pub refinement: String,
    pub model_id: String,
    pub transform: ViewTransform,

    pub(crate) images: ImageStore,
    pub(crate) result: Option<GenerationResult>,
    pub(crate) phase: AppPhase,
    pub(crate) error: Option<String>,
    pub(crate) in_flight: Option<Uuid>,

    mask: MaskCanvas,
    mask_mode: bool,
    compare: CompareSlider,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, 50)
    }
}

impl Project {
    pub fn new(model_id: impl Into<String>, max_mask_steps: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: String::new(),
            refinement: String::new(),
            model_id: model_id.into(),
            transform: ViewTransform::default(),
            images: ImageStore::default(),
            result: None,
            phase: AppPhase::Idle,
            error: None,
            in_flight: None,
            mask: MaskCanvas::new(max_mask_steps),
            mask_mode: false,
            compare: CompareSlider::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn result_image(&self) -> Option<&ImageBuffer> {
        self.result.as_ref().and_then(|r| r.image.as_ref())
    }

    pub fn phase(&self) -> AppPhase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn in_flight(&self) -> Option<Uuid> {
        self.in_flight
    }

    pub fn is_loading(&self) -> bool {
        self.phase == AppPhase::Loading
    }

    /// The image currently shown: the generated image when there is one,
    /// otherwise the upload.
    pub fn displayed_image(&self) -> Option<&ImageBuffer> {
        self.result_image().or(self.images.source())
    }

    pub fn mask(&self) -> &MaskCanvas {
        &self.mask
    }

    /// Painting on the mask goes through here; whether a stroke may start is
    /// decided by the canvas' enabled flag, which this type keeps in sync.
    pub fn mask_mut(&mut self) -> &mut MaskCanvas {
        &mut self.mask
    }

    pub fn mask_mode(&self) -> bool {
        self.mask_mode
    }

    pub fn compare(&self) -> &CompareSlider {
        &self.compare
    }

    pub fn compare_mut(&mut self) -> &mut CompareSlider {
        &mut self.compare
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Replace the upload. The displayed image changes, so view state resets.
    pub fn set_source_image(&mut self, image: Option<ImageBuffer>) {
        self.images.set_source(image);
        self.displayed_image_changed();
    }

    /// The style reference never affects what is displayed.
    pub fn set_style_image(&mut self, image: Option<ImageBuffer>) {
        self.images.set_style(image);
    }

    /// Install a result from an earlier session (headless `--previous`).
    pub fn install_previous_result(&mut self, result: GenerationResult) {
        self.result = Some(result);
        self.phase = AppPhase::Success;
        self.error = None;
        self.displayed_image_changed();
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    pub fn set_mask_mode(&mut self, on: bool) {
        self.mask_mode = on;
        self.sync_mask_enabled();
    }

    pub fn toggle_mask_mode(&mut self) -> bool {
        self.set_mask_mode(!self.mask_mode);
        self.mask_mode
    }

    /// Enter or leave compare mode. Entering ends any active stroke; leaving
    /// touches neither the mask history nor the transform.
    pub fn toggle_compare(&mut self) -> bool {
        let has_source = self.images.source().is_some();
        let has_result = self.result_image().is_some();
        let active = self.compare.toggle(has_source, has_result);
        self.sync_mask_enabled();
        active
    }

    // ------------------------------------------------------------------
    // Session actions
    // ------------------------------------------------------------------

    /// Drop the result and go back to the upload.
    pub fn reset_result(&mut self) {
        self.result = None;
        self.phase = AppPhase::Idle;
        self.error = None;
        self.displayed_image_changed();
    }

    /// Clear prompts and result; uploaded images are kept.
    pub fn new_project(&mut self) {
        self.id = Uuid::new_v4();
        self.prompt.clear();
        self.refinement.clear();
        self.reset_result();
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn sync_mask_enabled(&mut self) {
        let enabled = self.mask_mode && !self.compare.is_active();
        self.mask.set_enabled(enabled);
    }

    /// Transform, compare and mask all belong to the displayed image.
    pub(crate) fn displayed_image_changed(&mut self) {
        self.transform.reset();
        self.compare.reset();
        self.mask.clear();
        let (w, h) = self
            .displayed_image()
            .and_then(|img| match img.dimensions() {
                Ok(dims) => Some(dims),
                Err(e) => {
                    log_warn!("Could not read displayed image size: {}", e);
                    None
                }
            })
            .unwrap_or((0, 0));
        if (w, h) != (self.mask.width(), self.mask.height()) {
            self.mask.resize(w, h);
        }
        self.sync_mask_enabled();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BrushConfig;
    use image::{Rgba, RgbaImage};

    fn png(w: u32, h: u32) -> ImageBuffer {
        ImageBuffer::encode_png(&RgbaImage::from_pixel(w, h, Rgba([9, 9, 9, 255]))).unwrap()
    }

    fn with_result(p: &mut Project) {
        p.install_previous_result(GenerationResult {
            image: Some(png(20, 10)),
            text: None,
        });
    }

    #[test]
    fn new_source_resets_view_state() {
        let mut p = Project::default();
        p.set_source_image(Some(png(16, 8)));
        p.transform.rotate_right();
        p.transform.flip_horizontal();
        p.set_mask_mode(true);
        p.mask_mut().begin_stroke((4.0, 4.0), BrushConfig::default());
        p.mask_mut().end_stroke();
        assert_eq!(p.mask().history_len(), 1);

        p.set_source_image(Some(png(32, 16)));
        assert!(p.transform.is_identity());
        assert_eq!(p.mask().history_len(), 0);
        assert_eq!((p.mask().width(), p.mask().height()), (32, 16));
    }

    #[test]
    fn displayed_image_prefers_result() {
        let mut p = Project::default();
        assert!(p.displayed_image().is_none());
        p.set_source_image(Some(png(4, 4)));
        assert_eq!(p.displayed_image().unwrap().dimensions().unwrap(), (4, 4));
        with_result(&mut p);
        assert_eq!(p.displayed_image().unwrap().dimensions().unwrap(), (20, 10));
        assert_eq!((p.mask().width(), p.mask().height()), (20, 10));
    }

    #[test]
    fn compare_blocks_strokes() {
        let mut p = Project::default();
        p.set_source_image(Some(png(4, 4)));
        with_result(&mut p);
        p.set_mask_mode(true);
        assert!(p.toggle_compare());
        assert!(!p.mask_mut().begin_stroke((5.0, 5.0), BrushConfig::default()));
        assert_eq!(p.mask().history_len(), 0);

        assert!(!p.toggle_compare());
        assert!(p.mask_mut().begin_stroke((5.0, 5.0), BrushConfig::default()));
    }

    #[test]
    fn entering_compare_commits_active_stroke() {
        let mut p = Project::default();
        p.set_source_image(Some(png(4, 4)));
        with_result(&mut p);
        p.set_mask_mode(true);
        p.mask_mut().begin_stroke((5.0, 5.0), BrushConfig::default());
        p.transform.rotate_left();
        p.toggle_compare();
        assert!(!p.mask().is_stroking());
        assert_eq!(p.mask().history_len(), 1);

        // Leaving compare keeps history and transform.
        p.toggle_compare();
        assert_eq!(p.mask().history_len(), 1);
        assert_eq!(p.transform.rotation_degrees, -90);
    }

    #[test]
    fn compare_needs_result_image() {
        let mut p = Project::default();
        p.set_source_image(Some(png(4, 4)));
        assert!(!p.toggle_compare());
        p.install_previous_result(GenerationResult {
            image: None,
            text: Some("only words".into()),
        });
        assert!(!p.toggle_compare());
    }

    #[test]
    fn new_project_keeps_images() {
        let mut p = Project::default();
        p.set_source_image(Some(png(4, 4)));
        p.set_style_image(Some(png(2, 2)));
        p.prompt = "a".into();
        p.refinement = "b".into();
        with_result(&mut p);
        p.transform.rotate_right();

        p.new_project();
        assert!(p.prompt.is_empty() && p.refinement.is_empty());
        assert!(p.result().is_none());
        assert_eq!(p.phase(), AppPhase::Idle);
        assert!(p.images().source().is_some() && p.images().style().is_some());
        assert!(p.transform.is_identity());
    }

    #[test]
    fn reset_result_returns_to_idle() {
        let mut p = Project::default();
        p.set_source_image(Some(png(4, 4)));
        with_result(&mut p);
        p.transform.flip_horizontal();
        p.reset_result();
        assert_eq!(p.phase(), AppPhase::Idle);
        assert!(p.result().is_none());
        assert!(p.transform.is_identity());
        assert_eq!((p.mask().width(), p.mask().height()), (4, 4));
    }
}
