use crate::components::compare::CompareLayer;
use crate::components::history::{HistoryAction, HistoryPanel};
use crate::io::{ImageBuffer, pick_image_file, save_result_dialog};
use crate::ops::ai::{CredentialSource, GeminiClient, IMAGE_MODELS};
use crate::ops::generation::{Completion, CredentialPrompt, GenerationEvent, Generator, Submit, ValidationError};
use crate::ops::prompt::PresetCategory;
use crate::project::{AppPhase, Project};
use crate::settings::AppSettings;
use eframe::egui::{self, Align2, Color32, ColorImage, Rect, Sense, Shape, TextureHandle, TextureOptions, Vec2, vec2};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

const ACCENT: Color32 = Color32::from_rgb(249, 115, 22);
const API_KEY_URL: &str = "https://aistudio.google.com/app/apikey";

// ============================================================================
// TEXTURE CACHE — decoded GPU copies of the encoded buffers on screen
// ============================================================================

/// Texture for one `ImageBuffer`. Re-uploaded only when the buffer changes.
struct ImageTexture {
    buffer: ImageBuffer,
    /// `None` when the buffer failed to decode (kept so we don't retry every frame).
    handle: Option<TextureHandle>,
    size: Vec2,
}

impl ImageTexture {
    fn sync(slot: &mut Option<ImageTexture>, ctx: &egui::Context, name: &str, image: Option<&ImageBuffer>) {
        let Some(image) = image else {
            *slot = None;
            return;
        };
        if slot.as_ref().is_some_and(|t| t.buffer.same_buffer(image)) {
            return;
        }
        let (handle, size) = match image.decode() {
            Ok(rgba) => {
                let (w, h) = rgba.dimensions();
                let color = ColorImage::from_rgba_unmultiplied([w as usize, h as usize], rgba.as_raw());
                (
                    Some(ctx.load_texture(name, color, TextureOptions::LINEAR)),
                    vec2(w as f32, h as f32),
                )
            }
            Err(e) => {
                log_err!("Could not decode {} image for display: {}", name, e);
                (None, Vec2::ZERO)
            }
        };
        *slot = Some(ImageTexture {
            buffer: image.clone(),
            handle,
            size,
        });
    }

    fn id(&self) -> Option<egui::TextureId> {
        self.handle.as_ref().map(TextureHandle::id)
    }

    fn layer(&self) -> Option<CompareLayer> {
        self.id().map(|texture| CompareLayer {
            texture,
            size: self.size,
        })
    }
}

/// Raised by the generator when the service rejects the key.
#[derive(Default)]
struct KeyRequest(AtomicBool);

impl CredentialPrompt for KeyRequest {
    fn request_credential(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl KeyRequest {
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

// ============================================================================
// APP
// ============================================================================

pub struct RenderAIApp {
    project: Project,
    settings: AppSettings,
    settings_dirty: bool,

    // Generation plumbing
    runtime: tokio::runtime::Runtime,
    generator: Generator,
    key_request: Arc<KeyRequest>,
    event_sender: mpsc::Sender<GenerationEvent>,
    event_receiver: mpsc::Receiver<GenerationEvent>,
    enhancing: bool,

    // Display
    source_tex: Option<ImageTexture>,
    result_tex: Option<ImageTexture>,
    mask_tex: Option<TextureHandle>,
    mask_tex_generation: Option<u64>,

    // UI state
    history_panel: HistoryPanel,
    /// Validation / IO message shown under the generate button.
    notice: Option<String>,
    api_key_input: String,
    show_key_window: bool,
    confirm_new_project: bool,
}

impl RenderAIApp {
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: tokio::runtime::Runtime) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let settings = AppSettings::load();
        let key_request = Arc::new(KeyRequest::default());
        let generator = build_generator(&settings, &key_request);
        let (event_sender, event_receiver) = mpsc::channel();
        let project = Project::new(settings.model_id.clone(), settings.max_mask_steps);
        log_info!("Model: {}", settings.model_id);

        Self {
            project,
            api_key_input: settings.api_key.clone(),
            settings,
            settings_dirty: false,
            runtime,
            generator,
            key_request,
            event_sender,
            event_receiver,
            enhancing: false,
            source_tex: None,
            result_tex: None,
            mask_tex: None,
            mask_tex_generation: None,
            history_panel: HistoryPanel,
            notice: None,
            show_key_window: false,
            confirm_new_project: false,
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn generate(&mut self) {
        self.notice = None;
        match self.generator.submit(&mut self.project, &self.settings.style_memory) {
            Ok(Submit::Dispatched(request)) => {
                self.generator
                    .spawn(request, self.runtime.handle(), self.event_sender.clone());
            }
            Ok(Submit::Busy) => {}
            Err(e) => {
                if e == ValidationError::MissingCredential {
                    self.show_key_window = true;
                }
                self.notice = Some(e.to_string());
            }
        }
    }

    fn enhance_prompt(&mut self) {
        if self.enhancing || self.project.prompt.trim().is_empty() {
            return;
        }
        self.enhancing = true;
        self.generator.spawn_enhance(
            self.project.prompt.clone(),
            self.runtime.handle(),
            self.event_sender.clone(),
        );
    }

    fn poll_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.event_receiver.try_recv() {
            match event {
                GenerationEvent::Finished { id, outcome } => {
                    if let Completion::Failed(e) = self.generator.finish(&mut self.project, id, outcome) {
                        log_warn!("Generation failed: {}", e);
                    }
                }
                GenerationEvent::Enhanced { original, enhanced } => {
                    self.enhancing = false;
                    // The user kept typing: don't overwrite their edit.
                    if self.project.prompt == original {
                        self.project.prompt = enhanced;
                    }
                }
            }
        }
        if self.key_request.take() {
            self.show_key_window = true;
        }
        if self.project.is_loading() || self.enhancing {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn upload_source(&mut self) {
        match pick_image_file("Main Image (Structure)") {
            Ok(Some(image)) => {
                self.notice = None;
                self.project.set_source_image(Some(image));
            }
            Ok(None) => {}
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    fn upload_style(&mut self) {
        match pick_image_file("Style Reference") {
            Ok(Some(image)) => {
                self.notice = None;
                self.project.set_style_image(Some(image));
            }
            Ok(None) => {}
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    fn download(&mut self) {
        let Some(image) = self.project.result_image() else {
            return;
        };
        match save_result_dialog(image) {
            Ok(Some(path)) => log_info!("Result saved to {}", path.display()),
            Ok(None) => {}
            Err(e) => {
                log_err!("Save failed: {}", e);
                self.notice = Some(e.to_string());
            }
        }
    }

    fn apply_api_key(&mut self) {
        self.settings.api_key = self.api_key_input.trim().to_string();
        self.generator = build_generator(&self.settings, &self.key_request);
        self.settings_dirty = true;
    }

    fn save_settings_if_idle(&mut self, ctx: &egui::Context) {
        if !self.settings_dirty || ctx.input(|i| i.pointer.any_down()) {
            return;
        }
        self.settings_dirty = false;
        if let Err(e) = self.settings.save() {
            log_err!("Could not save settings: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Panels
    // ------------------------------------------------------------------

    fn controls_panel(&mut self, ui: &mut egui::Ui) {
        ui.add_space(6.0);
        ui.heading("AI Settings");

        ui.label("AI Model");
        let selected = IMAGE_MODELS
            .iter()
            .find(|(id, _)| *id == self.project.model_id)
            .map(|(_, label)| *label)
            .unwrap_or(self.project.model_id.as_str())
            .to_string();
        egui::ComboBox::from_id_source("model_picker")
            .selected_text(selected)
            .width(ui.available_width())
            .show_ui(ui, |ui| {
                for (id, label) in IMAGE_MODELS {
                    if ui
                        .selectable_value(&mut self.project.model_id, id.to_string(), *label)
                        .changed()
                    {
                        self.settings.model_id = id.to_string();
                        self.settings_dirty = true;
                    }
                }
            });

        ui.horizontal(|ui| {
            ui.label("API Key");
            ui.hyperlink_to("Get Key", API_KEY_URL);
        });
        let key_edit = ui.add(
            egui::TextEdit::singleline(&mut self.api_key_input)
                .password(true)
                .hint_text("Paste Gemini API Key...")
                .desired_width(f32::INFINITY),
        );
        if key_edit.lost_focus() && self.api_key_input.trim() != self.settings.api_key {
            self.apply_api_key();
        }

        ui.separator();

        // Project type tabs
        ui.horizontal(|ui| {
            for category in PresetCategory::all() {
                if ui
                    .selectable_value(&mut self.settings.preset_category, *category, category.label())
                    .changed()
                {
                    self.settings_dirty = true;
                }
            }
        });

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.strong("Main Image (Structure)");
            ui.weak("Required");
        });
        ui.horizontal(|ui| {
            if ui.button("Upload…").clicked() {
                self.upload_source();
            }
            if let Some(tex) = &self.source_tex {
                ui.weak(format!("{}×{}", tex.size.x, tex.size.y));
            }
        });

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.strong("Prompt (Command)");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let label = if self.enhancing { "Enhancing…" } else { "✨ Enhance" };
                let can_enhance = !self.enhancing && !self.project.prompt.trim().is_empty();
                if ui.add_enabled(can_enhance, egui::Button::new(label)).clicked() {
                    self.enhance_prompt();
                }
            });
        });
        ui.add(
            egui::TextEdit::multiline(&mut self.project.prompt)
                .hint_text("Describe what you want to change...")
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );

        ui.add_space(4.0);
        ui.strong("Refine Result (Additional)");
        ui.add(
            egui::TextEdit::multiline(&mut self.project.refinement)
                .hint_text("Add details to the generated image (e.g. add a red car, change sky color)...")
                .desired_rows(2)
                .desired_width(f32::INFINITY),
        );

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.strong("Style Reference");
            ui.weak("Optional");
        });
        ui.horizontal(|ui| {
            if ui.button("Upload…").clicked() {
                self.upload_style();
            }
            if self.project.images().style().is_some() && ui.button("Remove").clicked() {
                self.project.set_style_image(None);
            }
        });

        ui.add_space(4.0);
        ui.strong("Style Memory");
        let memory = ui.add(
            egui::TextEdit::multiline(&mut self.settings.style_memory)
                .hint_text("Rules applied to every render...")
                .desired_rows(2)
                .desired_width(f32::INFINITY),
        );
        if memory.changed() {
            self.settings_dirty = true;
        }

        ui.add_space(4.0);
        ui.strong("Quick Prompts");
        egui::ScrollArea::vertical()
            .max_height(220.0)
            .show(ui, |ui| {
                for preset in self.settings.preset_category.presets() {
                    let text = egui::RichText::new(format!("{}\n{}", preset.label, preset.subtitle)).small();
                    let selected = self.project.prompt == preset.prompt;
                    if ui
                        .add_sized([ui.available_width(), 34.0], egui::SelectableLabel::new(selected, text))
                        .on_hover_text(preset.prompt)
                        .clicked()
                    {
                        self.project.prompt = preset.prompt.to_string();
                    }
                }
            });

        ui.add_space(8.0);
        let loading = self.project.is_loading();
        let label = if loading { "Rendering..." } else { "Generate Render" };
        let button = egui::Button::new(egui::RichText::new(label).strong().color(Color32::WHITE)).fill(ACCENT);
        if ui
            .add_enabled(!loading, button.min_size(vec2(ui.available_width(), 36.0)))
            .clicked()
        {
            self.generate();
        }
        if let Some(notice) = &self.notice {
            ui.colored_label(Color32::from_rgb(250, 204, 21), notice);
        }

        ui.separator();
        egui::CollapsingHeader::new("Mask").default_open(true).show(ui, |ui| {
            let mut brush = self.settings.brush();
            let mut color = Color32::from_rgba_unmultiplied(
                brush.color[0],
                brush.color[1],
                brush.color[2],
                brush.color[3],
            );
            ui.horizontal(|ui| {
                let size = ui.add(egui::Slider::new(&mut brush.size, 2.0..=120.0).text("Brush"));
                let picked = ui.color_edit_button_srgba(&mut color);
                if size.changed() || picked.changed() {
                    brush.color = image::Rgba(color.to_srgba_unmultiplied());
                    self.settings.set_brush(brush);
                    self.settings_dirty = true;
                }
            });
            let mut steps = self.settings.max_mask_steps;
            if ui
                .add(egui::DragValue::new(&mut steps).clamp_range(1..=200).prefix("Undo steps: "))
                .changed()
            {
                self.settings.max_mask_steps = steps;
                self.project.mask_mut().set_max_steps(steps);
                self.settings_dirty = true;
            }
            match self.history_panel.show(ui, self.project.mask().history()) {
                Some(HistoryAction::Undo) => {
                    self.project.mask_mut().undo();
                }
                Some(HistoryAction::Clear) => self.project.mask_mut().clear(),
                None => {}
            }
        });
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("NEW PROJECT").clicked() {
                self.confirm_new_project = true;
            }
            ui.separator();

            let has_display = self.project.displayed_image().is_some();
            ui.add_enabled_ui(has_display, |ui| {
                if ui.button("⟲").on_hover_text("Rotate left").clicked() {
                    self.project.transform.rotate_left();
                }
                if ui.button("⟳").on_hover_text("Rotate right").clicked() {
                    self.project.transform.rotate_right();
                }
                if ui.button("⇋").on_hover_text("Flip horizontal").clicked() {
                    self.project.transform.flip_horizontal();
                }
            });
            ui.separator();

            let can_compare = self.project.images().source().is_some() && self.project.result_image().is_some();
            let comparing = self.project.compare().is_active();
            if ui
                .add_enabled(
                    can_compare,
                    egui::SelectableLabel::new(comparing, if comparing { "Comparing" } else { "Compare" }),
                )
                .on_hover_text("Compare Before/After")
                .clicked()
            {
                self.project.toggle_compare();
            }

            let mask_mode = self.project.mask_mode();
            if ui
                .add_enabled(has_display && !comparing, egui::SelectableLabel::new(mask_mode, "Mask"))
                .on_hover_text("Paint the region to edit")
                .clicked()
            {
                self.project.toggle_mask_mode();
            }
            if ui
                .add_enabled(!self.project.mask().history().is_empty(), egui::Button::new("Undo mask"))
                .clicked()
            {
                self.project.mask_mut().undo();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let has_result = self.project.result().is_some();
                if ui.add_enabled(has_result, egui::Button::new("Reset")).clicked() {
                    self.project.reset_result();
                }
                if ui
                    .add_enabled(self.project.result_image().is_some(), egui::Button::new("Download"))
                    .clicked()
                {
                    self.download();
                }
                if let Some(path) = crate::logger::log_path() {
                    ui.weak("log").on_hover_text(path.display().to_string());
                }
            });
        });
    }

    fn viewport(&mut self, ui: &mut egui::Ui) {
        let rect = ui.available_rect_before_wrap().shrink(16.0);
        let painter = ui.painter_at(ui.available_rect_before_wrap());

        let displayed = if self.project.result_image().is_some() {
            self.result_tex.as_ref()
        } else {
            self.source_tex.as_ref()
        };
        let Some((tex_id, image_px)) = displayed.and_then(|t| t.id().map(|id| (id, t.size))) else {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "Upload a main image to begin",
                egui::FontId::proportional(18.0),
                Color32::from_gray(140),
            );
            return;
        };

        let transform = self.project.transform;
        let center = rect.center();
        let drawn = transform.fitted_size(image_px, rect.size());
        let display_rect = transform.display_rect(center, drawn);

        let compare_layers = match (&self.source_tex, &self.result_tex) {
            (Some(before), Some(after)) => before.layer().zip(after.layer()),
            _ => None,
        };
        if self.project.compare().is_active()
            && let Some((before, after)) = compare_layers
        {
            // Shared container; each layer is fitted into it separately.
            self.project.compare_mut().show(ui, rect, before, after, &transform);
        } else {
            painter.add(Shape::mesh(transform.mesh(tex_id, center, drawn, Color32::WHITE)));
            self.paint_mask(ui, &painter, center, drawn, image_px, display_rect);
        }

        if self.project.phase() == AppPhase::Loading {
            painter.rect_filled(display_rect, 0.0, Color32::from_black_alpha(120));
            ui.put(
                Rect::from_center_size(center, vec2(48.0, 48.0)),
                egui::Spinner::new().size(48.0).color(ACCENT),
            );
        }
    }

    fn paint_mask(
        &mut self,
        ui: &mut egui::Ui,
        painter: &egui::Painter,
        center: egui::Pos2,
        drawn: Vec2,
        image_px: Vec2,
        display_rect: Rect,
    ) {
        let transform = self.project.transform;
        if self.project.mask_mode()
            && let Some(tex) = &self.mask_tex
        {
            painter.add(Shape::mesh(transform.mesh(tex.id(), center, drawn, Color32::WHITE)));
        }

        let response = ui.interact(display_rect, ui.id().with("mask_surface"), Sense::drag());
        if !self.project.mask().is_enabled() {
            return;
        }
        if response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::Crosshair);
        }

        let pressed = response.is_pointer_button_down_on();
        let pointer = response.interact_pointer_pos();
        let mask = self.project.mask_mut();
        match (pressed, pointer) {
            (true, Some(pos)) => {
                let point = transform.screen_to_image(pos, center, drawn, image_px);
                if mask.is_stroking() {
                    mask.extend_stroke(point);
                } else {
                    mask.begin_stroke(point, self.settings.brush());
                }
            }
            _ => {
                if mask.is_stroking() {
                    mask.end_stroke();
                }
            }
        }
    }

    fn sync_textures(&mut self, ctx: &egui::Context) {
        ImageTexture::sync(&mut self.source_tex, ctx, "source", self.project.images().source());
        ImageTexture::sync(&mut self.result_tex, ctx, "result", self.project.result_image());

        let mask = self.project.mask();
        if mask.width() == 0 || mask.height() == 0 {
            self.mask_tex = None;
            self.mask_tex_generation = None;
            return;
        }
        if self.mask_tex_generation == Some(mask.generation()) {
            return;
        }
        let raster = mask.raster();
        let image = ColorImage::from_rgba_unmultiplied(
            [raster.width() as usize, raster.height() as usize],
            raster.as_raw(),
        );
        match &mut self.mask_tex {
            Some(handle) => handle.set(image, TextureOptions::LINEAR),
            None => self.mask_tex = Some(ctx.load_texture("mask", image, TextureOptions::LINEAR)),
        }
        self.mask_tex_generation = Some(mask.generation());
    }

    fn dialogs(&mut self, ctx: &egui::Context) {
        if self.confirm_new_project {
            egui::Window::new("New Project")
                .collapsible(false)
                .resizable(false)
                .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("Start a new project? Current progress will be lost.");
                    ui.horizontal(|ui| {
                        if ui.button("Start new").clicked() {
                            self.project.abandon_generation();
                            self.project.new_project();
                            self.notice = None;
                            self.confirm_new_project = false;
                        }
                        if ui.button("Cancel").clicked() {
                            self.confirm_new_project = false;
                        }
                    });
                });
        }

        if self.show_key_window {
            let mut open = true;
            egui::Window::new("API Key Required")
                .collapsible(false)
                .resizable(false)
                .open(&mut open)
                .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(ValidationError::MissingCredential.to_string());
                    ui.hyperlink_to("Get a key from Google AI Studio", API_KEY_URL);
                    ui.add(
                        egui::TextEdit::singleline(&mut self.api_key_input)
                            .password(true)
                            .hint_text("Paste Gemini API Key..."),
                    );
                    if ui.button("Save").clicked() {
                        self.apply_api_key();
                        self.show_key_window = false;
                    }
                });
            if !open {
                self.show_key_window = false;
            }
        }
    }
}

impl eframe::App for RenderAIApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_events(ctx);

        // --- Shortcuts ---
        let undo = ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::Z));
        if undo && !ctx.wants_keyboard_input() {
            self.project.mask_mut().undo();
        }

        self.sync_textures(ctx);

        egui::SidePanel::left("controls")
            .resizable(false)
            .exact_width(320.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.controls_panel(ui));
            });

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        let status = match self.project.phase() {
            AppPhase::Error => self.project.error().map(|e| (e.to_string(), Color32::from_rgb(248, 113, 113))),
            _ => self
                .project
                .result()
                .and_then(|r| r.text.clone())
                .map(|t| (t, Color32::from_gray(200))),
        };
        if let Some((text, color)) = status {
            egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .max_height(120.0)
                    .show(ui, |ui| ui.colored_label(color, text));
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| self.viewport(ui));

        self.dialogs(ctx);
        self.save_settings_if_idle(ctx);
    }
}

fn build_generator(settings: &AppSettings, key_request: &Arc<KeyRequest>) -> Generator {
    let client = GeminiClient::new(CredentialSource::new(settings.configured_key()));
    Generator::new(Arc::new(client)).with_credential_prompt(key_request.clone())
}

