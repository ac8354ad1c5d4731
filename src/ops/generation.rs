// ============================================================================
// GENERATION — submission, dispatch and outcome handling
// ============================================================================
//
// Idle → Loading → {Success, Error}.  `begin_generation` validates and builds
// the request synchronously; `finish_generation` applies the outcome.  The
// network call in between is owned by `Generator`, either awaited inline
// (headless) or spawned on the runtime with the outcome sent back over a
// channel that the UI drains each frame.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use uuid::Uuid;

use crate::io::ImageBuffer;
use crate::ops::ai::{GenerationBackend, GenerationError, GenerationRequest, GenerationResult};
use crate::ops::prompt::{PromptPath, compose};
use crate::project::{AppPhase, Project};

/// Local checks that fail before any request exists.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter your Google Gemini API Key in the sidebar settings.")]
    MissingCredential,
    #[error("Please upload an image first.")]
    MissingSource,
    #[error("Please enter a prompt or select a preset.")]
    EmptyPrompt,
}

/// Which image the next request is built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    /// The original upload.
    Fresh { source: ImageBuffer },
    /// The previous result, optionally with the mask drawn over it.
    Refinement {
        source: ImageBuffer,
        mask: Option<ImageBuffer>,
    },
}

impl SourceSelection {
    pub fn path(&self) -> PromptPath {
        match self {
            SourceSelection::Fresh { .. } => PromptPath::Fresh,
            SourceSelection::Refinement { .. } => PromptPath::Refinement,
        }
    }

    pub fn source(&self) -> &ImageBuffer {
        match self {
            SourceSelection::Fresh { source } | SourceSelection::Refinement { source, .. } => source,
        }
    }
}

/// Refinement when a previous result image exists and the user gave either
/// refinement text or a mask; otherwise the upload. `None` when neither
/// image exists.
pub fn select_source(project: &Project) -> Option<SourceSelection> {
    if let Some(previous) = project.result_image() {
        let mask = project.mask().current_mask().cloned();
        if !project.refinement.trim().is_empty() || mask.is_some() {
            return Some(SourceSelection::Refinement {
                source: previous.clone(),
                mask,
            });
        }
    }
    project
        .images()
        .source()
        .cloned()
        .map(|source| SourceSelection::Fresh { source })
}

#[derive(Debug)]
pub enum Submit {
    Dispatched(GenerationRequest),
    /// A request is already in flight; nothing changed.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed(GenerationError),
    /// The outcome belongs to a request that is no longer awaited.
    Stale,
}

impl Project {
    /// Validate and build the next request, moving to `Loading`.
    pub fn begin_generation(&mut self, has_credential: bool, memory: &str) -> Result<Submit, ValidationError> {
        if self.phase == AppPhase::Loading {
            return Ok(Submit::Busy);
        }
        // A stroke still in progress belongs to this submission.
        if self.mask().is_stroking() {
            self.mask_mut().end_stroke();
        }
        let (selection, prompt) = match self.validate(has_credential, memory) {
            Ok(valid) => valid,
            Err(e) => {
                self.phase = AppPhase::Idle;
                self.error = None;
                return Err(e);
            }
        };

        let path = selection.path();
        let (source, mask) = match selection {
            SourceSelection::Fresh { source } => (source, None),
            SourceSelection::Refinement { source, mask } => (source, mask),
        };
        let request = GenerationRequest {
            id: Uuid::new_v4(),
            source,
            style: self.images.style().cloned(),
            mask,
            prompt,
            model_id: self.model_id.clone(),
            path,
        };

        log_info!(
            "Generation {} dispatched: model={} path={:?} style={} mask={}",
            request.id,
            request.model_id,
            request.path,
            request.style.is_some(),
            request.mask.is_some()
        );
        self.in_flight = Some(request.id);
        self.phase = AppPhase::Loading;
        self.error = None;
        Ok(Submit::Dispatched(request))
    }

    fn validate(&self, has_credential: bool, memory: &str) -> Result<(SourceSelection, String), ValidationError> {
        if !has_credential {
            return Err(ValidationError::MissingCredential);
        }
        let selection = select_source(self).ok_or(ValidationError::MissingSource)?;
        let prompt = compose(&self.prompt, memory, &self.refinement, selection.path());
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        Ok((selection, prompt))
    }

    /// Apply the outcome of request `id`. Outcomes for anything but the
    /// in-flight request are dropped untouched.
    pub fn finish_generation(
        &mut self,
        id: Uuid,
        outcome: Result<GenerationResult, GenerationError>,
    ) -> Completion {
        if self.in_flight != Some(id) {
            log_info!("Generation {} finished after it was superseded; ignored", id);
            return Completion::Stale;
        }
        self.in_flight = None;

        let outcome = outcome.and_then(|result| {
            if result.is_empty() {
                Err(GenerationError::EmptyResult)
            } else {
                Ok(result)
            }
        });

        match outcome {
            Ok(result) => {
                log_info!(
                    "Generation {} succeeded: image={} text={}",
                    id,
                    result.image.is_some(),
                    result.text.is_some()
                );
                self.result = Some(result);
                self.phase = AppPhase::Success;
                self.error = None;
                // The mask has been spent on this result.
                self.set_mask_mode(false);
                self.displayed_image_changed();
                Completion::Succeeded
            }
            Err(e) => {
                log_warn!("Generation {} failed: {:?}", id, e);
                self.phase = AppPhase::Error;
                self.error = Some(e.to_string());
                Completion::Failed(e)
            }
        }
    }

    /// Forget the in-flight request so its outcome arrives as stale.
    pub fn abandon_generation(&mut self) {
        if let Some(id) = self.in_flight.take() {
            log_info!("Generation {} abandoned", id);
            self.phase = AppPhase::Idle;
        }
    }
}

// ============================================================================
// GENERATOR — drives the backend
// ============================================================================

/// Invoked when the service rejects the credential.
pub trait CredentialPrompt: Send + Sync {
    fn request_credential(&self);
}

/// Messages a spawned task sends back to the UI thread.
#[derive(Debug)]
pub enum GenerationEvent {
    Finished {
        id: Uuid,
        outcome: Result<GenerationResult, GenerationError>,
    },
    Enhanced {
        original: String,
        enhanced: String,
    },
}

#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn GenerationBackend>,
    credential_prompt: Option<Arc<dyn CredentialPrompt>>,
}

impl Generator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            credential_prompt: None,
        }
    }

    pub fn with_credential_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.credential_prompt = Some(prompt);
        self
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn submit(&self, project: &mut Project, memory: &str) -> Result<Submit, ValidationError> {
        project.begin_generation(self.backend.has_credential(), memory)
    }

    /// Apply an outcome and fire the credential prompt on `Unauthorized`.
    pub fn finish(
        &self,
        project: &mut Project,
        id: Uuid,
        outcome: Result<GenerationResult, GenerationError>,
    ) -> Completion {
        let completion = project.finish_generation(id, outcome);
        if completion == Completion::Failed(GenerationError::Unauthorized)
            && let Some(prompt) = &self.credential_prompt
        {
            prompt.request_credential();
        }
        completion
    }

    /// Submit and await in place. `Ok(None)` when a request was already in flight.
    pub async fn run(&self, project: &mut Project, memory: &str) -> Result<Option<Completion>, ValidationError> {
        let request = match self.submit(project, memory)? {
            Submit::Dispatched(request) => request,
            Submit::Busy => return Ok(None),
        };
        let outcome = self.backend.generate(&request).await;
        Ok(Some(self.finish(project, request.id, outcome)))
    }

    /// Run `request` on `runtime`; the outcome arrives on `sender`.
    pub fn spawn(&self, request: GenerationRequest, runtime: &tokio::runtime::Handle, sender: Sender<GenerationEvent>) {
        let backend = Arc::clone(&self.backend);
        runtime.spawn(async move {
            let outcome = backend.generate(&request).await;
            // The receiver may be gone if the window closed; nothing to do then.
            let _ = sender.send(GenerationEvent::Finished {
                id: request.id,
                outcome,
            });
        });
    }

    /// Prompt enhancement runs outside the generation guard.
    pub fn spawn_enhance(&self, text: String, runtime: &tokio::runtime::Handle, sender: Sender<GenerationEvent>) {
        let backend = Arc::clone(&self.backend);
        runtime.spawn(async move {
            let enhanced = backend.enhance_prompt(&text).await;
            let _ = sender.send(GenerationEvent::Enhanced {
                original: text,
                enhanced,
            });
        });
    }
}
