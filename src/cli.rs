// ============================================================================
// RenderAI CLI — one headless generation via command-line arguments
// ============================================================================
//
// Usage examples:
//   RenderAI --input sketch.png --preset sketch-to-photo
//   RenderAI -i house.jpg -p "Modern villa at dusk" --style mood.jpg -o out.png
//   RenderAI -i house.jpg --previous out.png --refine "add a red car"
//   RenderAI -i house.jpg --previous out.png --mask roof.png --refine "slate roof"
//
// No window is opened.  The run goes through the same project state and
// orchestrator as the GUI, so validation, refinement selection and error
// classification behave identically.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::io::{ImageBuffer, download_filename, load_image_file, save_result};
use crate::ops::ai::{CredentialSource, GeminiClient, GenerationBackend, GenerationResult};
use crate::ops::generation::{Completion, Generator};
use crate::ops::prompt::find_preset;
use crate::project::Project;
use crate::settings::AppSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// RenderAI headless renderer.
#[derive(Parser, Debug)]
#[command(
    name = "RenderAI",
    about = "Generate an architectural rendering from a reference image",
    long_about = "Send a reference image and a prompt to the image model and save the\n\
                  result without opening the GUI. Pass --previous to refine an earlier\n\
                  result, optionally confined to a --mask.\n\n\
                  Example:\n  \
                  RenderAI --input sketch.png --preset sketch-to-photo -o render.png"
)]
pub struct CliArgs {
    /// Main image (structure). PNG, JPEG, WEBP, BMP or GIF.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Prompt text. Overrides --preset when both are given.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Quick-prompt id (e.g. "sketch-to-photo", "japandi-int").
    #[arg(long, value_name = "ID")]
    pub preset: Option<String>,

    /// Refinement / additional instructions.
    #[arg(long, value_name = "TEXT")]
    pub refine: Option<String>,

    /// Style reference image.
    #[arg(long, value_name = "FILE")]
    pub style: Option<PathBuf>,

    /// Mask over the previous result. Only used together with --previous.
    #[arg(long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Style memory rules. Defaults to the value stored in settings.
    #[arg(long, value_name = "TEXT")]
    pub memory: Option<String>,

    /// An earlier result to refine instead of the main image.
    #[arg(long, value_name = "FILE")]
    pub previous: Option<PathBuf>,

    /// Image model id. Defaults to the value stored in settings.
    #[arg(long)]
    pub model: Option<String>,

    /// Output path. Defaults to render-ai-<timestamp>.png in the current directory.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Rewrite the prompt with the text model before generating.
    #[arg(long)]
    pub enhance: bool,

    /// Debug-level logging on stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one generation and return an OS exit code.
/// `0` = a result was produced, `1` = validation or generation failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = AppSettings::load();
    let backend: Arc<dyn GenerationBackend> =
        Arc::new(GeminiClient::new(CredentialSource::new(settings.configured_key())));
    let generator = Generator::new(backend);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: could not start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut project = match build_project(&args, &settings) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("error: {}", msg);
            return ExitCode::FAILURE;
        }
    };

    if args.enhance && !project.prompt.trim().is_empty() {
        let enhanced = runtime.block_on(generator.backend().enhance_prompt(&project.prompt));
        if args.verbose {
            eprintln!("enhanced prompt: {}", enhanced);
        }
        project.prompt = enhanced;
    }

    let memory = args.memory.clone().unwrap_or_else(|| settings.style_memory.clone());
    let started = Instant::now();
    let completion = match runtime.block_on(generator.run(&mut project, &memory)) {
        Ok(Some(c)) => c,
        Ok(None) => {
            eprintln!("error: a generation is already running");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match completion {
        Completion::Succeeded => {}
        Completion::Failed(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
        Completion::Stale => {
            eprintln!("error: result was discarded");
            return ExitCode::FAILURE;
        }
    }

    let Some(result) = project.result() else {
        return ExitCode::FAILURE;
    };
    if let Some(text) = &result.text {
        println!("{}", text);
    }
    if let Some(image) = &result.image {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(download_filename(chrono::Utc::now())));
        if let Err(e) = save_result(image, &output) {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
        println!("saved {}", output.display());
    }
    if args.verbose {
        eprintln!("done in {:.1}s", started.elapsed().as_secs_f64());
    }
    ExitCode::SUCCESS
}

/// Assemble the project the GUI would hold after the same user actions.
fn build_project(args: &CliArgs, settings: &AppSettings) -> Result<Project, String> {
    let model = args.model.clone().unwrap_or_else(|| settings.model_id.clone());
    let mut project = Project::new(model, settings.max_mask_steps);

    let source = load_image_file(&args.input).map_err(|e| format!("{}: {}", args.input.display(), e))?;
    project.set_source_image(Some(source));

    if let Some(path) = &args.style {
        let style = load_image_file(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        project.set_style_image(Some(style));
    }

    project.prompt = resolve_prompt(args.prompt.as_deref(), args.preset.as_deref())?;
    project.refinement = args.refine.clone().unwrap_or_default();

    match (&args.previous, &args.mask) {
        (Some(previous), mask) => {
            let image = load_image_file(previous).map_err(|e| format!("{}: {}", previous.display(), e))?;
            project.install_previous_result(GenerationResult {
                image: Some(image),
                text: None,
            });
            if let Some(path) = mask {
                let mask: ImageBuffer = load_image_file(path).map_err(|e| format!("{}: {}", path.display(), e))?;
                project
                    .mask_mut()
                    .load_mask(mask)
                    .map_err(|e| format!("{}: {}", path.display(), e))?;
            }
        }
        (None, Some(path)) => {
            log_warn!("--mask {} ignored: masks only apply when refining a --previous result", path.display());
            eprintln!("warning: --mask is ignored without --previous");
        }
        (None, None) => {}
    }
    Ok(project)
}

/// `--prompt` wins over `--preset`; an unknown preset id is an error.
fn resolve_prompt(prompt: Option<&str>, preset: Option<&str>) -> Result<String, String> {
    let preset_prompt = match preset {
        Some(id) => Some(
            find_preset(id)
                .map(|p| p.prompt)
                .ok_or_else(|| format!("unknown preset '{}'", id))?,
        ),
        None => None,
    };
    Ok(match (prompt, preset_prompt) {
        (Some(p), _) => p.to_string(),
        (None, Some(p)) => p.to_string(),
        (None, None) => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command_line() {
        let args = CliArgs::try_parse_from([
            "RenderAI", "-i", "a.png", "--preset", "japandi-int", "--refine", "more light", "--previous",
            "b.png", "--mask", "m.png", "-o", "out.png", "--enhance",
        ])
        .unwrap();
        assert_eq!(args.input, PathBuf::from("a.png"));
        assert_eq!(args.preset.as_deref(), Some("japandi-int"));
        assert_eq!(args.mask, Some(PathBuf::from("m.png")));
        assert!(args.enhance && !args.verbose);
    }

    #[test]
    fn input_is_required() {
        assert!(CliArgs::try_parse_from(["RenderAI", "-p", "x"]).is_err());
    }

    #[test]
    fn prompt_overrides_preset() {
        assert_eq!(resolve_prompt(Some("mine"), Some("realistic-plan")).unwrap(), "mine");
        let preset = resolve_prompt(None, Some("realistic-plan")).unwrap();
        assert!(preset.starts_with("High-quality 3D isometric floor plan"));
        assert!(resolve_prompt(None, Some("nope")).is_err());
        assert_eq!(resolve_prompt(None, None).unwrap(), "");
    }
}
