// ============================================================================
// AI OPERATIONS — generative-image backend over the Gemini REST API
// ============================================================================
//
// The orchestrator only sees the `GenerationBackend` trait.  `GeminiClient`
// is the production implementation; tests plug in their own backend.
//
// Wire format (v1beta `generateContent`):
//   request  → one content with a single text part followed by inline images
//              in a fixed order: source, style reference, mask
//   response → every inline-data part is an image, every text part is text;
//              the last of each kind wins

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::io::{DEFAULT_RESULT_MEDIA_TYPE, ImageBuffer};
use crate::ops::prompt::PromptPath;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Text-only model used by "enhance prompt".
pub const ENHANCE_MODEL: &str = "gemini-2.5-flash";

/// Image models offered in the model picker: (id, label).
pub const IMAGE_MODELS: &[(&str, &str)] = &[
    ("gemini-2.5-flash-image", "Fast & Efficient"),
    ("gemini-3-pro-image-preview", "High Quality"),
];

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Used when the composed prompt reaches the client empty.
const DEFAULT_PROMPT: &str = "Enhance this image and make it look stunning, high resolution.";

const MAIN_IMAGE_INSTRUCTIONS: &str = "Main Image Instructions: Use the provided image below as the main source for structure and composition. Strictly preserve its geometry.";

const STYLE_INSTRUCTIONS: &str = "Style Reference Instructions: A second image is provided below as a style reference. Extract the atmosphere, landscape/terrain, lighting, and materials from this reference image and apply them to the main image structure.";

const MASK_INSTRUCTIONS: &str = "Mask Instructions: The last image provided below is a mask drawn over the main image. Apply the requested changes only inside the painted region and keep everything outside it unchanged.";

const ENHANCE_INSTRUCTIONS: &str = "Rewrite the following prompt for an architectural visualization image model. Keep the original intent, add concrete detail about materials, lighting, camera and atmosphere, and reply with the improved prompt only.";

// ============================================================================
// REQUEST / RESULT
// ============================================================================

/// One outbound submission. Built fresh per submission and never mutated.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub source: ImageBuffer,
    pub style: Option<ImageBuffer>,
    pub mask: Option<ImageBuffer>,
    pub prompt: String,
    pub model_id: String,
    pub path: PromptPath,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    pub image: Option<ImageBuffer>,
    pub text: Option<String>,
}

impl GenerationResult {
    /// Neither an image nor text came back.
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.text.as_deref().is_none_or(str::is_empty)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Rate limit reached. Please wait a moment and try again.")]
    RateLimited,
    #[error("The model is overloaded right now. Please try again shortly.")]
    Overloaded,
    #[error("The API key is invalid or lacks access to this model. Please select a valid key.")]
    Unauthorized,
    #[error(
        "No image generated. The model might have blocked the request due to safety filters, or the selected model does not support image output."
    )]
    EmptyResult,
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::RateLimited | GenerationError::Overloaded)
    }
}

/// Map an HTTP status and/or error body to a failure category.
pub fn classify(status: Option<u16>, body: &str) -> GenerationError {
    let lower = body.to_ascii_lowercase();
    if status == Some(429) || body.contains("RESOURCE_EXHAUSTED") || lower.contains("quota") {
        return GenerationError::RateLimited;
    }
    if status == Some(503) || body.contains("UNAVAILABLE") || lower.contains("overloaded") {
        return GenerationError::Overloaded;
    }
    if matches!(status, Some(401 | 403))
        || body.contains("PERMISSION_DENIED")
        || body.contains("API key not valid")
        || body.contains("Requested entity was not found")
    {
        return GenerationError::Unauthorized;
    }
    let message = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
    match status {
        Some(code) if message.is_empty() => GenerationError::Other(format!("HTTP {code}")),
        Some(code) => GenerationError::Other(format!("HTTP {code}: {message}")),
        None if message.is_empty() => {
            GenerationError::Other("An unexpected error occurred during generation.".into())
        }
        None => GenerationError::Other(message),
    }
}

/// `{"error": {"message": "..."}}` → the message.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Whether a credential is available before any request is built.
    fn has_credential(&self) -> bool;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError>;

    /// Improved prompt text, or `text` unchanged on any failure.
    async fn enhance_prompt(&self, text: &str) -> String;
}

// ============================================================================
// CREDENTIALS
// ============================================================================

/// API key lookup: configured value first, then `GEMINI_API_KEY`, then `API_KEY`.
#[derive(Clone, Default)]
pub struct CredentialSource {
    configured: Option<String>,
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSource")
            .field("configured", &self.configured.as_ref().map(|_| "***"))
            .finish()
    }
}

impl CredentialSource {
    pub const ENV_VARS: &'static [&'static str] = &["GEMINI_API_KEY", "API_KEY"];

    pub fn new(configured: Option<String>) -> Self {
        Self {
            configured: configured.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn resolve(&self) -> Option<String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        if let Some(key) = &self.configured {
            return Some(key.trim().to_string());
        }
        Self::ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty())
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }

    fn image(image: &ImageBuffer) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: image.media_type().to_string(),
                data: image.to_base64(),
            }),
            ..Default::default()
        }
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let mut prompt = if request.prompt.trim().is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        request.prompt.clone()
    };
    prompt.push_str("\n\n");
    prompt.push_str(MAIN_IMAGE_INSTRUCTIONS);
    if request.style.is_some() {
        prompt.push_str("\n\n");
        prompt.push_str(STYLE_INSTRUCTIONS);
    }
    if request.mask.is_some() {
        prompt.push_str("\n\n");
        prompt.push_str(MASK_INSTRUCTIONS);
    }

    let mut parts = vec![GeminiPart::text(prompt), GeminiPart::image(&request.source)];
    parts.extend(request.style.iter().map(GeminiPart::image));
    parts.extend(request.mask.iter().map(GeminiPart::image));

    GeminiRequest {
        contents: vec![GeminiContent { parts }],
    }
}

fn parse_response(body: &str) -> Result<GenerationResult, GenerationError> {
    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Other(format!("Unreadable response from the model: {e}")))?;

    let mut result = GenerationResult::default();
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    for part in parts {
        if let Some(inline) = part.inline_data {
            let media_type = if inline.mime_type.is_empty() {
                DEFAULT_RESULT_MEDIA_TYPE.to_string()
            } else {
                inline.mime_type
            };
            let image = ImageBuffer::from_base64(&inline.data, media_type)
                .map_err(|e| GenerationError::Other(e.to_string()))?;
            result.image = Some(image);
        } else if let Some(text) = part.text
            && !text.is_empty()
        {
            result.text = Some(text);
        }
    }
    Ok(result)
}

fn first_text(body: &str) -> Option<String> {
    let response: GeminiResponse = serde_json::from_str(body).ok()?;
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

// ============================================================================
// GEMINI CLIENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    credentials: CredentialSource,
}

impl GeminiClient {
    pub fn new(credentials: CredentialSource) -> Self {
        Self {
            client: Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            credentials,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// POST a `generateContent` call and return the raw body of a 2xx reply.
    async fn send(&self, model: &str, body: &GeminiRequest) -> Result<String, GenerationError> {
        let key = self.credentials.resolve().ok_or(GenerationError::Unauthorized)?;
        let url = format!("{}/{}:generateContent", self.base_url, model);
        tracing::debug!(%url, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(None, &e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify(Some(status.as_u16()), &e.to_string()))?;
        tracing::debug!(status = status.as_u16(), bytes = text.len(), "generateContent response");

        if !status.is_success() {
            log_warn!("Gemini API error: HTTP {}", status.as_u16());
            return Err(classify(Some(status.as_u16()), &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    fn has_credential(&self) -> bool {
        self.credentials.resolve().is_some()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let body = build_request(request);
        let text = self.send(&request.model_id, &body).await?;
        parse_response(&text)
    }

    async fn enhance_prompt(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart::text(format!("{ENHANCE_INSTRUCTIONS}\n\n{text}"))],
            }],
        };
        match self.send(ENHANCE_MODEL, &body).await {
            Ok(reply) => first_text(&reply).unwrap_or_else(|| text.to_string()),
            Err(e) => {
                log_warn!("Prompt enhancement failed: {}", e);
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png() -> ImageBuffer {
        ImageBuffer::encode_png(&RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]))).unwrap()
    }

    fn request(style: bool, mask: bool) -> GenerationRequest {
        GenerationRequest {
            id: Uuid::new_v4(),
            source: png(),
            style: style.then(png),
            mask: mask.then(png),
            prompt: "Make it dusk".into(),
            model_id: DEFAULT_MODEL.into(),
            path: PromptPath::Fresh,
        }
    }

    #[test]
    fn classifies_service_failures() {
        assert_eq!(classify(Some(429), ""), GenerationError::RateLimited);
        assert_eq!(
            classify(Some(400), r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#),
            GenerationError::RateLimited
        );
        assert_eq!(classify(None, "Quota exceeded for project"), GenerationError::RateLimited);
        assert_eq!(classify(Some(503), ""), GenerationError::Overloaded);
        assert_eq!(classify(None, "The model is overloaded."), GenerationError::Overloaded);
        assert_eq!(classify(Some(403), ""), GenerationError::Unauthorized);
        assert_eq!(
            classify(Some(400), "API key not valid. Please pass a valid API key."),
            GenerationError::Unauthorized
        );
        assert_eq!(
            classify(Some(404), "Requested entity was not found."),
            GenerationError::Unauthorized
        );
    }

    #[test]
    fn unclassified_keeps_raw_message() {
        let err = classify(Some(400), r#"{"error":{"code":400,"message":"Bad thing"}}"#);
        assert_eq!(err, GenerationError::Other("HTTP 400: Bad thing".into()));
        assert_eq!(classify(None, "connection reset"), GenerationError::Other("connection reset".into()));
        assert!(!err.is_transient());
        assert!(GenerationError::RateLimited.is_transient());
    }

    #[test]
    fn request_orders_parts() {
        let body = serde_json::to_value(build_request(&request(true, true))).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        let text = parts[0]["text"].as_str().unwrap();
        assert!(text.starts_with("Make it dusk\n\nMain Image Instructions"));
        assert!(text.contains("Style Reference Instructions"));
        assert!(text.contains("Mask Instructions"));
        for part in &parts[1..] {
            assert_eq!(part["inlineData"]["mimeType"], "image/png");
            assert!(part.get("text").is_none());
        }
    }

    #[test]
    fn empty_prompt_uses_default() {
        let mut req = request(false, false);
        req.prompt = "   ".into();
        let body = serde_json::to_value(build_request(&req)).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        let text = parts[0]["text"].as_str().unwrap();
        assert!(text.starts_with(DEFAULT_PROMPT));
        assert!(!text.contains("Style Reference"));
    }

    #[test]
    fn last_parts_win() {
        let a = png().to_base64();
        let body = format!(
            r#"{{"candidates":[{{"content":{{"parts":[
                {{"text":"first"}},
                {{"inlineData":{{"mimeType":"image/jpeg","data":"{a}"}}}},
                {{"text":"second"}},
                {{"inlineData":{{"data":"{a}"}}}}
            ]}}}}]}}"#
        );
        let result = parse_response(&body).unwrap();
        assert_eq!(result.text.as_deref(), Some("second"));
        assert_eq!(result.image.unwrap().media_type(), "image/png");
    }

    #[test]
    fn no_candidates_is_empty() {
        let result = parse_response(r#"{"candidates":[]}"#).unwrap();
        assert!(result.is_empty());
        assert!(parse_response("{}").unwrap().is_empty());
    }

    #[test]
    fn any_returned_text_counts_as_a_result() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.text.as_deref(), Some("  "));
        assert!(!result.is_empty());
        assert!(GenerationResult::default().is_empty());
    }

    #[test]
    fn credential_order() {
        let env = |name: &str| match name {
            "GEMINI_API_KEY" => Some("from-gemini".to_string()),
            "API_KEY" => Some("from-api".to_string()),
            _ => None,
        };
        assert_eq!(
            CredentialSource::new(Some("set".into())).resolve_with(env).as_deref(),
            Some("set")
        );
        assert_eq!(
            CredentialSource::new(Some("  ".into())).resolve_with(env).as_deref(),
            Some("from-gemini")
        );
        let only_api = |name: &str| (name == "API_KEY").then(|| "from-api".to_string());
        assert_eq!(CredentialSource::default().resolve_with(only_api).as_deref(), Some("from-api"));
        assert_eq!(CredentialSource::default().resolve_with(|_| None), None);
    }

    #[test]
    fn debug_hides_key() {
        let shown = format!("{:?}", CredentialSource::new(Some("secret".into())));
        assert!(!shown.contains("secret"));
    }
}
