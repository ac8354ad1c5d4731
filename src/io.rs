// ============================================================================
// IMAGE IO — encoded image buffers, upload provider, download action
// ============================================================================
//
// Every image that crosses a component boundary (source upload, style
// reference, mask snapshot, generation result) travels as an `ImageBuffer`:
// opaque encoded bytes plus a declared media type.  Pixels are only decoded
// where something actually needs them (texture upload, mask replay).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat, ImageOutputFormat, RgbaImage};
use rfd::FileDialog;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Media type assumed for generated images when the service omits one.
pub const DEFAULT_RESULT_MEDIA_TYPE: &str = "image/png";

/// Extensions offered by the upload dialog.
pub const UPLOAD_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

#[derive(Debug, Error)]
pub enum IoError {
    #[error("Please upload an image file (PNG, JPG, WEBP)")]
    NotAnImage,
    #[error("Could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

// ============================================================================
// IMAGE BUFFER
// ============================================================================

/// Immutable encoded image plus its media type.
///
/// Cloning shares the underlying bytes, so handing the same buffer to the
/// display and to an outbound request never copies pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    data: Arc<[u8]>,
    media_type: String,
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("media_type", &self.media_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl ImageBuffer {
    /// Wrap bytes whose media type is already known (e.g. from an API response).
    pub fn new(data: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// Sniff the format from the bytes themselves. Non-image data is rejected.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IoError> {
        let format = image::guess_format(&bytes).map_err(|_| IoError::NotAnImage)?;
        let media_type = media_type_for(format).ok_or(IoError::NotAnImage)?;
        Ok(Self::new(bytes, media_type))
    }

    /// Encode a raster as PNG. Used for mask snapshots.
    pub fn encode_png(image: &RgbaImage) -> Result<Self, IoError> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
        Ok(Self::new(bytes, "image/png"))
    }

    pub fn from_base64(encoded: &str, media_type: impl Into<String>) -> Result<Self, IoError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Ok(Self::new(bytes, media_type))
    }

    /// Accepts `data:<mime>;base64,<payload>`; bare base64 is treated as PNG.
    pub fn from_data_url(url: &str) -> Result<Self, IoError> {
        match url
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
        {
            Some((mime, payload)) => Self::from_base64(payload, mime),
            None => Self::from_base64(url, DEFAULT_RESULT_MEDIA_TYPE),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same allocation, not just equal bytes. Cheap enough to call per frame.
    pub fn same_buffer(&self, other: &ImageBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub fn is_png(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("image/png")
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }

    pub fn decode(&self) -> Result<RgbaImage, IoError> {
        Ok(image::load_from_memory(&self.data)?.to_rgba8())
    }

    /// Natural pixel size.
    pub fn dimensions(&self) -> Result<(u32, u32), IoError> {
        let reader = image::io::Reader::new(Cursor::new(&self.data[..]))
            .with_guessed_format()
            .map_err(|e| IoError::Decode(image::ImageError::IoError(e)))?;
        Ok(reader.into_dimensions()?)
    }
}

fn media_type_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

// ============================================================================
// IMAGE STORE
// ============================================================================

/// The two image slots a session can hold: the structural source and an
/// optional style reference.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    source: Option<ImageBuffer>,
    style: Option<ImageBuffer>,
}

impl ImageStore {
    pub fn source(&self) -> Option<&ImageBuffer> {
        self.source.as_ref()
    }

    pub fn style(&self) -> Option<&ImageBuffer> {
        self.style.as_ref()
    }

    pub fn set_source(&mut self, image: Option<ImageBuffer>) {
        self.source = image;
    }

    pub fn set_style(&mut self, image: Option<ImageBuffer>) {
        self.style = image;
    }
}

// ============================================================================
// UPLOAD / DOWNLOAD
// ============================================================================

/// Load a user-selected file. Non-image files are rejected before anything
/// else sees them.
pub fn load_image_file(path: &Path) -> Result<ImageBuffer, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ImageBuffer::from_bytes(bytes)
}

/// Show the native open dialog and load the chosen image.
/// `Ok(None)` means the user cancelled.
pub fn pick_image_file(title: &str) -> Result<Option<ImageBuffer>, IoError> {
    let Some(path) = FileDialog::new()
        .set_title(title)
        .add_filter("Images", UPLOAD_EXTENSIONS)
        .pick_file()
    else {
        return Ok(None);
    };
    load_image_file(&path).map(Some)
}

/// `render-ai-<unix millis>.png`
pub fn download_filename(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("render-ai-{}.png", now.timestamp_millis())
}

/// Write a result to disk as PNG, re-encoding when the service returned
/// another format.
pub fn save_result(image: &ImageBuffer, path: &Path) -> Result<(), IoError> {
    let png;
    let bytes = if image.is_png() {
        image.data()
    } else {
        png = ImageBuffer::encode_png(&image.decode()?)?;
        png.data()
    };
    std::fs::write(path, bytes).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// "Save As" dialog pre-filled with the generated filename.
/// Returns the written path, or `None` when the user cancelled.
pub fn save_result_dialog(image: &ImageBuffer) -> Result<Option<PathBuf>, IoError> {
    let Some(path) = FileDialog::new()
        .set_file_name(download_filename(chrono::Utc::now()))
        .add_filter("PNG Image", &["png"])
        .save_file()
    else {
        return Ok(None);
    };
    save_result(image, &path)?;
    Ok(Some(path))
}
