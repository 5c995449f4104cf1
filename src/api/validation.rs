use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::api::errors::ApiError;

/// A base64 image accepted for schedule analysis.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ImagePayload<'a> {
    pub(crate) base64: &'a str,
    pub(crate) mime_type: String,
}

/// Checks the declared mime type against the allow-list and the decoded size against the
/// upload limit. A `data:<mime>;base64,` prefix is stripped.
pub(crate) fn validate_image_payload<'a>(
    image_base64: &'a str,
    mime_type: &str,
    allowed_types: &[String],
    max_bytes: u64,
) -> Result<ImagePayload<'a>, ApiError> {
    let mime = mime_type.trim().to_ascii_lowercase();
    if !allowed_types.iter().any(|allowed| allowed == &mime) {
        return Err(ApiError::BadRequest(format!("MIME type '{mime}' is not allowed")));
    }

    let encoded = match image_base64.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image_base64,
    }
    .trim();

    // Decoded size is known from the encoded length; reject before decoding anything large.
    let approx_bytes = (encoded.len() as u64 / 4) * 3;
    if approx_bytes > max_bytes {
        return Err(ApiError::BadRequest(format!(
            "Image exceeds the upload limit of {} MB",
            max_bytes / (1024 * 1024)
        )));
    }

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::BadRequest("Image data is not valid base64".to_string()))?;
    if decoded.is_empty() {
        return Err(ApiError::BadRequest("Image data is empty".to_string()));
    }

    Ok(ImagePayload { base64: encoded, mime_type: mime })
}
