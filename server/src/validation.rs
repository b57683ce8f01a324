use base64::Engine;
use tts_core::JobId;

use crate::error::ApiError;

/// Largest accepted reference clip after base64 decoding.
pub const MAX_REFERENCE_AUDIO_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Parse a job id from a path segment.
pub fn validate_job_id(id: &str) -> Result<JobId, ApiError> {
    JobId::parse_str(id.trim())
        .map_err(|_| ApiError::InvalidInput(format!("Invalid job id: {}", id)))
}

/// Decode a base64 reference clip. A `data:` URL prefix is accepted.
pub fn decode_reference_audio(encoded: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(ApiError::InvalidInput("Reference audio is empty".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| ApiError::InvalidInput(format!("Reference audio is not valid base64: {}", e)))?;
    if bytes.len() > MAX_REFERENCE_AUDIO_BYTES {
        return Err(ApiError::InvalidInput(format!(
            "Reference audio too large (max {} bytes)",
            MAX_REFERENCE_AUDIO_BYTES
        )));
    }
    Ok(bytes)
}

pub fn history_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}
