use crate::error::ApiError;

/// Maximum text length for synthesis requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Longest accepted audio file name
const MAX_FILE_NAME_LENGTH: usize = 128;

/// Validate text submitted for synthesis
pub fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    validate_text_length(text)
}

/// Length check only; blank text passes.
pub fn validate_text_length(text: &str) -> Result<(), ApiError> {
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate a generated audio file name: a bare `*.wav` name with no path
/// components.
pub fn validate_audio_file_name(name: &str) -> Result<(), ApiError> {
    let bare = !name.is_empty()
        && name.len() <= MAX_FILE_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.contains("..");
    if !bare || !name.ends_with(".wav") {
        return Err(ApiError::NotFound("Audio file not found".to_string()));
    }
    Ok(())
}
