use crate::error::ApiError;
use crate::text::compact;

pub const MIN_QUERY_CHARS: usize = 2;

/// Trims the search text and rejects anything shorter than two characters,
/// or anything with no letters or digits left once folded to ASCII.
pub fn validate_query(value: &str) -> Result<&str, ApiError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "q must be at least {MIN_QUERY_CHARS} characters"
        )));
    }
    // an empty folded query is a substring of every slot
    if compact(trimmed).is_empty() {
        return Err(ApiError::BadRequest(
            "q must contain latin letters or digits".into(),
        ));
    }
    Ok(trimmed)
}
