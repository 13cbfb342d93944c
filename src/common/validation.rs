// src/common/validation.rs

use validator::ValidationError;

// Texto só com espaços conta como vazio
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
