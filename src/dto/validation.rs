//! Validation helpers for client-supplied identifiers.

use validator::ValidationError;

/// Bounds on a room code's length.
const ROOM_CODE_MIN: usize = 3;
const ROOM_CODE_MAX: usize = 12;
/// Upper bound on a display name's length.
const PLAYER_NAME_MAX: usize = 24;

/// Validates that a room code is 3..=12 alphanumeric characters.
///
/// Codes are case-normalized to uppercase before storage, so both cases are
/// accepted here.
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.len() < ROOM_CODE_MIN || code.len() > ROOM_CODE_MAX {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be {ROOM_CODE_MIN}-{ROOM_CODE_MAX} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a player display name is non-blank and at most 24 characters.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("player_name_empty");
        err.message = Some("Player name must not be empty".into());
        return Err(err);
    }

    if name.chars().count() > PLAYER_NAME_MAX {
        let mut err = ValidationError::new("player_name_length");
        err.message =
            Some(format!("Player name must be at most {PLAYER_NAME_MAX} characters").into());
        return Err(err);
    }

    Ok(())
}

/// Normalize a room code the way the store keys it.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("ABC123").is_ok());
        assert!(validate_room_code("abc").is_ok());
        assert!(validate_room_code("A1B2C3D4E5F6").is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid() {
        assert!(validate_room_code("AB").is_err()); // too short
        assert!(validate_room_code("A1B2C3D4E5F6G").is_err()); // too long
        assert!(validate_room_code("ABC 12").is_err()); // space
        assert!(validate_room_code("ABC-12").is_err()); // punctuation
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("Alice").is_ok());
        assert!(validate_player_name("  ").is_err());
        assert!(validate_player_name(&"x".repeat(25)).is_err());
    }

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code(" abc123 "), "ABC123");
    }
}
