//! Input validation for API requests.

/// Maximum length of a message role, in characters
pub const MAX_ROLE_LENGTH: usize = 20;

/// Validate a message role (e.g. "user", "assistant"). Any string up to
/// the length limit is accepted, including an empty one.
pub fn validate_role(role: &str) -> Result<(), String> {
    if role.chars().count() > MAX_ROLE_LENGTH {
        return Err(format!(
            "Role is too long (max {} characters)",
            MAX_ROLE_LENGTH
        ));
    }

    Ok(())
}
