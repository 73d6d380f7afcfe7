//! Room password rule.

/// Why a room password was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PasswordRuleViolation {
    #[error("Password must be 4-12 characters")]
    Length,
    #[error("Password must contain only letters and numbers")]
    Characters,
}

/// Validate a room password. An empty password means "no password" and is
/// always accepted; otherwise 4 to 12 ASCII letters or digits are required.
///
/// Length is counted in UTF-16 code units, as browser clients count it.
pub fn validate_password(password: &str) -> Result<(), PasswordRuleViolation> {
    if password.is_empty() {
        return Ok(());
    }
    let len = password.encode_utf16().count();
    if !(4..=12).contains(&len) {
        return Err(PasswordRuleViolation::Length);
    }
    if !password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PasswordRuleViolation::Characters);
    }
    Ok(())
}
