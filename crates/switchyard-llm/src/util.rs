//! Common helpers for provider handling

/// Minimum key length to display partial key
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 8;

/// Number of characters to show at start/end of masked key
const KEY_MASK_VISIBLE_CHARS: usize = 4;

/// Sensitive patterns to filter from error messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "api_key",
    "api-key",
    "apikey",
    "authorization",
    "bearer",
    "token",
    "secret",
    "password",
    "credential",
];

/// Mask API key for safe display in logs
///
/// Shows first 4 and last 4 characters for keys longer than 8 characters,
/// otherwise shows "****".
///
/// # Examples
/// ```
/// use switchyard_llm::util::mask_api_key;
/// assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
/// assert_eq!(mask_api_key("short"), "****");
/// ```
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return "****".to_string();
    }
    let head: String = chars[..KEY_MASK_VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - KEY_MASK_VISIBLE_CHARS..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Sanitize error message for operator display
///
/// Messages that mention credentials are replaced by a generic one.
///
/// # Examples
/// ```
/// use switchyard_llm::util::sanitize_error_for_user;
/// assert_eq!(
///     sanitize_error_for_user("Invalid api_key provided"),
///     "An API error occurred. Please try again."
/// );
/// assert_eq!(sanitize_error_for_user("Connection timeout"), "Connection timeout");
/// ```
#[must_use]
pub fn sanitize_error_for_user(error: &str) -> String {
    let lower = error.to_lowercase();
    if SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "An API error occurred. Please try again.".to_string();
    }
    error.to_string()
}

/// Validate API key is not empty and has minimum length
///
/// Returns an error message if validation fails, None if valid.
#[must_use]
pub fn validate_api_key(key: &str, provider_name: &str) -> Option<String> {
    if key.trim().is_empty() {
        return Some(format!("{} API key is required", provider_name));
    }
    if key.len() < MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return Some(format!(
            "{} API key appears to be invalid (too short)",
            provider_name
        ));
    }
    None
}

/// Truncate an upstream body for inclusion in an error message
#[must_use]
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let mut out: String = body.chars().take(max_chars).collect();
    if body.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
