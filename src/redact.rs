//! Identifier redaction for log output.
//!
//! Session keys, nullifiers and emails never reach the logs in full.

const VISIBLE_PREFIX: usize = 8;
const VISIBLE_EMAIL_PREFIX: usize = 3;

/// Keep the first eight characters of an identifier.
#[must_use]
pub fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(VISIBLE_PREFIX).collect();
    format!("{prefix}...")
}

/// Keep the first three characters of an email address and hide the domain.
#[must_use]
pub fn redact_email(email: &str) -> String {
    let prefix: String = email.chars().take(VISIBLE_EMAIL_PREFIX).collect();
    format!("{prefix}***@***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_truncates_long_values() {
        let key = "a".repeat(64);
        assert_eq!(redact(&key), "aaaaaaaa...");
    }

    #[test]
    fn redact_handles_short_and_multibyte_values() {
        assert_eq!(redact("abc"), "abc...");
        assert_eq!(redact("ñññññññññ"), "ññññññññ...");
    }

    #[test]
    fn redact_email_hides_domain() {
        assert_eq!(redact_email("alice@example.com"), "ali***@***");
    }
}
