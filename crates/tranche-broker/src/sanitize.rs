//! Redaction of credentials and masking of identifiers.

use zeroize::Zeroizing;

/// Maximum length, in characters, of a sanitized message.
pub const MAX_MESSAGE_LEN: usize = 256;

const REDACTED: &str = "***";

/// Removes credentials from text that is logged or stored.
#[derive(Default)]
pub struct Sanitizer {
    secrets: Vec<Zeroizing<String>>,
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a literal secret (e.g. the API token) to redact.
    #[must_use]
    pub fn with_secret(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.secrets.push(Zeroizing::new(secret.to_string()));
        }
        self
    }

    /// Redact secrets, bearer tokens and `token=` values, then truncate.
    pub fn sanitize(&self, message: &str) -> String {
        let mut out = message.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), REDACTED);
        }
        out = redact_after(&out, "bearer ", |c| c.is_whitespace() || c == '"');
        out = redact_after(&out, "token=", |c| {
            c.is_whitespace() || c == '&' || c == '"'
        });
        truncate(&out, MAX_MESSAGE_LEN)
    }
}

/// Replace the value following each ASCII case-insensitive `marker`.
fn redact_after(input: &str, marker: &str, is_end: impl Fn(char) -> bool) -> String {
    // ASCII lowercasing keeps byte offsets identical.
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut pos = 0;

    while let Some(found) = lower[pos..].find(marker) {
        let value_start = pos + found + marker.len();
        out.push_str(&input[pos..value_start]);

        let value_len = input[value_start..]
            .char_indices()
            .find(|&(_, c)| is_end(c))
            .map_or(input.len() - value_start, |(i, _)| i);
        if value_len > 0 {
            out.push_str(REDACTED);
        }
        pos = value_start + value_len;
    }

    out.push_str(&input[pos..]);
    out
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}

/// Mask an identifier for diagnostic logs.
///
/// Keeps the first and last four characters of ids longer than eight
/// characters.
pub fn mask_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_configured_secret() {
        let sanitizer = Sanitizer::new().with_secret("t.s3cr3t");
        let out = sanitizer.sanitize("auth failed for t.s3cr3t on account");
        assert_eq!(out, "auth failed for *** on account");
    }

    #[test]
    fn test_redacts_bearer_and_query_token() {
        let sanitizer = Sanitizer::new();
        let out = sanitizer.sanitize("header Authorization: Bearer abc.def url ?token=xyz&x=1");
        assert_eq!(out, "header Authorization: Bearer *** url ?token=***&x=1");

        let out = sanitizer.sanitize(r#"{"auth":"bearer QWE"}"#);
        assert_eq!(out, r#"{"auth":"bearer ***"}"#);
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let long = "я".repeat(300);
        let out = Sanitizer::new().sanitize(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_LEN);

        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_mask_id() {
        assert_eq!(mask_id("tr-1234567890"), "tr-1****7890");
        assert_eq!(mask_id("12345678"), "****");
        assert_eq!(mask_id(""), "****");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let sanitizer = Sanitizer::new().with_secret("hunter2");
        assert!(!format!("{sanitizer:?}").contains("hunter2"));
    }
}
