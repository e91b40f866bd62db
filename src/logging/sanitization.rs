use regex::Regex;
use std::sync::OnceLock;

/// Patterns for credentials that travel in URLs, form bodies and headers
pub struct CredentialPatterns {
    query_credential: Regex,
    bracketed_credential: Regex,
    bearer_token: Regex,
}

static PATTERNS: OnceLock<CredentialPatterns> = OnceLock::new();

pub fn get_patterns() -> &'static CredentialPatterns {
    PATTERNS.get_or_init(|| CredentialPatterns {
        // access_token=..., user_key=..., app_key=..., service_token=..., provider_key=...
        query_credential: Regex::new(
            r"\b(access_token|user_key|app_key|service_token|provider_key)=[^&\s]+",
        )
        .expect("query credential pattern compiles"),

        // transactions[0][user_key]=... in report bodies
        bracketed_credential: Regex::new(
            r"(\[(?:user_key|app_key|access_token)\])=[^&\s]+",
        )
        .expect("bracketed credential pattern compiles"),

        bearer_token: Regex::new(r"Bearer\s+[a-zA-Z0-9\-_\.]+")
            .expect("bearer token pattern compiles"),
    })
}

/// Replace credential values in a URL or log line with `[REDACTED]`.
///
/// Parameter names stay visible so the line remains useful for debugging:
/// `https://cp.example.com/x.json?access_token=abc` becomes
/// `https://cp.example.com/x.json?access_token=[REDACTED]`.
pub fn redact_credentials(message: &str) -> String {
    let patterns = get_patterns();
    let result = patterns
        .query_credential
        .replace_all(message, "$1=[REDACTED]");
    let result = patterns
        .bracketed_credential
        .replace_all(&result, "$1=[REDACTED]");
    patterns
        .bearer_token
        .replace_all(&result, "Bearer [REDACTED]")
        .into_owned()
}

/// Mask a secret for structured fields, keeping a short prefix for correlation
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}****")
}
