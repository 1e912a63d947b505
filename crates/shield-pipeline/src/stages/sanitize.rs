//! Sanitize stage (spec.md §4.2 step 1): redact PII patterns from the claim
//! text and evidence, emitting category tags.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Small, deliberately non-exhaustive pattern table (spec.md SPEC_FULL.md
/// §4.2 [SUPPLEMENT]: "this crate's Non-goals only exclude
/// compliance-taxonomy construction, not a working redaction scanner").
static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}[-.]\d{3}[-.]\d{4}\b").unwrap());

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SanitizeOutput {
    pub redacted_text: String,
    pub redacted_evidence: Vec<String>,
    pub categories: Vec<String>,
}

fn redact(text: &str, categories: &mut Vec<String>) -> String {
    let mut out = text.to_string();
    if SSN_RE.is_match(&out) {
        categories.push("ssn".to_string());
        out = SSN_RE.replace_all(&out, "[REDACTED_SSN]").to_string();
    }
    if EMAIL_RE.is_match(&out) {
        categories.push("email".to_string());
        out = EMAIL_RE.replace_all(&out, "[REDACTED_EMAIL]").to_string();
    }
    if PHONE_RE.is_match(&out) {
        categories.push("phone".to_string());
        out = PHONE_RE.replace_all(&out, "[REDACTED_PHONE]").to_string();
    }
    out
}

/// Pure, infallible transformation — the only failure mode named in
/// spec.md is "scanner exception after retries", which a regex scan over
/// a `&str` cannot raise, so this stage has no error type.
pub fn run(text: &str, evidence: &[String]) -> SanitizeOutput {
    let mut categories = Vec::new();
    let redacted_text = redact(text, &mut categories);
    let redacted_evidence = evidence.iter().map(|e| redact(e, &mut categories)).collect();
    categories.sort();
    categories.dedup();
    SanitizeOutput {
        redacted_text,
        redacted_evidence,
        categories,
    }
}
