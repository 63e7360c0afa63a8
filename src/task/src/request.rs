//! The HTTP call a task describes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpRequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub allow_redirects: Option<bool>,
}

impl HttpRequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: HashMap::new(),
            payload: None,
            timeout: None,
            allow_redirects: None,
        }
    }

    pub fn post(url: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: HashMap::new(),
            payload: Some(payload.into()),
            timeout: None,
            allow_redirects: None,
        }
    }

    /// Default `allow_redirects` per spec.md §4.3: `true` for GET/OPTIONS,
    /// `false` for HEAD, omitted (i.e. `None`, left to the fetcher's own
    /// default) otherwise.
    pub fn resolved_allow_redirects(&self) -> Option<bool> {
        if let Some(explicit) = self.allow_redirects {
            return Some(explicit);
        }
        match self.method.to_uppercase().as_str() {
            "GET" | "OPTIONS" => Some(true),
            "HEAD" => Some(false),
            _ => None,
        }
    }

    /// Whether `payload` should be sent for this method (POST/PUT/PATCH).
    pub fn sends_payload(&self) -> bool {
        matches!(self.method.to_uppercase().as_str(), "POST" | "PUT" | "PATCH")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_redirects_match_method() {
        assert_eq!(HttpRequestSpec::get("http://x").resolved_allow_redirects(), Some(true));
        let mut head = HttpRequestSpec::get("http://x");
        head.method = "HEAD".to_string();
        assert_eq!(head.resolved_allow_redirects(), Some(false));
        let mut post = HttpRequestSpec::post("http://x", "{}");
        assert_eq!(post.resolved_allow_redirects(), None);
        post.allow_redirects = Some(true);
        assert_eq!(post.resolved_allow_redirects(), Some(true));
    }

    #[test]
    fn payload_only_sent_for_write_methods() {
        assert!(HttpRequestSpec::post("http://x", "{}").sends_payload());
        assert!(!HttpRequestSpec::get("http://x").sends_payload());
    }
}
