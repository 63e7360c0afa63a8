//! # Asynx HTTPFetcher
//!
//! Executes one described HTTP call and returns a captured response
//! (status, headers, body, redirect history). Treated as an opaque
//! collaborator by the task-lifecycle layer — this crate only needs to be
//! correct, not clever.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("request build error: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Transport(String),
}

/// One captured HTTP response, or intermediate redirect hop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturedResponse {
    pub url: String,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub content: String,
    pub history: Vec<CapturedResponse>,
    pub reason: String,
}

/// Input describing the HTTP call to perform, matching the persisted
/// `request` task field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub allow_redirects: Option<bool>,
}

#[async_trait]
pub trait HTTPFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<CapturedResponse, FetchError>;
}

/// Default [`HTTPFetcher`] backed by `reqwest`.
#[derive(Debug, Default, Clone)]
pub struct ReqwestFetcher;

#[async_trait]
impl HTTPFetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<CapturedResponse, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;

        let allow_redirects = request.allow_redirects.unwrap_or(true);
        let history: Arc<Mutex<Vec<CapturedResponse>>> = Arc::new(Mutex::new(Vec::new()));
        let history_for_policy = history.clone();

        let mut builder = reqwest::Client::builder();
        builder = if allow_redirects {
            let history_capture = history_for_policy;
            builder.redirect(reqwest::redirect::Policy::custom(move |attempt| {
                let mut hops = history_capture.lock().unwrap();
                hops.push(CapturedResponse {
                    url: attempt.url().to_string(),
                    status_code: attempt.status().as_u16(),
                    headers: HashMap::new(),
                    content: String::new(),
                    history: Vec::new(),
                    reason: attempt
                        .status()
                        .canonical_reason()
                        .unwrap_or_default()
                        .to_string(),
                });
                if hops.len() > 20 {
                    attempt.error("too many redirects")
                } else {
                    attempt.follow()
                }
            }))
        } else {
            builder.redirect(reqwest::redirect::Policy::none())
        };

        if let Some(timeout) = request.timeout_seconds {
            builder = builder.timeout(Duration::from_secs_f64(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;

        let mut req = client.request(method.clone(), &request.url);
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
            if let Some(data) = &request.data {
                req = req.body(data.clone());
            }
        }

        let response = req
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status_code = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let content = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(CapturedResponse {
            url,
            status_code,
            headers,
            content,
            history: Arc::try_unwrap(history)
                .map(|m| m.into_inner().unwrap())
                .unwrap_or_default(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_invalid_method() {
        let fetcher = ReqwestFetcher;
        let err = fetcher
            .fetch(FetchRequest {
                method: "  ".to_string(),
                url: "http://example.invalid".to_string(),
                headers: HashMap::new(),
                data: None,
                timeout_seconds: Some(1.0),
                allow_redirects: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidMethod(_)));
    }
}
