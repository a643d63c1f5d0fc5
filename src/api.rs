//! Text generation against a locally hosted, Ollama-compatible endpoint.
//!
//! # Architecture
//!
//! - [`Generate`]: core trait, one prompt in, raw completion text out
//! - [`OllamaClient`]: `POST {base_url}/api/generate` with `stream: false`
//! - [`RetryGenerate`]: decorator that retries any [`Generate`] a fixed
//!   number of times
//!
//! # Retry Strategy
//!
//! A bounded number of attempts in total (3 by default), back to back with no
//! delay. Every failed attempt is logged; the last error is returned.
//!
//! Reasoning models prefix their answer with a `<think>…</think>` block;
//! [`strip_reasoning`] removes it.

use crate::config::LlmConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

const THINK_END: &str = "</think>";

/// Async text generation.
pub trait Generate {
    /// Send `prompt` and return the model's raw completion.
    async fn generate(&self, prompt: &str) -> Result<String, Box<dyn Error>>;
}

impl<T: Generate> Generate for &T {
    async fn generate(&self, prompt: &str) -> Result<String, Box<dyn Error>> {
        (**self).generate(prompt).await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    options: &'a serde_json::Value,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
    options: serde_json::Value,
}

impl OllamaClient {
    pub fn new(cfg: &LlmConfig) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            options: cfg.options.clone(),
        })
    }
}

impl Generate for OllamaClient {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            options: &self.options,
            stream: false,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "generation request failed with {status}: {}",
                crate::utils::truncate_for_log(&body, 200)
            )
            .into());
        }
        let parsed: GenerateResponse = response.json().await?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = parsed.response.chars().count(),
            "Generation finished"
        );
        Ok(parsed.response)
    }
}

/// Retries the wrapped generator up to `attempts` times in total.
pub struct RetryGenerate<T> {
    inner: T,
    attempts: usize,
}

impl<T: Generate> RetryGenerate<T> {
    pub fn new(inner: T, attempts: usize) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
        }
    }

    /// The undecorated generator, for calls that must not be retried.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryGenerate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerate")
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl<T: Generate> Generate for RetryGenerate<T> {
    #[instrument(level = "debug", skip_all)]
    async fn generate(&self, prompt: &str) -> Result<String, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= self.attempts => {
                    error!(
                        attempt,
                        max = self.attempts,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        error = %e,
                        "generate() exhausted attempts"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.attempts,
                        error = %e,
                        "generate() attempt failed; retrying"
                    );
                }
            }
        }
    }
}

/// Keep only the text after the reasoning block, trimmed, optionally
/// with newlines removed.
pub fn strip_reasoning(text: &str, remove_newlines: bool) -> String {
    let answer = match text.find(THINK_END) {
        Some(pos) => &text[pos + THINK_END.len()..],
        None => text,
    };
    let answer = answer.trim();
    if remove_newlines {
        answer.replace('\n', "")
    } else {
        answer.to_string()
    }
}
