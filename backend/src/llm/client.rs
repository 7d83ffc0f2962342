//! Multi-endpoint failover chat-completion client (C5, spec §4.7).

use super::extract::extract_json;
use super::retry::{is_retryable_status, sleep_with_backoff};
use super::token::{estimate_tokens, truncate_prompt_if_needed, validate_prompt};
use crate::config::LlmConfig;
use crate::utils::error::{AppError, LlmErrorKind};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client builds with static configuration");
        Self { config, http }
    }

    pub fn estimate_tokens(&self, text: &str) -> u64 {
        estimate_tokens(text, self.config.chars_per_token)
    }

    pub fn validate_prompt(&self, text: &str) -> bool {
        validate_prompt(text, self.config.max_tokens, self.config.max_prompt_chars, self.config.chars_per_token)
    }

    pub fn truncate_prompt_if_needed(&self, text: &str) -> String {
        truncate_prompt_if_needed(text, self.config.max_prompt_chars)
    }

    /// Main entry point (spec §4.7 control flow, steps 1-7).
    pub async fn analyze_data(&self, prompt: &str, enable_mock: bool) -> Result<Value, AppError> {
        if enable_mock || self.config.mock_enabled {
            return Ok(self.mock_response(prompt));
        }

        let prompt = if self.validate_prompt(prompt) {
            prompt.to_string()
        } else {
            self.truncate_prompt_if_needed(prompt)
        };

        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let mut last_err: Option<AppError> = None;
        for endpoint in &self.config.endpoints {
            match self.call_endpoint(endpoint, &body).await {
                Ok(value) => return Ok(value),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::Llm {
            kind: LlmErrorKind::Client,
            message: "no LLM endpoints configured".to_string(),
            is_retryable: false,
            endpoints: self.config.endpoints.clone(),
        }))
    }

    async fn call_endpoint(&self, endpoint: &str, body: &Value) -> Result<Value, AppError> {
        let url = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut req = self.http.post(&url).json(body);
            if let Some(header) = self.authorization_header() {
                req = req.header("Authorization", header);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let value: Value = resp.json().await.map_err(|err| AppError::Llm {
                            kind: LlmErrorKind::Parse,
                            message: err.to_string(),
                            is_retryable: false,
                            endpoints: vec![endpoint.to_string()],
                        })?;
                        return self.parse_completion(value, endpoint);
                    }
                    if is_retryable_status(status.as_u16()) && attempt <= self.config.max_retries {
                        sleep_with_backoff(attempt, self.config.retry_delay_secs).await;
                        continue;
                    }
                    return Err(AppError::Llm {
                        kind: classify_status(status),
                        message: format!("endpoint {endpoint} returned HTTP {status}"),
                        is_retryable: is_retryable_status(status.as_u16()),
                        endpoints: vec![endpoint.to_string()],
                    });
                },
                Err(err) => {
                    if attempt <= self.config.max_retries {
                        sleep_with_backoff(attempt, self.config.retry_delay_secs).await;
                        continue;
                    }
                    let kind = if err.is_timeout() { LlmErrorKind::Timeout } else { LlmErrorKind::Server };
                    return Err(AppError::Llm {
                        kind,
                        message: err.to_string(),
                        is_retryable: true,
                        endpoints: vec![endpoint.to_string()],
                    });
                },
            }
        }
    }

    fn parse_completion(&self, value: Value, endpoint: &str) -> Result<Value, AppError> {
        let content = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .or_else(|| value.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| AppError::Llm {
                kind: LlmErrorKind::Parse,
                message: "response carried no message content".to_string(),
                is_retryable: false,
                endpoints: vec![endpoint.to_string()],
            })?;

        extract_json(content).ok_or_else(|| AppError::Llm {
            kind: LlmErrorKind::Parse,
            message: "no JSON object could be extracted from the model response".to_string(),
            is_retryable: false,
            endpoints: vec![endpoint.to_string()],
        })
    }

    /// Any configured API key triggers the header, local provider included
    /// (grounded on the original's `_create_session`/header-assembly rule).
    fn authorization_header(&self) -> Option<String> {
        self.config.api_key.as_ref().map(|key| format!("Bearer {key}"))
    }

    fn mock_response(&self, prompt: &str) -> Value {
        json!({
            "executive_summary": "Mock analysis generated without calling an LLM endpoint.",
            "diagnostic_findings": ["Mock mode is enabled; no real diagnostic was performed."],
            "recommended_actions": ["Disable enable_mock to receive a real analysis."],
            "model_used": self.config.model,
            "_mock": true,
            "_prompt_chars": prompt.chars().count(),
        })
    }
}

fn classify_status(status: StatusCode) -> LlmErrorKind {
    if status == StatusCode::REQUEST_TIMEOUT {
        LlmErrorKind::Timeout
    } else if status.is_client_error() {
        LlmErrorKind::Client
    } else {
        LlmErrorKind::Server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            provider: "local".to_string(),
            model: "Gemma-3-27B".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout_secs: 5,
            max_retries: 1,
            retry_delay_secs: 0.01,
            api_key: None,
            endpoints: vec!["http://localhost:9".to_string()],
            mock_enabled: false,
            chars_per_token: 4.0,
            max_prompt_chars: 80_000,
        }
    }

    #[tokio::test]
    async fn mock_mode_never_hits_the_network() {
        let client = LlmClient::new(config());
        let result = client.analyze_data("any prompt", true).await.unwrap();
        assert_eq!(result["_mock"], true);
    }

    #[test]
    fn no_auth_header_without_api_key() {
        let client = LlmClient::new(config());
        assert!(client.authorization_header().is_none());
    }

    #[test]
    fn auth_header_present_whenever_api_key_is_set() {
        let mut cfg = config();
        cfg.api_key = Some("secret".to_string());
        let client = LlmClient::new(cfg);
        assert_eq!(client.authorization_header().unwrap(), "Bearer secret");
    }
}
