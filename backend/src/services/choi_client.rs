//! Deterministic "Choi" judgement adapter (spec §4.11 step 5, §6.4).
//!
//! Only the interface is specified; the algorithm itself is an external
//! collaborator. A schema mismatch on required response keys is fatal
//! (`BackendSchemaError`); HTTP 5xx is retried up to `max_retries`; HTTP 4xx
//! is fatal. The orchestrator treats every error from this client as a
//! soft failure and continues without a judgement.

use crate::config::BackendConfig;
use crate::llm::retry::sleep_with_backoff;
use crate::models::response::ChoiJudgement;
use crate::utils::error::AppError;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct ChoiClient {
    http: reqwest::Client,
    backend_url: Option<String>,
    auth_token: Option<String>,
    max_retries: u32,
    retry_delay_secs: f64,
}

impl ChoiClient {
    pub fn new(config: &BackendConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            http,
            backend_url: config.url.clone(),
            auth_token: config.auth_token.clone(),
            max_retries: config.max_retries,
            retry_delay_secs: config.retry_delay_secs,
        }
    }

    /// POSTs `{input_data, cell_ids, time_range, compare_mode}` to
    /// `<backend>/api/kpi/choi-analysis` (spec §6.4).
    pub async fn judge(
        &self,
        input_data: Value,
        cell_ids: Vec<String>,
        time_range: &str,
        compare_mode: &str,
    ) -> Result<ChoiJudgement, AppError> {
        let Some(base) = self.backend_url.as_deref() else {
            return Err(AppError::BackendHttp {
                message: "no backend URL configured for deterministic judgement".to_string(),
                status: None,
            });
        };
        let url = format!("{}/api/kpi/choi-analysis", base.trim_end_matches('/'));
        let body = json!({
            "input_data": input_data,
            "cell_ids": cell_ids,
            "time_range": time_range,
            "compare_mode": compare_mode,
        });

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut req = self.http.post(&url).json(&body);
            if let Some(token) = &self.auth_token {
                req = req.header("Authorization", format!("Bearer {token}"));
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let value: Value = resp.json().await.map_err(|err| AppError::BackendSchema {
                            message: format!("response body was not valid JSON: {err}"),
                        })?;
                        return parse_choi_response(value, started.elapsed().as_millis() as u64);
                    }
                    if status.as_u16() >= 500 && attempt <= self.max_retries {
                        sleep_with_backoff(attempt, self.retry_delay_secs).await;
                        continue;
                    }
                    return Err(AppError::BackendHttp {
                        message: format!("deterministic judgement backend returned HTTP {status}"),
                        status: Some(status.as_u16()),
                    });
                },
                Err(err) => {
                    if err.is_timeout() {
                        return Err(AppError::BackendTimeout { message: err.to_string() });
                    }
                    if attempt <= self.max_retries {
                        sleep_with_backoff(attempt, self.retry_delay_secs).await;
                        continue;
                    }
                    return Err(AppError::BackendHttp { message: err.to_string(), status: None });
                },
            }
        }
    }
}

/// Validates `{algorithm_version, kpi_judgement:{overall,reasons,by_kpi}}`
/// are present (spec §6.4); everything else is optional.
fn parse_choi_response(value: Value, processing_time_ms: u64) -> Result<ChoiJudgement, AppError> {
    let missing = |field: &str| AppError::BackendSchema { message: format!("response missing required field '{field}'") };

    let algorithm_version = value
        .get("algorithm_version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing("algorithm_version"))?
        .to_string();

    let kpi_judgement = value.get("kpi_judgement").ok_or_else(|| missing("kpi_judgement"))?;

    let overall = kpi_judgement
        .get("overall")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing("kpi_judgement.overall"))?
        .to_string();

    let reasons = kpi_judgement
        .get("reasons")
        .and_then(|v| v.as_array())
        .ok_or_else(|| missing("kpi_judgement.reasons"))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let by_kpi = kpi_judgement
        .get("by_kpi")
        .and_then(|v| v.as_object())
        .ok_or_else(|| missing("kpi_judgement.by_kpi"))?
        .clone();

    let abnormal_detection = value.get("abnormal_detection").cloned();

    let warnings = value
        .get("processing_warnings")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Ok(ChoiJudgement { overall, reasons, by_kpi, abnormal_detection, warnings, algorithm_version, processing_time_ms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_response_missing_kpi_judgement() {
        let err = parse_choi_response(json!({ "algorithm_version": "v1" }), 5).unwrap_err();
        assert!(matches!(err, AppError::BackendSchema { .. }));
    }

    #[test]
    fn accepts_minimal_well_formed_response() {
        let value = json!({
            "algorithm_version": "v1",
            "kpi_judgement": { "overall": "ok", "reasons": [], "by_kpi": {} },
        });
        let judgement = parse_choi_response(value, 12).unwrap();
        assert_eq!(judgement.overall, "ok");
        assert_eq!(judgement.algorithm_version, "v1");
        assert!(judgement.abnormal_detection.is_none());
        assert!(judgement.warnings.is_empty());
    }

    #[test]
    fn surfaces_optional_abnormal_detection_and_warnings() {
        let value = json!({
            "algorithm_version": "v2",
            "kpi_judgement": { "overall": "degraded", "reasons": ["r1"], "by_kpi": { "throughput": "ok" } },
            "abnormal_detection": { "flag": true },
            "processing_warnings": ["stale cache"],
        });
        let judgement = parse_choi_response(value, 3).unwrap();
        assert_eq!(judgement.reasons, vec!["r1".to_string()]);
        assert!(judgement.abnormal_detection.is_some());
        assert_eq!(judgement.warnings, vec!["stale cache".to_string()]);
    }
}
