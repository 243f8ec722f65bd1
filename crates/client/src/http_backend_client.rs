//! Why a shared `reqwest::Client`: submit, query and TTS each need a
//! different ceiling, so timeouts are set per request builder rather than on
//! the client default, while the connection pool is still shared across all
//! three call sites and every GPU.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use voice_agent_core::traits::{BackendClient, BackendPhase, QueryReply, SubmitOptions, SubmitOutcome};
use voice_agent_core::ErrorKind;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct HttpBackendClientConfig {
    pub submit_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub tts_timeout_ms: u64,
    pub min_tts_bytes: usize,
}

impl Default for HttpBackendClientConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 30_000,
            query_timeout_ms: 10_000,
            tts_timeout_ms: 20 * 60 * 1000,
            min_tts_bytes: 10 * 1024,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    video_url: &'a str,
    code: &'a str,
    chaofen: u8,
    watermark_switch: u8,
    pn: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    progress: i64,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    reference_audio: &'a str,
    reference_text: &'a str,
    format: &'a str,
}

pub struct HttpBackendClient {
    config: HttpBackendClientConfig,
    client: reqwest::Client,
}

impl HttpBackendClient {
    pub fn new(config: HttpBackendClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client with default config never fails to build");
        Self { config, client }
    }

    fn endpoint(port: u16, path: &str) -> String {
        format!("http://localhost:{port}{path}")
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn submit(
        &self,
        inference_port: u16,
        task_code: &str,
        container_video_path: &str,
        container_audio_path: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, ErrorKind> {
        let body = SubmitRequest {
            audio_url: container_audio_path,
            video_url: container_video_path,
            code: task_code,
            chaofen: options.superres as u8,
            watermark_switch: options.watermark as u8,
            pn: options.pn,
        };

        let resp = self
            .client
            .post(Self::endpoint(inference_port, "/easy/submit"))
            .timeout(Duration::from_millis(self.config.submit_timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorKind::from(&ClientError::Transport(e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%status, code = task_code, "submit rejected with non-2xx status");
            return Ok(SubmitOutcome::Rejected);
        }

        let parsed: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| ErrorKind::from(&ClientError::Transport(e)))?;

        Ok(if parsed.success { SubmitOutcome::Accepted } else { SubmitOutcome::Rejected })
    }

    async fn query(&self, inference_port: u16, task_code: &str) -> Result<QueryReply, ErrorKind> {
        let resp = self
            .client
            .get(Self::endpoint(inference_port, "/easy/query"))
            .query(&[("code", task_code)])
            .timeout(Duration::from_millis(self.config.query_timeout_ms))
            .send()
            .await
            .map_err(|e| ErrorKind::from(&ClientError::QueryTransient(e.to_string())))?;

        if !resp.status().is_success() {
            return Err(ErrorKind::from(&ClientError::QueryTransient(format!(
                "status {}",
                resp.status()
            ))));
        }

        let parsed: QueryEnvelope = resp
            .json()
            .await
            .map_err(|e| ErrorKind::from(&ClientError::QueryTransient(e.to_string())))?;

        debug!(code = task_code, status = parsed.data.status, progress = parsed.data.progress, "query reply");

        Ok(QueryReply {
            phase: BackendPhase::from_status_code(parsed.data.status),
            progress_pct: parsed.data.progress.clamp(0, 100) as u8,
            result_descriptor: parsed.data.result,
            error_message: parsed.data.msg,
        })
    }

    async fn tts_invoke(
        &self,
        tts_port: u16,
        text: &str,
        reference_audio_container_path: &str,
        format: &str,
    ) -> Result<Vec<u8>, ErrorKind> {
        let body = TtsRequest {
            text,
            reference_audio: reference_audio_container_path,
            reference_text: "",
            format,
        };

        let resp = self
            .client
            .post(Self::endpoint(tts_port, "/v1/invoke"))
            .timeout(Duration::from_millis(self.config.tts_timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorKind::from(&ClientError::Tts(e.to_string())))?;

        if !resp.status().is_success() {
            return Err(ErrorKind::from(&ClientError::Tts(format!("status {}", resp.status()))));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ErrorKind::from(&ClientError::Tts(e.to_string())))?;

        if bytes.len() < self.config.min_tts_bytes {
            return Err(ErrorKind::from(&ClientError::Tts(format!(
                "undersized response: {} bytes",
                bytes.len()
            ))));
        }

        Ok(bytes.to_vec())
    }

    /// Best-effort; a non-2xx or transport failure is logged and swallowed
    /// since leaving VRAM held is worse than the task noticing an unload
    /// failure.
    async fn unload(&self, tts_port: u16) -> Result<(), ErrorKind> {
        let resp = self
            .client
            .post(Self::endpoint(tts_port, "/v1/unload"))
            .timeout(Duration::from_millis(self.config.query_timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => Ok(()),
            Ok(r) => {
                warn!(status = %r.status(), tts_port, "tts unload rejected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, tts_port, "tts unload request failed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_sane_timeouts() {
        let config = HttpBackendClientConfig::default();
        assert_eq!(config.submit_timeout_ms, 30_000);
        assert_eq!(config.query_timeout_ms, 10_000);
        assert_eq!(config.min_tts_bytes, 10 * 1024);
    }

    #[test]
    fn endpoint_builds_localhost_url() {
        assert_eq!(HttpBackendClient::endpoint(8390, "/easy/submit"), "http://localhost:8390/easy/submit");
    }
}
