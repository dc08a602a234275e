//! 생성 모델 모듈 - Ollama `/api/generate` 클라이언트
//!
//! 배치 생성(전체 텍스트)과 스트리밍 생성(텍스트 조각 순서대로)을 지원합니다.
//! 스트리밍 응답은 NDJSON 한 줄당 `{"response": "...", "done": false}` 형식입니다.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// 생성된 텍스트 조각 스트림 (모델 생성 순서 유지)
pub type TextStream = BoxStream<'static, Result<String>>;

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 생성 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 전체 답변 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 스트리밍 생성
    ///
    /// 스트림을 drop하면 HTTP 응답 본문도 drop되어 생성이 중단됩니다.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama LLM
// ============================================================================

/// Ollama 생성 모델
#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaLlm {
    /// 설정에서 생성
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RagError::ModelResponse(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(
            client,
            config.ollama_endpoint(),
            &config.ollama_model,
        ))
    }

    /// HTTP 클라이언트를 공유하여 생성
    pub fn with_client(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::unreachable(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::ModelResponse(format!(
                "Ollama generation error ({}): {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OllamaLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::debug!("Generating answer with model: {}", self.model);

        let body = self
            .send(prompt, false)
            .await?
            .text()
            .await
            .map_err(|e| RagError::unreachable(&self.endpoint, e))?;

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::ModelResponse(format!("Failed to parse generation response: {}", e))
        })?;

        if let Some(error) = parsed.error {
            return Err(RagError::ModelResponse(error));
        }

        Ok(parsed.response)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        tracing::debug!("Streaming answer with model: {}", self.model);

        let response = self.send(prompt, true).await?;
        Ok(decode_ndjson_stream(Box::pin(response.bytes_stream())))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// NDJSON Decoding
// ============================================================================

/// 바이트 청크를 줄 단위로 모으는 버퍼
///
/// 청크 경계가 줄이나 UTF-8 문자 중간에 걸쳐도 안전합니다.
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 완성된 한 줄 꺼내기
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// 남은 내용 (마지막 줄에 개행이 없는 경우)
    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// NDJSON 한 줄 → 텍스트 조각 (빈 조각은 None)
fn decode_line(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| RagError::ModelResponse(format!("Invalid stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(RagError::ModelResponse(error));
    }

    if chunk.response.is_empty() {
        Ok(None)
    } else {
        Ok(Some(chunk.response))
    }
}

struct DecodeState<S> {
    bytes: S,
    lines: LineBuffer,
    finished: bool,
}

/// 바이트 스트림을 텍스트 조각 스트림으로 변환
///
/// 첫 에러를 내보낸 뒤 스트림을 종료합니다.
pub(crate) fn decode_ndjson_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes,
        lines: LineBuffer::default(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(line) = st.lines.next_line() {
                match decode_line(&line) {
                    Ok(Some(fragment)) => return Some((Ok(fragment), st)),
                    Ok(None) => continue,
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => st.lines.push(chunk.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    let err = RagError::ModelResponse(format!("Generation stream failed: {}", e));
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
                    let rest = st.lines.finish();
                    match rest.as_deref().map(decode_line) {
                        Some(Ok(Some(fragment))) => return Some((Ok(fragment), st)),
                        Some(Err(e)) => return Some((Err(e), st)),
                        _ => return None,
                    }
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Tests
// ============================================================================
