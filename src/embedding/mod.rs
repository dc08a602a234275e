//! 임베딩 모듈 - Ollama API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 Ollama 임베딩 프로바이더입니다.
//! 엔드포인트에 연결할 수 없으면 재시도 없이 바로 실패합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 임베딩 구현체
///
/// `POST {base}/api/embeddings {model, prompt}` → `{embedding}`
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// 설정에서 생성
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RagError::ModelResponse(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(
            client,
            config.ollama_endpoint(),
            &config.ollama_embed_model,
        ))
    }

    /// HTTP 클라이언트를 공유하여 생성
    pub fn with_client(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::unreachable(&self.endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::unreachable(&self.endpoint, e))?;

        if !status.is_success() {
            return Err(RagError::ModelResponse(format!(
                "Ollama embedding error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::ModelResponse(format!("Failed to parse embedding response: {}", e))
        })?;

        if parsed.embedding.is_empty() {
            return Err(RagError::ModelResponse(format!(
                "Model '{}' returned an empty embedding",
                self.model
            )));
        }

        Ok(parsed.embedding)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_config() {
        let config = RagConfig {
            ollama_base_url: "http://ollama:11434/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&config).unwrap();
        assert_eq!(embedder.endpoint, "http://ollama:11434/api/embeddings");
        assert_eq!(embedder.name(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_typed_error() {
        // 예약된 포트 0은 연결할 수 없음
        let embedder =
            OllamaEmbedding::with_client(reqwest::Client::new(), "http://127.0.0.1:0", "m");

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::ModelEndpointUnreachable { .. }));
    }
}
