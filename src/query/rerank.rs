//! 리랭크 후처리 단계
//!
//! - Cross-encoder: text-embeddings-inference 형식 서버 (`POST /rerank`)
//! - LLM: 생성 모델에게 문서별 관련도(1-10)를 매기게 함
//!
//! Cross-encoder는 엔진 생성 시 한 번만 확인하며,
//! 사용할 수 없으면 질의마다 경고 후 건너뜁니다.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::knowledge::RetrievedChunk;
use crate::llm::LanguageModel;

/// LLM 리랭크 한 번에 보여주는 문서 수
pub const LLM_RERANK_BATCH_SIZE: usize = 10;

// ============================================================================
// NodePostprocessor Trait
// ============================================================================

/// 검색 결과 후처리 단계
#[async_trait]
pub trait NodePostprocessor: Send + Sync {
    /// 후보를 다시 점수 매기고 상위 N개만 반환
    async fn postprocess(
        &self,
        question: &str,
        chunks: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>>;

    fn name(&self) -> &str;
}

/// Cross-encoder 사용 가능 여부 (엔진 생성 시 한 번 결정)
#[derive(Clone)]
pub enum RerankCapability {
    Available(Arc<dyn NodePostprocessor>),
    Unavailable { reason: String },
}

impl RerankCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, RerankCapability::Available(_))
    }

    /// 사용할 수 없는 이유를 에러로 표현
    pub fn unavailable_error(&self) -> Option<RagError> {
        match self {
            RerankCapability::Available(_) => None,
            RerankCapability::Unavailable { reason } => {
                Some(RagError::RerankUnavailable(reason.clone()))
            }
        }
    }
}

impl std::fmt::Debug for RerankCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RerankCapability::Available(stage) => write!(f, "Available({})", stage.name()),
            RerankCapability::Unavailable { reason } => write!(f, "Unavailable({})", reason),
        }
    }
}

// ============================================================================
// Cross-Encoder Rerank
// ============================================================================

/// HTTP cross-encoder 리랭커
pub struct CrossEncoderRerank {
    client: reqwest::Client,
    base_url: String,
    model: String,
    top_n: usize,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

impl CrossEncoderRerank {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str, top_n: usize) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            top_n,
        }
    }

    /// 리랭크 서버 확인 (`GET /health`)
    pub async fn check_health(config: &RagConfig) -> RerankCapability {
        let Some(base_url) = config.rerank_endpoint() else {
            return RerankCapability::Unavailable {
                reason: "rerank_base_url is not configured".to_string(),
            };
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return RerankCapability::Unavailable {
                    reason: format!("Failed to create HTTP client: {}", e),
                }
            }
        };

        let health = format!("{}/health", base_url);
        match client.get(&health).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Cross-encoder rerank available at {}", base_url);
                RerankCapability::Available(Arc::new(Self::new(
                    client,
                    base_url,
                    &config.rerank_model,
                    config.rerank_top_n,
                )))
            }
            Ok(response) => RerankCapability::Unavailable {
                reason: format!("{} returned {}", health, response.status()),
            },
            Err(e) => RerankCapability::Unavailable {
                reason: format!("{} unreachable: {}", health, e),
            },
        }
    }
}

#[async_trait]
impl NodePostprocessor for CrossEncoderRerank {
    async fn postprocess(
        &self,
        question: &str,
        chunks: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let endpoint = format!("{}/rerank", self.base_url);
        let request = RerankRequest {
            query: question,
            texts: chunks.iter().map(|c| c.text.as_str()).collect(),
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::unreachable(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Retrieval(format!(
                "Rerank error ({}): {}",
                status, body
            )));
        }

        let scores: Vec<RerankScore> = response
            .json()
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to parse rerank response: {}", e)))?;

        Ok(apply_scores(chunks, scores.into_iter().map(|s| (s.index, s.score)), self.top_n))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// LLM Rerank
// ============================================================================

/// 생성 모델 기반 리랭커
pub struct LlmRerank {
    llm: Arc<dyn LanguageModel>,
    top_n: usize,
    batch_size: usize,
}

impl LlmRerank {
    pub fn new(llm: Arc<dyn LanguageModel>, top_n: usize) -> Self {
        Self {
            llm,
            top_n,
            batch_size: LLM_RERANK_BATCH_SIZE,
        }
    }
}

#[async_trait]
impl NodePostprocessor for LlmRerank {
    async fn postprocess(
        &self,
        question: &str,
        chunks: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut choices: Vec<(usize, f32)> = Vec::new();

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let answer = self.llm.generate(&choice_prompt(question, &texts)).await?;

            let offset = batch_no * self.batch_size;
            choices.extend(
                parse_choices(&answer, batch.len())
                    .into_iter()
                    .map(|(i, relevance)| (offset + i, relevance)),
            );
        }

        tracing::debug!(
            "LLM rerank kept {} of {} candidate(s)",
            choices.len().min(self.top_n),
            chunks.len()
        );

        Ok(apply_scores(chunks, choices, self.top_n))
    }

    fn name(&self) -> &str {
        "llm-rerank"
    }
}

/// 관련도 선택 프롬프트 (문서 번호는 1부터)
fn choice_prompt(question: &str, texts: &[&str]) -> String {
    let mut prompt = String::from(
        "A list of documents is shown below. Each document has a number next to it.\n\
         Respond with the numbers of the documents you should consult to answer the question, \
         in order of relevance, along with a relevance score from 1 to 10.\n\
         Do not include documents that are not relevant to the question.\n\
         Use one line per document in the format: Doc: <number>, Relevance: <score>\n\n",
    );

    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("Document {}:\n{}\n\n", i + 1, text));
    }

    prompt.push_str(&format!("Question: {}\nAnswer:\n", question));
    prompt
}

fn choice_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)doc(?:ument)?\s*:?\s*(\d+)\s*,\s*relevance\s*:?\s*(\d+(?:\.\d+)?)")
            .expect("Invalid regex")
    })
}

/// 모델 응답에서 (0-based 인덱스, 관련도) 목록 추출
///
/// 범위를 벗어나거나 중복된 번호는 무시합니다.
fn parse_choices(answer: &str, batch_len: usize) -> Vec<(usize, f32)> {
    let mut seen = vec![false; batch_len];
    let mut choices = Vec::new();

    for caps in choice_line().captures_iter(answer) {
        let (Ok(number), Ok(relevance)) = (caps[1].parse::<usize>(), caps[2].parse::<f32>()) else {
            continue;
        };
        if number == 0 || number > batch_len || seen[number - 1] {
            continue;
        }
        seen[number - 1] = true;
        choices.push((number - 1, relevance));
    }

    choices
}

/// 점수가 매겨진 후보만 남기고 내림차순 정렬 후 상위 N개
fn apply_scores(
    chunks: Vec<RetrievedChunk>,
    scores: impl IntoIterator<Item = (usize, f32)>,
    top_n: usize,
) -> Vec<RetrievedChunk> {
    let mut slots: Vec<Option<RetrievedChunk>> = chunks.into_iter().map(Some).collect();
    let mut scored: Vec<RetrievedChunk> = scores
        .into_iter()
        .filter_map(|(index, score)| {
            let mut chunk = slots.get_mut(index)?.take()?;
            chunk.score = score;
            Some(chunk)
        })
        .collect();

    // 안정 정렬: 같은 점수는 응답 순서 유지
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_n);
    scored
}

// ============================================================================
// Tests
// ============================================================================
