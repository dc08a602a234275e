//! 질의 파이프라인
//!
//! 질문 → 임베딩 → top_k 검색 → 후처리(리랭크) → 답변 생성 → 출처
//!
//! 후처리 순서는 항상 cross-encoder → LLM 리랭크입니다.
//! 생성은 배치(전체 답변)와 스트리밍(조각 + 마지막 sources 이벤트) 두 가지입니다.

mod rerank;

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::document::DocumentMetadata;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::knowledge::{IndexStore, RetrievedChunk};
use crate::llm::{LanguageModel, TextStream};

pub use rerank::{
    CrossEncoderRerank, LlmRerank, NodePostprocessor, RerankCapability, LLM_RERANK_BATCH_SIZE,
};

/// 인용 스니펫 최대 길이 (문자)
pub const SNIPPET_MAX_CHARS: usize = 240;

// ============================================================================
// Types
// ============================================================================

/// 질의 옵션 (None이면 설정 기본값)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub enable_rerank: Option<bool>,
    pub enable_llm_rerank: Option<bool>,
    pub window_size: Option<usize>,
}

/// 설정 기본값이 반영된 질의 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub top_k: usize,
    pub enable_rerank: bool,
    pub enable_llm_rerank: bool,
    pub window_size: usize,
}

impl QueryOptions {
    pub fn resolve(&self, config: &RagConfig) -> ResolvedQuery {
        ResolvedQuery {
            top_k: self.top_k.unwrap_or(config.similarity_top_k),
            enable_rerank: self.enable_rerank.unwrap_or(config.enable_rerank),
            enable_llm_rerank: self.enable_llm_rerank.unwrap_or(config.enable_llm_rerank),
            window_size: self.window_size.unwrap_or(config.sentence_window_size),
        }
    }
}

/// 출처 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub score: f32,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub snippet: Option<String>,
}

impl From<RetrievedChunk> for SourceRecord {
    fn from(chunk: RetrievedChunk) -> Self {
        Self {
            snippet: make_snippet(&chunk.text),
            score: chunk.score,
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

/// 답변 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRecord>,
}

/// 스트리밍 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// 생성된 텍스트 조각
    Token(String),
    /// 마지막 이벤트: 전체 출처
    Sources(Vec<SourceRecord>),
}

#[derive(Serialize)]
struct SourcesPayload<'a> {
    sources: &'a [SourceRecord],
}

impl StreamEvent {
    /// Server-Sent Events 프레임으로 변환
    pub fn to_sse(&self) -> Result<String> {
        match self {
            StreamEvent::Token(text) => {
                let mut frame = String::new();
                for line in text.split('\n') {
                    frame.push_str("data: ");
                    frame.push_str(line);
                    frame.push('\n');
                }
                frame.push('\n');
                Ok(frame)
            }
            StreamEvent::Sources(sources) => {
                let payload = serde_json::to_string(&SourcesPayload { sources })?;
                Ok(format!("event: sources\ndata: {}\n\n", payload))
            }
        }
    }
}

/// 스트리밍 응답
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

// ============================================================================
// Query Engine
// ============================================================================

/// 질의 엔진
///
/// 모델/저장소 핸들은 진입점에서 한 번 만들어 주입합니다.
pub struct QueryEngine {
    config: RagConfig,
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    cross_encoder: RerankCapability,
}

impl QueryEngine {
    pub fn new(
        config: RagConfig,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
        cross_encoder: RerankCapability,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            llm,
            cross_encoder,
        }
    }

    /// 배치 질의: 전체 답변 + 출처
    pub async fn query(&self, question: &str, options: &QueryOptions) -> Result<AnswerRecord> {
        let chunks = self.retrieve(question, options).await?;
        let prompt = qa_prompt(question, &chunks);

        let answer = self.llm.generate(&prompt).await?;

        Ok(AnswerRecord {
            question: question.to_string(),
            answer: answer.trim().to_string(),
            sources: chunks.into_iter().map(SourceRecord::from).collect(),
        })
    }

    /// 스트리밍 질의: 텍스트 조각들, 마지막에 sources 이벤트
    ///
    /// 생성 중 에러가 나면 에러를 내보내고 sources 없이 끝납니다.
    pub async fn query_stream(&self, question: &str, options: &QueryOptions) -> Result<EventStream> {
        let chunks = self.retrieve(question, options).await?;
        let prompt = qa_prompt(question, &chunks);

        let tokens = self.llm.generate_stream(&prompt).await?;
        let sources: Vec<SourceRecord> = chunks.into_iter().map(SourceRecord::from).collect();

        Ok(event_stream(tokens, sources))
    }

    /// 검색 + 후처리
    pub async fn retrieve(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        let params = options.resolve(&self.config);
        tracing::debug!(
            "Query params: top_k={}, rerank={}, llm_rerank={}, window={}",
            params.top_k,
            params.enable_rerank,
            params.enable_llm_rerank,
            params.window_size
        );

        let index = match self.store.load().await {
            Ok(Some(index)) => index,
            Ok(None) => {
                return Err(RagError::IndexUnavailable(format!(
                    "no index has been built at {}",
                    self.store.location()
                )))
            }
            Err(e) => {
                return Err(RagError::IndexUnavailable(format!(
                    "failed to load index at {}: {:#}",
                    self.store.location(),
                    e
                )))
            }
        };

        let embedding = self.embedder.embed(question).await?;
        let mut chunks = index
            .search(&embedding, params.top_k)
            .await
            .map_err(|e| RagError::Retrieval(format!("{:#}", e)))?;

        tracing::debug!("Retrieved {} chunk(s)", chunks.len());

        for stage in self.postprocessors(&params) {
            chunks = stage.postprocess(question, chunks).await?;
            tracing::debug!("{} kept {} chunk(s)", stage.name(), chunks.len());
        }

        Ok(chunks)
    }

    /// 후처리 체인 (cross-encoder → LLM)
    fn postprocessors(&self, params: &ResolvedQuery) -> Vec<Arc<dyn NodePostprocessor>> {
        let mut stages: Vec<Arc<dyn NodePostprocessor>> = Vec::new();

        if params.enable_rerank {
            match &self.cross_encoder {
                RerankCapability::Available(stage) => stages.push(stage.clone()),
                RerankCapability::Unavailable { reason } => {
                    tracing::warn!("Cross-encoder rerank unavailable, skipping: {}", reason);
                }
            }
        }

        if params.enable_llm_rerank {
            stages.push(Arc::new(LlmRerank::new(
                self.llm.clone(),
                self.config.llm_rerank_top_n,
            )));
        }

        stages
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 질의응답 프롬프트
fn qa_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, question
    )
}

/// 인용 스니펫 생성
///
/// 공백을 하나로 합치고(개행 포함) 240자를 넘으면 자른 뒤 `…`를 붙입니다.
pub fn make_snippet(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    if collapsed.chars().count() > SNIPPET_MAX_CHARS {
        let truncated: String = collapsed.chars().take(SNIPPET_MAX_CHARS).collect();
        Some(format!("{}…", truncated))
    } else {
        Some(collapsed)
    }
}

struct StreamState {
    tokens: TextStream,
    sources: Option<Vec<SourceRecord>>,
}

/// 텍스트 조각 스트림 뒤에 sources 이벤트를 붙임
fn event_stream(tokens: TextStream, sources: Vec<SourceRecord>) -> EventStream {
    let state = StreamState {
        tokens,
        sources: Some(sources),
    };

    stream::unfold(state, |mut st| async move {
        // sources를 내보냈거나 에러로 끝난 뒤에는 토큰 스트림을 다시 poll하지 않음
        st.sources.as_ref()?;

        loop {
            match st.tokens.next().await {
                Some(Ok(token)) if token.is_empty() => continue,
                Some(Ok(token)) => return Some((Ok(StreamEvent::Token(token)), st)),
                Some(Err(e)) => {
                    st.sources = None;
                    return Some((Err(e), st));
                }
                None => {
                    let sources = st.sources.take()?;
                    return Some((Ok(StreamEvent::Sources(sources)), st));
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Tests
// ============================================================================
