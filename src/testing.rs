//! 테스트 공용 목(mock) 구현

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};

use crate::document::{DocumentMetadata, LogicalDocument};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::SegmentMetadata;
use crate::knowledge::{ChunkConfig, NodeBuilder, SentenceSplitter};
use crate::llm::{LanguageModel, TextStream};

/// 목 임베딩 차원
pub const MOCK_DIMENSION: usize = 64;

/// 단어 해시 버킷 기반 결정적 임베딩
///
/// 텍스트에 `FAIL`이 들어 있으면 실패합니다.
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; MOCK_DIMENSION];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() {
                continue;
            }
            let hash = word
                .bytes()
                .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
            v[hash as usize % MOCK_DIMENSION] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            v[0] = 1.0;
        } else {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("FAIL") {
            return Err(RagError::ModelResponse("mock embedding failure".to_string()));
        }
        Ok(Self::vector(text))
    }

    fn name(&self) -> &str {
        "mock-embed"
    }
}

/// 미리 정한 조각을 돌려주는 목 생성 모델
///
/// 받은 프롬프트를 기록하고, 프롬프트에 `FAIL`이 있으면 실패합니다.
#[derive(Clone, Default)]
pub struct MockLlm {
    fragments: Vec<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlm {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, prompt: &str) -> Result<()> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("FAIL") {
            return Err(RagError::ModelResponse("mock generation failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.record(prompt)?;
        Ok(self.fragments.concat())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        self.record(prompt)?;
        let items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(stream::iter(items).boxed())
    }

    fn name(&self) -> &str {
        "mock-llm"
    }
}

/// 목 임베딩을 쓰는 노드 빌더
pub fn mock_nodes() -> NodeBuilder {
    NodeBuilder::new(
        Arc::new(SentenceSplitter::new(ChunkConfig::default())),
        Arc::new(MockEmbedder),
    )
}

/// 테스트용 논리 문서
pub fn document(doc_id: &str, text: &str) -> LogicalDocument {
    LogicalDocument {
        doc_id: doc_id.to_string(),
        text: text.to_string(),
        metadata: DocumentMetadata {
            doc_id: doc_id.to_string(),
            source_path: format!("/data/{}.txt", doc_id),
            file_name: format!("{}.txt", doc_id),
            file_ext: ".txt".to_string(),
            file_size_bytes: text.len() as u64,
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            locator: SegmentMetadata::default(),
        },
    }
}
