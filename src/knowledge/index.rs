//! Index Store - 청크 인덱스 트레이트
//!
//! 인덱스 저장소는 외부 라이브러리(LanceDB)를 감싼 경계입니다.
//! 파이프라인은 아래 계약만 사용합니다:
//! - `load()` → 핸들 | 없음 (에러는 손상된 인덱스)
//! - `initialize(documents)` → 새 핸들
//! - `insert(document)`, `persist()`, `search(embedding, k)`, `existing_identifiers()`

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::document::{DocumentMetadata, LogicalDocument};
use crate::embedding::EmbeddingProvider;

use super::chunker::Chunker;

// ============================================================================
// Types
// ============================================================================

/// 청크(노드) 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// 노드 ID (UUID v4)
    pub node_id: String,
    /// 부모 문서 안정 ID
    pub doc_id: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub text: String,
    /// 부모 문서 메타데이터
    pub metadata: DocumentMetadata,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색된 청크
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub node_id: String,
    /// 청크 텍스트
    pub text: String,
    /// 유사도 또는 리랭크 스코어 (높을수록 관련)
    pub score: f32,
    /// 부모 문서 메타데이터
    pub metadata: DocumentMetadata,
}

// ============================================================================
// Traits
// ============================================================================

/// 영속 인덱스 저장소
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// 저장된 인덱스 열기
    ///
    /// 한 번도 만들어진 적 없으면 `Ok(None)`, 읽을 수 없으면 `Err`입니다.
    async fn load(&self) -> Result<Option<Box<dyn IndexHandle>>>;

    /// 문서 전체로 새 인덱스 초기화 (persist 전까지는 메모리에만 존재)
    async fn initialize(&self, documents: &[LogicalDocument]) -> Result<Box<dyn IndexHandle>>;

    /// 저장 위치 (로그/상태 표시용)
    fn location(&self) -> String;
}

/// 열린 인덱스 핸들
#[async_trait]
pub trait IndexHandle: Send + Sync {
    /// 문서 하나 삽입 (청킹 + 임베딩)
    async fn insert(&mut self, document: &LogicalDocument) -> Result<()>;

    /// 삽입된 내용 저장
    async fn persist(&mut self) -> Result<()>;

    /// 유사도 검색 (내림차순)
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    /// 저장된 문서 ID 집합
    async fn existing_identifiers(&self) -> Result<HashSet<String>>;

    /// 저장된 청크 수
    async fn chunk_count(&self) -> Result<usize>;
}

// ============================================================================
// NodeBuilder
// ============================================================================

/// 문서 → 청크 레코드 변환기 (청킹 + 임베딩)
#[derive(Clone)]
pub struct NodeBuilder {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl NodeBuilder {
    pub fn new(chunker: Arc<dyn Chunker>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { chunker, embedder }
    }

    /// 문서를 청크로 나누고 임베딩
    pub async fn build_nodes(&self, document: &LogicalDocument) -> Result<Vec<ChunkRecord>> {
        let chunks = self.chunker.chunk(&document.text);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for document: {}", document.doc_id);
            return Ok(vec![]);
        }

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .with_context(|| format!("Failed to embed chunks of {}", document.doc_id))?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| ChunkRecord {
                node_id: uuid::Uuid::new_v4().to_string(),
                doc_id: document.doc_id.clone(),
                chunk_index: i as i32,
                text,
                metadata: document.metadata.clone(),
                embedding,
            })
            .collect();

        tracing::debug!(
            "Built {} node(s) for {} ({})",
            records.len(),
            document.metadata.file_name,
            self.chunker.name()
        );

        Ok(records)
    }
}
