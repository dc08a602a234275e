//! 메모리 인덱스 저장소 (테스트용)
//!
//! persist된 청크는 저장소 안의 공유 벡터에 남아 다음 `load()`에서 보입니다.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::document::LogicalDocument;

use super::index::{ChunkRecord, IndexHandle, IndexStore, NodeBuilder, RetrievedChunk};

#[derive(Default)]
struct Shared {
    persisted: Option<Vec<ChunkRecord>>,
    corrupt: bool,
    persist_calls: usize,
}

/// 메모리 인덱스 저장소
#[derive(Clone)]
pub struct MemoryIndexStore {
    nodes: NodeBuilder,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryIndexStore {
    pub fn new(nodes: NodeBuilder) -> Self {
        Self {
            nodes,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// 다음 load()가 손상 에러를 내도록 설정
    pub fn mark_corrupt(&self) {
        self.shared.lock().unwrap().corrupt = true;
    }

    /// persist된 청크 수 (한 번도 persist되지 않았으면 None)
    pub fn persisted_len(&self) -> Option<usize> {
        self.shared.lock().unwrap().persisted.as_ref().map(Vec::len)
    }

    pub fn persisted_doc_ids(&self) -> HashSet<String> {
        self.shared
            .lock()
            .unwrap()
            .persisted
            .iter()
            .flatten()
            .map(|r| r.doc_id.clone())
            .collect()
    }

    pub fn persist_calls(&self) -> usize {
        self.shared.lock().unwrap().persist_calls
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn load(&self) -> Result<Option<Box<dyn IndexHandle>>> {
        let shared = self.shared.lock().unwrap();
        if shared.corrupt {
            anyhow::bail!("index files are unreadable");
        }

        Ok(shared.persisted.clone().map(|records| {
            Box::new(MemoryIndex {
                records,
                nodes: self.nodes.clone(),
                shared: self.shared.clone(),
            }) as Box<dyn IndexHandle>
        }))
    }

    async fn initialize(&self, documents: &[LogicalDocument]) -> Result<Box<dyn IndexHandle>> {
        let mut index = MemoryIndex {
            records: Vec::new(),
            nodes: self.nodes.clone(),
            shared: self.shared.clone(),
        };
        for document in documents {
            index.insert(document).await?;
        }
        Ok(Box::new(index))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryIndex {
    records: Vec<ChunkRecord>,
    nodes: NodeBuilder,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl IndexHandle for MemoryIndex {
    async fn insert(&mut self, document: &LogicalDocument) -> Result<()> {
        let records = self.nodes.build_nodes(document).await?;
        self.records.extend(records);
        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.persisted = Some(self.records.clone());
        shared.corrupt = false;
        shared.persist_calls += 1;
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let mut results: Vec<RetrievedChunk> = self
            .records
            .iter()
            .map(|r| RetrievedChunk {
                node_id: r.node_id.clone(),
                text: r.text.clone(),
                score: cosine_similarity(embedding, &r.embedding),
                metadata: r.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    async fn existing_identifiers(&self) -> Result<HashSet<String>> {
        Ok(self.records.iter().map(|r| r.doc_id.clone()).collect())
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}

/// 코사인 유사도
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
