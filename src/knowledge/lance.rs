//! LanceDB Index Store - 영속 청크 인덱스
//!
//! 청크 텍스트, 메타데이터(JSON), 임베딩을 하나의 테이블에 저장합니다.
//! 삽입은 메모리 버퍼에 모였다가 `persist()` 시점에 한 번에 기록됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;

use crate::document::{DocumentMetadata, LogicalDocument};

use super::index::{ChunkRecord, IndexHandle, IndexStore, NodeBuilder, RetrievedChunk};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceIndexStore
// ============================================================================

/// LanceDB 기반 인덱스 저장소
pub struct LanceIndexStore {
    path: PathBuf,
    nodes: NodeBuilder,
}

impl LanceIndexStore {
    /// 저장소 생성 (디렉토리는 첫 persist 시점에 만들어짐)
    pub fn new(path: impl Into<PathBuf>, nodes: NodeBuilder) -> Self {
        Self {
            path: path.into(),
            nodes,
        }
    }

    async fn connect(path: &Path) -> Result<Connection> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create index directory: {}", path.display()))?;

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")
    }
}

#[async_trait]
impl IndexStore for LanceIndexStore {
    async fn load(&self) -> Result<Option<Box<dyn IndexHandle>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let db = Self::connect(&self.path).await?;
        let names = db
            .table_names()
            .execute()
            .await
            .context("Failed to list index tables")?;

        if !names.iter().any(|name| name == TABLE_NAME) {
            return Ok(None);
        }

        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunk table")?;

        // 열리기만 하고 읽을 수 없는 테이블도 손상으로 간주
        table
            .count_rows(None)
            .await
            .context("Failed to read chunk table")?;

        Ok(Some(Box::new(LanceIndex {
            db,
            table: Some(table),
            nodes: self.nodes.clone(),
            pending: Vec::new(),
            reset: false,
        })))
    }

    async fn initialize(&self, documents: &[LogicalDocument]) -> Result<Box<dyn IndexHandle>> {
        let db = Self::connect(&self.path).await?;

        let mut index = LanceIndex {
            db,
            table: None,
            nodes: self.nodes.clone(),
            pending: Vec::new(),
            reset: true,
        };

        for document in documents {
            index.insert(document).await?;
        }

        Ok(Box::new(index))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// LanceIndex
// ============================================================================

/// 열린 LanceDB 인덱스
struct LanceIndex {
    db: Connection,
    table: Option<Table>,
    nodes: NodeBuilder,
    /// persist 대기 중인 청크
    pending: Vec<ChunkRecord>,
    /// persist 시 기존 테이블을 교체할지 여부
    reset: bool,
}

impl LanceIndex {
    /// 청크 테이블 스키마 (임베딩 차원은 데이터에서 결정)
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("node_id", DataType::Utf8, false),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(records: &[ChunkRecord]) -> Result<RecordBatch> {
        let first = records
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty records"))?;
        let dimension = first.embedding.len();

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {} ({})",
                dimension,
                bad.embedding.len(),
                bad.doc_id
            );
        }

        let node_ids: Vec<&str> = records.iter().map(|r| r.node_id.as_str()).collect();
        let doc_ids: Vec<&str> = records.iter().map(|r| r.doc_id.as_str()).collect();
        let chunk_indices: Vec<i32> = records.iter().map(|r| r.chunk_index).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to serialize chunk metadata")?;

        let vectors_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(vectors_flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension as i32)),
            vec![
                Arc::new(StringArray::from(node_ids)),
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
    }

    async fn drop_existing(&mut self) -> Result<()> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list index tables")?;

        if names.iter().any(|name| name == TABLE_NAME) {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop previous chunk table")?;
        }
        self.table = None;
        Ok(())
    }
}

#[async_trait]
impl IndexHandle for LanceIndex {
    async fn insert(&mut self, document: &LogicalDocument) -> Result<()> {
        let records = self.nodes.build_nodes(document).await?;
        self.pending.extend(records);
        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        if self.reset {
            self.drop_existing().await?;
            self.reset = false;
        }

        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = Self::records_to_batch(&self.pending)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match &self.table {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add chunks to table")?;
            }
            None => {
                let table = self
                    .db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create chunk table")?;
                self.table = Some(table);
            }
        }

        tracing::info!("Persisted {} chunk(s) to LanceDB", self.pending.len());
        self.pending.clear();
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let Some(table) = &self.table else {
            return Ok(vec![]);
        };

        if k == 0 {
            return Ok(vec![]);
        }

        let results = table
            .vector_search(embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut chunks = Vec::new();

        for batch in batches {
            let node_ids = Self::string_column(&batch, "node_id")?;
            let texts = Self::string_column(&batch, "text")?;
            let metadata = Self::string_column(&batch, "metadata")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let metadata: DocumentMetadata = serde_json::from_str(metadata.value(i))
                    .context("Failed to parse chunk metadata")?;

                chunks.push(RetrievedChunk {
                    node_id: node_ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    // L2 거리 → 유사도
                    score: 1.0 / (1.0 + distances.value(i)),
                    metadata,
                });
            }
        }

        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(chunks)
    }

    async fn existing_identifiers(&self) -> Result<HashSet<String>> {
        let mut ids: HashSet<String> = self.pending.iter().map(|r| r.doc_id.clone()).collect();

        let Some(table) = &self.table else {
            return Ok(ids);
        };

        let count = table.count_rows(None).await.context("Failed to count rows")?;
        if count == 0 {
            return Ok(ids);
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(vec!["doc_id".to_string()]))
            .limit(count)
            .execute()
            .await
            .context("Failed to scan doc_id column")?
            .try_collect()
            .await?;

        for batch in batches {
            let doc_ids = Self::string_column(&batch, "doc_id")?;
            ids.extend((0..batch.num_rows()).map(|i| doc_ids.value(i).to_string()));
        }

        Ok(ids)
    }

    async fn chunk_count(&self) -> Result<usize> {
        let stored = match &self.table {
            Some(table) => table.count_rows(None).await.context("Failed to count rows")?,
            None => 0,
        };
        Ok(stored + self.pending.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
