//! 수집 파이프라인
//!
//! 파일 목록 → 추출 → 논리 문서 → 인덱스 삽입 → 저장
//!
//! - 같은 배치 안의 중복 경로는 첫 번째만 처리합니다.
//! - 이미 인덱스에 있는 문서 ID는 건너뜁니다 (재수집은 no-op).
//! - 인덱스가 없거나 읽을 수 없으면 전체 후보로 새 인덱스를 만듭니다.
//! - 저장은 배치 끝에 한 번만 합니다. 삽입 실패 시 이미 삽입된 문서는 저장되지 않습니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::collector::{canonical_path, SourceFile};
use crate::config::RagConfig;
use crate::document::{build_documents, LogicalDocument};
use crate::error::{RagError, Result};
use crate::extractor::ContentExtractor;
use crate::knowledge::{IndexHandle, IndexStore};

/// 수집 파이프라인
pub struct Ingestor {
    config: RagConfig,
    extractor: ContentExtractor,
    store: Arc<dyn IndexStore>,
}

impl Ingestor {
    pub fn new(config: RagConfig, store: Arc<dyn IndexStore>) -> Self {
        Self {
            config,
            extractor: ContentExtractor::new(),
            store,
        }
    }

    /// 파일들을 수집하고 새로 인덱싱된 문서 수를 반환
    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<usize> {
        let paths = dedupe_paths(paths);
        tracing::info!("Ingesting {} file(s)", paths.len());

        self.ensure_storage_dirs().await?;

        let candidates = self.build_candidates(&paths).await?;
        tracing::debug!("Built {} candidate document(s)", candidates.len());

        match self.store.load().await {
            Ok(Some(mut index)) => {
                let existing = index
                    .existing_identifiers()
                    .await
                    .map_err(|e| RagError::Retrieval(format!("{:#}", e)))?;

                let new_docs: Vec<&LogicalDocument> = candidates
                    .iter()
                    .filter(|doc| !existing.contains(&doc.doc_id))
                    .collect();

                if new_docs.is_empty() {
                    tracing::info!("No new documents to index");
                    return Ok(0);
                }

                insert_and_persist(index.as_mut(), new_docs.iter().copied()).await?;

                tracing::info!(
                    "Indexed {} new document(s) into {}",
                    new_docs.len(),
                    self.store.location()
                );
                Ok(new_docs.len())
            }
            Ok(None) => {
                tracing::info!("No index at {}, creating a new one", self.store.location());
                self.initialize(&candidates).await
            }
            Err(e) => {
                tracing::warn!(
                    "Index at {} is unreadable ({:#}), rebuilding from this batch",
                    self.store.location(),
                    e
                );
                self.initialize(&candidates).await
            }
        }
    }

    /// 빈 인덱스를 만든 뒤 후보 문서를 하나씩 삽입
    async fn initialize(&self, candidates: &[LogicalDocument]) -> Result<usize> {
        let mut index = self.store.initialize(&[]).await.map_err(|e| {
            RagError::IndexUnavailable(format!("Failed to initialize index: {:#}", e))
        })?;

        insert_and_persist(index.as_mut(), candidates.iter()).await?;

        tracing::info!(
            "Initialized index with {} document(s) at {}",
            candidates.len(),
            self.store.location()
        );
        Ok(candidates.len())
    }

    async fn ensure_storage_dirs(&self) -> Result<()> {
        for dir in [
            &self.config.storage_root,
            &self.config.upload_dir,
            &self.config.index_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// 추출 + 문서 빌드 (배치 전체에 같은 수집 시각)
    async fn build_candidates(&self, paths: &[PathBuf]) -> Result<Vec<LogicalDocument>> {
        let ingested_at = Utc::now();
        let mut candidates = Vec::new();

        for path in paths {
            let file = SourceFile::open(path)?;
            let segments = self.extractor.extract(&file).await?;
            let docs = build_documents(&file, segments, ingested_at);

            tracing::debug!(
                "{}: {} document(s) ({})",
                file.file_name(),
                docs.len(),
                file.file_type.label()
            );
            candidates.extend(docs);
        }

        Ok(candidates)
    }
}

/// 경로 정규화 후 중복 제거 (첫 번째 유지, 순서 보존)
pub fn dedupe_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .map(|p| canonical_path(Path::new(p)))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// 문서를 순서대로 삽입하고 마지막에 한 번 저장
///
/// 삽입 실패 시 실패한 문서 ID를 담아 즉시 반환하며 저장하지 않습니다.
async fn insert_and_persist<'a>(
    index: &mut dyn IndexHandle,
    docs: impl Iterator<Item = &'a LogicalDocument>,
) -> Result<()> {
    for doc in docs {
        index
            .insert(doc)
            .await
            .map_err(|e| RagError::InsertionFailure {
                doc_id: doc.doc_id.clone(),
                reason: format!("{:#}", e),
            })?;
    }

    index.persist().await.map_err(|e| {
        RagError::IndexUnavailable(format!("Failed to persist index: {:#}", e))
    })
}

// ============================================================================
// Tests
// ============================================================================
