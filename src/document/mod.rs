//! 문서 빌더 모듈
//!
//! 추출된 세그먼트를 안정적인 ID와 메타데이터가 붙은 논리 문서로 변환합니다.
//!
//! 안정 ID = sha256("{정규 경로}|{크기}|{수정 시간(초)}")
//! 같은 파일을 다시 수집하면 같은 ID가 나오므로 재수집은 no-op이 됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collector::SourceFile;
use crate::extractor::{Segment, SegmentMetadata};

// ============================================================================
// Types
// ============================================================================

/// 문서 메타데이터 (청크에도 그대로 복사됨)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// 안정 ID
    pub doc_id: String,
    /// 원본 절대 경로
    pub source_path: String,
    /// 파일 이름
    pub file_name: String,
    /// 확장자 (`.pdf` 형식)
    pub file_ext: String,
    /// 파일 크기
    pub file_size_bytes: u64,
    /// 수집 시각 (배치 단위)
    pub ingested_at: DateTime<Utc>,
    /// 페이지/섹션 정보
    #[serde(flatten)]
    pub locator: SegmentMetadata,
}

/// 인덱싱 단위 논리 문서
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalDocument {
    pub doc_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

// ============================================================================
// Stable Identifier
// ============================================================================

/// 파일의 안정 ID 계산
///
/// stat 정보가 없으면 정규 경로만으로 계산합니다.
pub fn stable_doc_id(file: &SourceFile) -> String {
    let path = file.path.to_string_lossy();
    let payload = match file.stat {
        Some(stat) => format!("{}|{}|{}", path, stat.size, stat.modified_secs),
        None => path.into_owned(),
    };

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Document Builder
// ============================================================================

/// 세그먼트 → 논리 문서 변환
///
/// 공백만 있는 세그먼트는 버립니다 (빈 문서는 인덱싱하지 않음).
pub fn build_documents(
    file: &SourceFile,
    segments: Vec<Segment>,
    ingested_at: DateTime<Utc>,
) -> Vec<LogicalDocument> {
    let doc_id = stable_doc_id(file);
    let source_path = file.path.to_string_lossy().into_owned();
    let file_name = file.file_name();
    let file_ext = file.extension();
    let file_size_bytes = file.size();

    segments
        .into_iter()
        .filter(|segment| !segment.text.trim().is_empty())
        .map(|segment| LogicalDocument {
            doc_id: doc_id.clone(),
            text: segment.text,
            metadata: DocumentMetadata {
                doc_id: doc_id.clone(),
                source_path: source_path.clone(),
                file_name: file_name.clone(),
                file_ext: file_ext.clone(),
                file_size_bytes,
                ingested_at,
                locator: segment.metadata,
            },
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
