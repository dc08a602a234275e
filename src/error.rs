//! 에러 타입
//!
//! 수집/질의 파이프라인 경계에서 사용하는 에러 분류입니다.
//! 외부 저장소 내부나 CLI는 anyhow를 그대로 사용합니다.

use std::path::PathBuf;

use thiserror::Error;

/// 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 지원하지 않는 확장자
    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    /// 단일 파일 추출 실패
    #[error("Failed to extract {path:?}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// 인덱스가 없거나 읽을 수 없음 (수집 시에는 재초기화, 질의 시에는 실패)
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// 모델 엔드포인트 연결 실패
    #[error("Model endpoint unreachable ({endpoint}): {reason}")]
    ModelEndpointUnreachable { endpoint: String, reason: String },

    /// 모델 엔드포인트가 응답했지만 결과가 잘못됨
    #[error("Model response error: {0}")]
    ModelResponse(String),

    /// 리랭커 의존성 없음 (단계 생략)
    #[error("Rerank stage unavailable: {0}")]
    RerankUnavailable(String),

    /// 문서 삽입 실패 (배치는 트랜잭션이 아님)
    #[error("Failed to insert document {doc_id}: {reason}")]
    InsertionFailure { doc_id: String, reason: String },

    /// 검색/후처리 실패
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// reqwest 전송 에러를 엔드포인트 에러로 변환
    pub(crate) fn unreachable(endpoint: &str, err: reqwest::Error) -> Self {
        RagError::ModelEndpointUnreachable {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_type_names_extension() {
        let err = RagError::UnsupportedFileType {
            extension: ".exe".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported file type: .exe");
    }
}
