//! 콘텐츠 추출 모듈
//!
//! 소스 파일을 하나 이상의 텍스트 세그먼트로 변환합니다.
//! - PDF 파일: 페이지 단위 (pdf-extract)
//! - DOCX 파일: 헤딩 기준 섹션 단위 (docx-rs)
//! - HTML 파일: script/style 제거 후 본문 텍스트 (scraper)
//! - 텍스트/마크다운: 그대로 한 세그먼트

pub mod docx;
pub mod html;
pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::collector::{FileType, SourceFile};
use crate::error::RagError;

// ============================================================================
// Segment
// ============================================================================

/// 추출된 텍스트 세그먼트
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// 추출된 텍스트
    pub text: String,
    /// 세그먼트 위치 정보
    pub metadata: SegmentMetadata,
}

impl Segment {
    /// 위치 정보 없는 세그먼트
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: SegmentMetadata::default(),
        }
    }
}

/// 세그먼트 위치 정보 (타입별)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// PDF 페이지 번호 (1부터 시작)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    /// 총 페이지 수 (PDF)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    /// DOCX 섹션 인덱스 (0부터 시작)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<usize>,
    /// 섹션 앞의 헤딩 텍스트 (DOCX)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_heading: Option<String>,
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
///
/// 파일 하나의 실패는 `RagError::Extraction`으로 돌려주며,
/// 배치를 중단할지는 호출자가 결정합니다.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 세그먼트 추출
    pub async fn extract(&self, file: &SourceFile) -> Result<Vec<Segment>, RagError> {
        let result = match file.file_type {
            FileType::Pdf => self.extract_pdf(&file.path).await,
            FileType::Docx => self.extract_docx(&file.path).await,
            FileType::Html => self.extract_html(&file.path).await,
            FileType::Text => self.extract_text(&file.path).await,
        };

        result.map_err(|e| RagError::Extraction {
            path: file.path.clone(),
            reason: format!("{:#}", e),
        })
    }

    /// 텍스트 파일에서 추출
    async fn extract_text(&self, path: &Path) -> anyhow::Result<Vec<Segment>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        Ok(vec![Segment::plain(String::from_utf8_lossy(&bytes))])
    }

    /// HTML 파일에서 추출
    async fn extract_html(&self, path: &Path) -> anyhow::Result<Vec<Segment>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read HTML file: {:?}", path))?;

        let text = html::extract_text_from_html(&String::from_utf8_lossy(&bytes));
        Ok(vec![Segment::plain(text)])
    }

    /// PDF 파일에서 추출
    async fn extract_pdf(&self, path: &Path) -> anyhow::Result<Vec<Segment>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path: PathBuf = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
            .await
            .context("PDF extraction task failed")??;

        let page_count = pages.len();

        Ok(pages
            .into_iter()
            .map(|(page_number, text)| Segment {
                text,
                metadata: SegmentMetadata {
                    page_number: Some(page_number),
                    page_count: Some(page_count),
                    ..Default::default()
                },
            })
            .collect())
    }

    /// DOCX 파일에서 추출
    async fn extract_docx(&self, path: &Path) -> anyhow::Result<Vec<Segment>> {
        let path: PathBuf = path.to_path_buf();
        let paragraphs = tokio::task::spawn_blocking(move || docx::read_paragraphs(&path))
            .await
            .context("DOCX extraction task failed")??;

        Ok(docx::split_sections(&paragraphs))
    }
}

// ============================================================================
// Tests
// ============================================================================
