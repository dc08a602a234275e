//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// 페이지 구분 문자 (폼피드)
const PAGE_BREAK: char = '\x0c';

/// PDF에서 페이지별 텍스트 추출
///
/// (페이지 번호, 텍스트) 튜플 벡터로 반환합니다. 페이지 번호는 1부터 시작합니다.
/// 텍스트가 없는 페이지도 번호를 유지하기 위해 빈 문자열로 남겨둡니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, page)| (i + 1, page))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
///
/// 빈 페이지도 유지하며, 마지막 구분자 뒤의 빈 조각만 버립니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text
        .split(PAGE_BREAK)
        .map(|page| page.trim().to_string())
        .collect();

    if pages.len() > 1 && pages.last().map(|p| p.is_empty()).unwrap_or(false) {
        pages.pop();
    }

    pages
}

// ============================================================================
// Tests
// ============================================================================
