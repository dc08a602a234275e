//! DOCX 텍스트 추출 모듈
//!
//! docx-rs로 문단을 읽고, 헤딩 스타일 문단을 기준으로 섹션을 나눕니다.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use docx_rs::{DocumentChild, ParagraphChild, RunChild};

use super::{Segment, SegmentMetadata};

/// DOCX 문단
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxParagraph {
    /// 문단 텍스트 (런 텍스트 연결)
    pub text: String,
    /// 문단 스타일 ID (예: `Heading1`, 현지화 문서는 `Titre1`)
    pub style_id: Option<String>,
    /// styles.xml의 스타일 이름 (예: `heading 1`)
    pub style_name: Option<String>,
}

impl DocxParagraph {
    pub fn new(text: impl Into<String>, style_id: Option<&str>) -> Self {
        Self {
            text: text.into(),
            style_id: style_id.map(str::to_string),
            style_name: None,
        }
    }

    pub fn with_style_name(mut self, name: impl Into<String>) -> Self {
        self.style_name = Some(name.into());
        self
    }

    /// 헤딩 스타일 여부 (`heading`으로 시작, 대소문자 무시)
    ///
    /// 스타일 이름을 우선 보고, 이름이 없으면 ID로 판단합니다.
    pub fn is_heading(&self) -> bool {
        self.style_name
            .as_deref()
            .or(self.style_id.as_deref())
            .map(|style| style.to_lowercase().starts_with("heading"))
            .unwrap_or(false)
    }
}

/// DOCX 파일에서 문단 목록 읽기
pub fn read_paragraphs(path: &Path) -> Result<Vec<DocxParagraph>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read DOCX: {:?}", path))?;
    paragraphs_from_bytes(&bytes).with_context(|| format!("Failed to parse DOCX: {:?}", path))
}

/// DOCX 바이트에서 문단 목록 읽기
pub fn paragraphs_from_bytes(bytes: &[u8]) -> Result<Vec<DocxParagraph>> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| anyhow::anyhow!("{}", e))?;

    let style_names: HashMap<String, String> = docx
        .styles
        .styles
        .iter()
        .map(|style| (style.style_id.clone(), style_name_string(&style.name)))
        .filter(|(_, name)| !name.is_empty())
        .collect();

    let mut paragraphs = Vec::new();

    for child in docx.document.children {
        // 표 등 문단 외 요소는 건너뜀
        if let DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            collect_paragraph_text(&p.children, &mut text);

            let style_id = p.property.style.as_ref().map(|s| s.val.clone());
            let style_name = style_id
                .as_ref()
                .and_then(|id| style_names.get(id))
                .cloned();

            paragraphs.push(DocxParagraph {
                text,
                style_id,
                style_name,
            });
        }
    }

    Ok(paragraphs)
}

// docx_rs::Name의 필드가 private이므로 Serialize(문자열 그대로 직렬화)로 읽음
fn style_name_string(name: &docx_rs::Name) -> String {
    match serde_json::to_value(name) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn collect_paragraph_text(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    if let RunChild::Text(t) = run_child {
                        out.push_str(&t.text);
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => collect_paragraph_text(&link.children, out),
            _ => {}
        }
    }
}

/// 문단 목록을 헤딩 기준 섹션으로 분할
///
/// - 빈 문단은 무시합니다.
/// - 헤딩 문단은 지금까지 모은 버퍼를 섹션으로 내보내고 새 헤딩이 됩니다.
/// - 섹션 메타데이터의 헤딩은 그 섹션 *앞*에 나온 헤딩입니다.
/// - 섹션이 하나도 없으면 문서 전체 텍스트를 세그먼트 하나로 내보냅니다.
pub fn split_sections(paragraphs: &[DocxParagraph]) -> Vec<Segment> {
    let mut sections = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for para in paragraphs {
        let content = para.text.trim();
        if content.is_empty() {
            continue;
        }

        if para.is_heading() {
            flush_section(&mut sections, &mut buffer, current_heading.as_deref());
            current_heading = Some(content.to_string());
            continue;
        }

        buffer.push(content);
    }

    flush_section(&mut sections, &mut buffer, current_heading.as_deref());

    if sections.is_empty() {
        return vec![Segment::plain(full_text(paragraphs))];
    }

    sections
}

fn flush_section(sections: &mut Vec<Segment>, buffer: &mut Vec<&str>, heading: Option<&str>) {
    if buffer.is_empty() {
        return;
    }

    let text = buffer.join("\n\n");
    buffer.clear();

    sections.push(Segment {
        text,
        metadata: SegmentMetadata {
            section_index: Some(sections.len()),
            section_heading: heading.map(str::to_string),
            ..Default::default()
        },
    });
}

/// 비어있지 않은 문단 전체 (빈 줄로 연결)
fn full_text(paragraphs: &[DocxParagraph]) -> String {
    paragraphs
        .iter()
        .map(|p| p.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run, Style, StyleType};
    use std::io::Cursor;

    fn body(text: &str) -> DocxParagraph {
        DocxParagraph::new(text, Some("Normal"))
    }

    fn heading(text: &str) -> DocxParagraph {
        DocxParagraph::new(text, Some("Heading1"))
    }

    #[test]
    fn test_sections_follow_preceding_heading() {
        let paragraphs = vec![
            body("P1"),
            heading("H1"),
            body("P2"),
            heading("H2"),
            body("P3"),
        ];

        let segments = split_sections(&paragraphs);
        assert_eq!(segments.len(), 3);

        assert_eq!(segments[0].text, "P1");
        assert_eq!(segments[0].metadata.section_index, Some(0));
        assert_eq!(segments[0].metadata.section_heading, None);

        assert_eq!(segments[1].text, "P2");
        assert_eq!(segments[1].metadata.section_index, Some(1));
        assert_eq!(segments[1].metadata.section_heading.as_deref(), Some("H1"));

        assert_eq!(segments[2].text, "P3");
        assert_eq!(segments[2].metadata.section_heading.as_deref(), Some("H2"));
    }

    #[test]
    fn test_paragraphs_join_within_section() {
        let paragraphs = vec![heading("Intro"), body("a"), body("  "), body("b")];

        let segments = split_sections(&paragraphs);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "a\n\nb");
        assert_eq!(segments[0].metadata.section_index, Some(0));
    }

    #[test]
    fn test_no_headings_falls_back_to_whole_document() {
        let paragraphs = vec![
            DocxParagraph::new("first", None),
            DocxParagraph::new("second", None),
        ];

        let segments = split_sections(&paragraphs);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "first\n\nsecond");
        assert!(segments[0].metadata.section_index.is_none());
    }

    #[test]
    fn test_headings_only_falls_back() {
        let paragraphs = vec![heading("Only"), heading("Titles")];

        let segments = split_sections(&paragraphs);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Only\n\nTitles");
    }

    #[test]
    fn test_heading_style_detection() {
        assert!(DocxParagraph::new("x", Some("heading2")).is_heading());
        assert!(DocxParagraph::new("x", Some("Heading1")).is_heading());
        assert!(!DocxParagraph::new("x", Some("Title")).is_heading());
        assert!(!DocxParagraph::new("x", None).is_heading());
    }

    #[test]
    fn test_heading_detection_prefers_style_name() {
        let localized = DocxParagraph::new("x", Some("Titre1")).with_style_name("heading 1");
        assert!(localized.is_heading());

        let renamed = DocxParagraph::new("x", Some("Heading1")).with_style_name("Chapter");
        assert!(!renamed.is_heading());
    }

    #[test]
    fn test_read_localized_heading_style() {
        let mut buf = Cursor::new(Vec::new());
        Docx::new()
            .add_style(Style::new("Titre1", StyleType::Paragraph).name("heading 1"))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Avant-propos")))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Chapitre"))
                    .style("Titre1"),
            )
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Corps")))
            .build()
            .pack(&mut buf)
            .unwrap();

        let paragraphs = paragraphs_from_bytes(buf.get_ref()).unwrap();
        assert_eq!(paragraphs[1].style_id.as_deref(), Some("Titre1"));
        assert_eq!(paragraphs[1].style_name.as_deref(), Some("heading 1"));
        assert!(paragraphs[1].is_heading());

        let segments = split_sections(&paragraphs);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Avant-propos");
        assert_eq!(segments[1].text, "Corps");
        assert_eq!(
            segments[1].metadata.section_heading.as_deref(),
            Some("Chapitre")
        );
    }

    #[test]
    fn test_read_generated_docx() {
        let mut buf = Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("P1")))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("H1"))
                    .style("Heading1"),
            )
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("P2")))
            .build()
            .pack(&mut buf)
            .unwrap();

        let paragraphs = paragraphs_from_bytes(buf.get_ref()).unwrap();
        let texts: Vec<&str> = paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["P1", "H1", "P2"]);
        assert!(paragraphs[1].is_heading());

        let segments = split_sections(&paragraphs);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].metadata.section_heading.as_deref(), Some("H1"));
    }
}
