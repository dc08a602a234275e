//! HTML 텍스트 추출 모듈
//!
//! script/style/noscript 내용을 제거하고 텍스트 노드를 줄 단위로 정리합니다.

use scraper::Html;

/// 텍스트를 버리는 태그
const STRIPPED_TAGS: [&str; 3] = ["script", "style", "noscript"];

/// HTML 문서에서 본문 텍스트 추출
///
/// 텍스트 노드를 문서 순서대로 줄바꿈으로 연결한 뒤,
/// 각 줄을 trim하고 빈 줄을 제거합니다.
pub fn extract_text_from_html(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut parts: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let stripped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| STRIPPED_TAGS.contains(&el.name()))
                .unwrap_or(false)
        });

        if !stripped {
            parts.push(&**text);
        }
    }

    parts
        .join("\n")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================
