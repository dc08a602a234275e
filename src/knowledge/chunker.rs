//! Text Chunking Module
//!
//! 문장 경계를 존중하는 텍스트 분할을 제공합니다.
//! 크기와 오버랩은 공백 단위 단어 수(토큰 근사)로 측정합니다.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::RagConfig;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (토큰)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (토큰)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }
}

impl From<&RagConfig> for ChunkConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            chunk_size: config.chunk_size_tokens.max(1),
            chunk_overlap: config.chunk_overlap_tokens.min(config.chunk_size_tokens.saturating_sub(1)),
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SentenceSplitter
// ============================================================================

/// 문장 단위 청커
///
/// - 문장을 최대 크기까지 순서대로 채웁니다.
/// - 다음 청크는 이전 청크 끝의 문장들 중 오버랩 크기 안에 드는 것으로 시작합니다.
/// - 최대 크기보다 긴 문장은 단어 단위로 자릅니다.
pub struct SentenceSplitter {
    config: ChunkConfig,
}

impl SentenceSplitter {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 문장 단위로 나누고, 너무 긴 문장은 단어 창으로 자름
    fn pieces(&self, text: &str) -> Vec<String> {
        split_sentences(text)
            .into_iter()
            .flat_map(|sentence| {
                if word_count(&sentence) > self.config.chunk_size {
                    chunk_text(&sentence, self.config.chunk_size, self.config.chunk_overlap)
                } else {
                    vec![sentence]
                }
            })
            .collect()
    }
}

impl Chunker for SentenceSplitter {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0;
        // current에 아직 내보내지 않은 문장이 있는지
        let mut has_new = false;

        for piece in self.pieces(text) {
            let len = word_count(&piece);

            if has_new && current_len + len > self.config.chunk_size {
                chunks.push(current.join(" "));

                // 오버랩: 끝에서부터 오버랩 크기 안에 드는 문장만 남김
                let mut carried = Vec::new();
                let mut carried_len = 0;
                for sentence in current.iter().rev() {
                    let n = word_count(sentence);
                    if carried_len + n > self.config.chunk_overlap {
                        break;
                    }
                    carried_len += n;
                    carried.push(sentence.clone());
                }
                carried.reverse();

                current = carried;
                current_len = carried_len;
                has_new = false;

                while !current.is_empty() && current_len + len > self.config.chunk_size {
                    let removed = current.remove(0);
                    current_len -= word_count(&removed);
                }
            }

            current.push(piece);
            current_len += len;
            has_new = true;
        }

        if has_new {
            chunks.push(current.join(" "));
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "SentenceSplitter"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?。！？]+\s+|\n\s*\n").expect("Invalid regex"))
}

/// 문장 분리 (종결 부호 + 공백, 또는 빈 줄)
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in sentence_boundary().find_iter(text) {
        push_sentence(&mut sentences, &text[last..m.end()]);
        last = m.end();
    }
    push_sentence(&mut sentences, &text[last..]);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 텍스트를 단어 창으로 분할
///
/// `chunk_size` 단어씩 나누고 `overlap` 단어만큼 겹칩니다.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return vec![];
    }

    if words.len() <= chunk_size {
        return vec![words.join(" ")];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        start += step;
    }

    chunks
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> SentenceSplitter {
        SentenceSplitter::new(ChunkConfig {
            chunk_size,
            chunk_overlap,
        })
    }

    #[test]
    fn test_empty_text() {
        assert!(splitter(8, 2).chunk("   \n").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = splitter(50, 5).chunk("Revenue grew.\n\nCosts fell!");
        assert_eq!(chunks, vec!["Revenue grew. Costs fell!"]);
    }

    #[test]
    fn test_sentences_packed_without_overlap() {
        let chunks = splitter(6, 0).chunk("One two three. Four five six. Seven eight.");
        assert_eq!(chunks, vec!["One two three. Four five six.", "Seven eight."]);
    }

    #[test]
    fn test_overlap_carries_trailing_sentence() {
        let chunks = splitter(6, 3).chunk("One two three. Four five six. Seven eight.");
        assert_eq!(
            chunks,
            vec!["One two three. Four five six.", "Four five six. Seven eight."]
        );
    }

    #[test]
    fn test_long_sentence_split_by_words() {
        let chunks = splitter(4, 1).chunk("a b c d e f g h i j");
        assert_eq!(chunks, vec!["a b c d", "d e f g", "g h i j"]);
    }

    #[test]
    fn test_config_from_rag_config() {
        let config = RagConfig {
            chunk_size_tokens: 100,
            chunk_overlap_tokens: 10,
            ..Default::default()
        };
        assert_eq!(
            ChunkConfig::from(&config),
            ChunkConfig {
                chunk_size: 100,
                chunk_overlap: 10
            }
        );
    }

    #[test]
    fn test_chunk_text() {
        let chunks = chunk_text("a b c d e f g h", 4, 0);
        assert_eq!(chunks, vec!["a b c d", "e f g h"]);
        assert!(chunk_text("", 4, 1).is_empty());
        assert_eq!(chunk_text("a b c", 4, 1), vec!["a b c"]);
    }
}
