//! 평가 실행기
//!
//! 질문 목록을 순서대로 질의하고 결과를 JSONL(+CSV)로 기록합니다.
//! 질문 하나의 실패는 해당 레코드의 `error`로 남고, 나머지 질문은 계속 진행합니다.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::query::{AnswerRecord, QueryEngine, QueryOptions, SourceRecord};

/// CSV 헤더
pub const CSV_HEADER: [&str; 4] = ["question", "answer", "top_source", "score"];

/// JSONL 한 줄
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalRecord {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalRecord {
    fn success(record: AnswerRecord) -> Self {
        Self {
            question: record.question,
            answer: Some(record.answer),
            sources: Some(record.sources),
            error: None,
        }
    }

    fn failure(question: &str, error: String) -> Self {
        Self {
            question: question.to_string(),
            answer: None,
            sources: None,
            error: Some(error),
        }
    }

    /// CSV 행: question, answer, top_source, score
    fn csv_row(&self) -> [String; 4] {
        if let Some(error) = &self.error {
            return [
                self.question.clone(),
                String::new(),
                String::new(),
                format!("error: {}", error),
            ];
        }

        let top = self.sources.as_ref().and_then(|s| s.first());
        let top_source = top
            .map(|s| {
                if s.metadata.file_name.is_empty() {
                    s.metadata.source_path.clone()
                } else {
                    s.metadata.file_name.clone()
                }
            })
            .unwrap_or_default();
        let score = top.map(|s| s.score.to_string()).unwrap_or_default();

        [
            self.question.clone(),
            self.answer.as_deref().unwrap_or_default().trim().to_string(),
            top_source,
            score,
        ]
    }
}

/// 평가 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalSummary {
    pub total: usize,
    pub succeeded: usize,
}

impl EvalSummary {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// 질문 파일 읽기 (비어있지 않은 줄, 앞뒤 공백 제거)
pub fn load_questions(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// 질문들을 평가하여 writer에 기록
pub async fn evaluate<J, C>(
    engine: &QueryEngine,
    questions: &[String],
    options: &QueryOptions,
    mut jsonl: J,
    mut csv: Option<csv::Writer<C>>,
) -> Result<EvalSummary>
where
    J: Write,
    C: Write,
{
    if let Some(writer) = csv.as_mut() {
        writer.write_record(CSV_HEADER).map_err(std::io::Error::from)?;
    }

    let mut summary = EvalSummary::default();

    for (i, question) in questions.iter().enumerate() {
        let record = match engine.query(question, options).await {
            Ok(answer) => {
                summary.succeeded += 1;
                EvalRecord::success(answer)
            }
            Err(e) => {
                tracing::warn!("Question {} failed: {}", i + 1, e);
                EvalRecord::failure(question, e.to_string())
            }
        };
        summary.total += 1;

        serde_json::to_writer(&mut jsonl, &record)?;
        jsonl.write_all(b"\n")?;

        if let Some(writer) = csv.as_mut() {
            writer
                .write_record(record.csv_row())
                .map_err(std::io::Error::from)?;
        }
    }

    jsonl.flush()?;
    if let Some(writer) = csv.as_mut() {
        writer.flush()?;
    }

    Ok(summary)
}

/// 결과 파일을 만들고 평가 실행
pub async fn evaluate_to_files(
    engine: &QueryEngine,
    questions: &[String],
    options: &QueryOptions,
    out_path: &Path,
    csv_path: Option<&Path>,
) -> Result<EvalSummary> {
    let jsonl = BufWriter::new(File::create(out_path)?);
    let csv = match csv_path {
        Some(path) => Some(csv::Writer::from_writer(File::create(path)?)),
        None => None,
    };

    evaluate(engine, questions, options, jsonl, csv).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::knowledge::memory::MemoryIndexStore;
    use crate::knowledge::IndexStore;
    use crate::query::RerankCapability;
    use crate::testing::{document, mock_nodes, MockEmbedder, MockLlm};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn engine() -> QueryEngine {
        let store = MemoryIndexStore::new(mock_nodes());
        let mut index = store
            .initialize(&[document("rev", "Quarterly revenue grew by ten percent.")])
            .await
            .unwrap();
        index.persist().await.unwrap();

        QueryEngine::new(
            RagConfig::default(),
            Arc::new(store),
            Arc::new(MockEmbedder),
            Arc::new(MockLlm::new(&["  Ten percent.  "])),
            RerankCapability::Unavailable {
                reason: "not configured".to_string(),
            },
        )
    }

    #[test]
    fn test_load_questions_skips_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("questions.txt");
        std::fs::write(&path, "  first?  \n\n   \nsecond?\n").unwrap();

        assert_eq!(load_questions(&path).unwrap(), vec!["first?", "second?"]);
        assert!(load_questions(&temp_dir.path().join("missing.txt")).is_err());
    }

    #[tokio::test]
    async fn test_failed_question_does_not_abort_batch() {
        let engine = engine().await;
        let questions = vec![
            "How did revenue change?".to_string(),
            "FAIL retrieval".to_string(),
            "What grew?".to_string(),
        ];

        let mut jsonl = Vec::new();
        let mut csv_out = Vec::new();
        let summary = evaluate(
            &engine,
            &questions,
            &QueryOptions::default(),
            &mut jsonl,
            Some(csv::Writer::from_writer(&mut csv_out)),
        )
        .await
        .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 1);

        let lines: Vec<serde_json::Value> = String::from_utf8(jsonl)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| l.get("error").is_some()).count(), 1);
        assert!(lines[1].get("error").is_some());
        assert!(lines[1].get("answer").is_none());
        for ok in [&lines[0], &lines[2]] {
            assert_eq!(ok["answer"], "Ten percent.");
            assert!(ok["sources"].is_array());
        }

        let csv_text = String::from_utf8(csv_out).unwrap();
        let rows: Vec<&str> = csv_text.lines().collect();
        assert_eq!(rows[0], "question,answer,top_source,score");
        assert!(rows[1].starts_with("How did revenue change?,Ten percent.,rev.txt,"));
        assert!(rows[2].starts_with("FAIL retrieval,,,error: "));
    }

    #[tokio::test]
    async fn test_evaluate_to_files_without_csv() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("eval_results.jsonl");

        let engine = engine().await;
        let summary = evaluate_to_files(
            &engine,
            &["What grew?".to_string()],
            &QueryOptions::default(),
            &out,
            None,
        )
        .await
        .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);
    }
}
