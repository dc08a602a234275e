//! docrag - 로컬 문서 RAG 백엔드
//!
//! PDF/DOCX/HTML/텍스트 파일을 수집해 LanceDB 인덱스에 저장하고,
//! Ollama 모델로 질의에 답합니다 (배치 또는 스트리밍).

pub mod cli;
pub mod collector;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod extractor;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod query;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use collector::{FileCollector, FileType, SourceFile};
pub use config::RagConfig;
pub use document::{build_documents, stable_doc_id, DocumentMetadata, LogicalDocument};
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{RagError, Result};
pub use eval::{evaluate, load_questions, EvalRecord, EvalSummary};
pub use extractor::{ContentExtractor, Segment, SegmentMetadata};
pub use ingest::Ingestor;
pub use knowledge::{IndexHandle, IndexStore, LanceIndexStore, NodeBuilder, RetrievedChunk};
pub use llm::{LanguageModel, OllamaLlm};
pub use query::{
    make_snippet, AnswerRecord, QueryEngine, QueryOptions, SourceRecord, StreamEvent,
};
