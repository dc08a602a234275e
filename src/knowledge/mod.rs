//! Knowledge 모듈 - 청크 인덱스
//!
//! - Chunker: 문장 경계를 존중하는 텍스트 분할
//! - Index: 인덱스 저장소 트레이트 + 청킹/임베딩 노드 빌더
//! - LanceDB: 벡터 검색 (ANN) 기반 영속 인덱스

mod chunker;
mod index;
mod lance;
#[cfg(test)]
pub(crate) mod memory;

// Re-exports
pub use chunker::{chunk_text, ChunkConfig, Chunker, SentenceSplitter};
pub use index::{ChunkRecord, IndexHandle, IndexStore, NodeBuilder, RetrievedChunk};
pub use lance::LanceIndexStore;
