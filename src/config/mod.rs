//! 설정 모듈
//!
//! 프로세스 시작 시 한 번 구성되는 불변 설정 객체입니다.
//! 파이프라인에는 `Arc<RagConfig>` 또는 참조로 전달합니다.
//!
//! 우선순위 (낮음 → 높음):
//! 1. 기본값
//! 2. `docrag.toml` (작업 디렉토리, 선택)
//! 3. `.env.local` (dotenv로 환경변수에 로드)
//! 4. 프로세스 환경변수 (`OLLAMA_BASE_URL`, `SIMILARITY_TOP_K` 등)

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// 선택적 TOML 설정 파일
pub const CONFIG_FILE: &str = "docrag.toml";

/// dotenv 파일
pub const ENV_FILE: &str = ".env.local";

/// 설정으로 인식하는 환경변수 (대소문자 무시)
const ENV_KEYS: &[&str] = &[
    "ollama_base_url",
    "ollama_model",
    "ollama_embed_model",
    "request_timeout_secs",
    "storage_root",
    "index_dir",
    "upload_dir",
    "chunk_size_tokens",
    "chunk_overlap_tokens",
    "similarity_top_k",
    "enable_rerank",
    "rerank_model",
    "rerank_base_url",
    "rerank_top_n",
    "enable_llm_rerank",
    "llm_rerank_top_n",
    "sentence_window_size",
];

// ============================================================================
// RagConfig
// ============================================================================

/// RAG 백엔드 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Ollama 서버 주소
    pub ollama_base_url: String,
    /// 답변 생성 모델
    pub ollama_model: String,
    /// 임베딩 모델
    pub ollama_embed_model: String,
    /// 모델 요청 타임아웃 (초)
    pub request_timeout_secs: u64,

    /// 저장소 루트
    pub storage_root: PathBuf,
    /// 인덱스 디렉토리
    pub index_dir: PathBuf,
    /// 업로드 디렉토리
    pub upload_dir: PathBuf,

    /// 청크 크기 (토큰 근사: 공백 단위 단어)
    pub chunk_size_tokens: usize,
    /// 청크 오버랩 (토큰 근사)
    pub chunk_overlap_tokens: usize,

    /// 기본 검색 개수
    pub similarity_top_k: usize,
    /// 크로스 인코더 리랭크 기본값
    pub enable_rerank: bool,
    /// 크로스 인코더 모델 이름
    pub rerank_model: String,
    /// 크로스 인코더 서버 주소 (없으면 리랭크 불가)
    #[serde(default)]
    pub rerank_base_url: Option<String>,
    /// 크로스 인코더 리랭크 후 남길 개수
    pub rerank_top_n: usize,
    /// LLM 리랭크 기본값
    pub enable_llm_rerank: bool,
    /// LLM 리랭크 후 남길 개수
    pub llm_rerank_top_n: usize,
    /// 문장 윈도우 크기 (전달만 함)
    pub sentence_window_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3".to_string(),
            ollama_embed_model: "nomic-embed-text".to_string(),
            request_timeout_secs: 120,
            storage_root: PathBuf::from("storage"),
            index_dir: PathBuf::from("storage/index"),
            upload_dir: PathBuf::from("storage/uploads"),
            chunk_size_tokens: 512,
            chunk_overlap_tokens: 64,
            similarity_top_k: 5,
            enable_rerank: false,
            rerank_model: "BAAI/bge-reranker-base".to_string(),
            rerank_base_url: None,
            rerank_top_n: 2,
            enable_llm_rerank: false,
            llm_rerank_top_n: 2,
            sentence_window_size: 3,
        }
    }
}

impl RagConfig {
    /// `.env.local`, `docrag.toml`, 환경변수를 합쳐 설정 로드
    pub fn load() -> Result<Self> {
        match dotenv::from_filename(ENV_FILE) {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) => tracing::debug!("No {} loaded: {}", ENV_FILE, e),
        }

        Self::from_figment(Self::figment())
    }

    /// 기본 Figment 구성 (기본값 + TOML + 환경변수)
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(ENV_KEYS))
    }

    /// Figment에서 추출 후 검증
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: RagConfig = figment
            .extract()
            .map_err(|e| RagError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_tokens == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size_tokens must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap_tokens >= self.chunk_size_tokens {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap_tokens ({}) must be smaller than chunk_size_tokens ({})",
                self.chunk_overlap_tokens, self.chunk_size_tokens
            )));
        }
        if self.similarity_top_k == 0 {
            return Err(RagError::InvalidConfig(
                "similarity_top_k must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 비어있지 않은 리랭크 서버 주소
    pub fn rerank_endpoint(&self) -> Option<&str> {
        self.rerank_base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    /// Ollama 주소 (끝의 `/` 제거)
    pub fn ollama_endpoint(&self) -> &str {
        self.ollama_base_url.trim_end_matches('/')
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(RagConfig::default()))
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::from_figment(defaults()).unwrap();
        assert_eq!(config, RagConfig::default());
        assert_eq!(config.similarity_top_k, 5);
        assert!(!config.enable_rerank);
        assert!(config.rerank_endpoint().is_none());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = defaults().merge(Toml::string(
            r#"
            similarity_top_k = 9
            enable_llm_rerank = true
            rerank_base_url = "http://localhost:8080/"
            "#,
        ));

        let config = RagConfig::from_figment(figment).unwrap();
        assert_eq!(config.similarity_top_k, 9);
        assert!(config.enable_llm_rerank);
        assert_eq!(config.rerank_endpoint(), Some("http://localhost:8080"));
        assert_eq!(config.ollama_model, "llama3");
    }

    #[test]
    fn test_later_provider_wins() {
        let figment = defaults()
            .merge(("chunk_size_tokens", 256))
            .merge(("chunk_size_tokens", 128));

        let config = RagConfig::from_figment(figment).unwrap();
        assert_eq!(config.chunk_size_tokens, 128);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let figment = defaults()
            .merge(("chunk_size_tokens", 64))
            .merge(("chunk_overlap_tokens", 64));

        let err = RagConfig::from_figment(figment).unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_overrides_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                similarity_top_k = 3
                ollama_model = "mistral"
                "#,
            )?;
            jail.set_env("SIMILARITY_TOP_K", "7");
            jail.set_env("UNRELATED_SETTING", "ignored");

            let config = RagConfig::from_figment(RagConfig::figment()).unwrap();
            assert_eq!(config.similarity_top_k, 7);
            assert_eq!(config.ollama_model, "mistral");
            Ok(())
        });
    }

    #[test]
    fn test_env_file_sits_between_toml_and_environment() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "chunk_size_tokens = 256\nollama_model = \"mistral\"")?;
            jail.create_file(ENV_FILE, "CHUNK_SIZE_TOKENS=128\nOLLAMA_MODEL=phi3\n")?;
            jail.set_env("OLLAMA_MODEL", "qwen2");

            let loaded = RagConfig::load();
            // dotenv가 설정한 값은 Jail이 복원하지 않음
            std::env::remove_var("CHUNK_SIZE_TOKENS");

            let config = loaded.unwrap();
            assert_eq!(config.chunk_size_tokens, 128);
            assert_eq!(config.ollama_model, "qwen2");
            Ok(())
        });
    }

    #[test]
    fn test_empty_rerank_url_is_none() {
        let config = RagConfig {
            rerank_base_url: Some(String::new()),
            ..Default::default()
        };
        assert!(config.rerank_endpoint().is_none());
    }
}
