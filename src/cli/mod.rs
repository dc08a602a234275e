//! CLI 모듈
//!
//! docrag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use crate::collector::{CollectionStats, FileCollector};
use crate::config::RagConfig;
use crate::embedding::OllamaEmbedding;
use crate::eval::{evaluate_to_files, load_questions};
use crate::ingest::Ingestor;
use crate::knowledge::{ChunkConfig, IndexStore, LanceIndexStore, NodeBuilder, SentenceSplitter};
use crate::llm::OllamaLlm;
use crate::query::{CrossEncoderRerank, QueryEngine, QueryOptions, SourceRecord, StreamEvent};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docrag")]
#[command(version, about = "로컬 문서 RAG 백엔드", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더를 인덱스에 추가
    Ingest {
        /// 수집할 파일 경로들
        paths: Vec<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// 질문하기
    Query {
        /// 질문
        question: String,

        /// 검색할 청크 수 (기본: SIMILARITY_TOP_K)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// cross-encoder 리랭크 사용 여부 (기본: ENABLE_RERANK)
        #[arg(long)]
        rerank: Option<bool>,

        /// LLM 리랭크 사용 여부 (기본: ENABLE_LLM_RERANK)
        #[arg(long)]
        llm_rerank: Option<bool>,

        /// 문장 윈도우 크기 (기본: SENTENCE_WINDOW_SIZE)
        #[arg(long)]
        window: Option<usize>,

        /// 답변을 생성되는 대로 출력
        #[arg(long)]
        stream: bool,

        /// 스트리밍 출력을 Server-Sent Events 형식으로
        #[arg(long, requires = "stream")]
        sse: bool,
    },

    /// 질문 목록으로 평가 실행
    Eval {
        /// 질문 파일 (한 줄에 하나)
        #[arg(short, long)]
        questions: PathBuf,

        /// 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 평가 전에 수집할 파일들
        #[arg(long, num_args = 1..)]
        ingest: Vec<PathBuf>,

        /// JSONL 결과 파일
        #[arg(long, default_value = "eval_results.jsonl")]
        out: PathBuf,

        /// CSV 요약 파일
        #[arg(long, default_value = "eval_results.csv")]
        csv: PathBuf,

        /// CSV 요약 생략
        #[arg(long)]
        no_csv: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// Services
// ============================================================================

/// 진입점에서 한 번 만드는 의존성 묶음
struct Services {
    config: RagConfig,
    store: Arc<dyn IndexStore>,
    embedder: Arc<OllamaEmbedding>,
    llm: Arc<OllamaLlm>,
}

impl Services {
    fn new(config: RagConfig) -> Result<Self> {
        let embedder = Arc::new(OllamaEmbedding::new(&config).context("임베딩 클라이언트 생성 실패")?);
        let llm = Arc::new(OllamaLlm::new(&config).context("생성 모델 클라이언트 생성 실패")?);

        let nodes = NodeBuilder::new(
            Arc::new(SentenceSplitter::new(ChunkConfig::from(&config))),
            embedder.clone(),
        );
        let store: Arc<dyn IndexStore> = Arc::new(LanceIndexStore::new(&config.index_dir, nodes));

        Ok(Self {
            config,
            store,
            embedder,
            llm,
        })
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.config.clone(), self.store.clone())
    }

    /// 질의 엔진 (cross-encoder 확인은 여기서 한 번)
    async fn query_engine(&self) -> QueryEngine {
        let cross_encoder = CrossEncoderRerank::check_health(&self.config).await;
        tracing::debug!("Cross-encoder capability: {:?}", cross_encoder);

        QueryEngine::new(
            self.config.clone(),
            self.store.clone(),
            self.embedder.clone(),
            self.llm.clone(),
            cross_encoder,
        )
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load().context("설정 로드 실패")?;
    let services = Services::new(config)?;

    match cli.command {
        Commands::Ingest { paths, dir } => cmd_ingest(&services, paths, dir).await,
        Commands::Query {
            question,
            top_k,
            rerank,
            llm_rerank,
            window,
            stream,
            sse,
        } => {
            let options = QueryOptions {
                top_k,
                enable_rerank: rerank,
                enable_llm_rerank: llm_rerank,
                window_size: window,
            };
            cmd_query(&services, &question, &options, stream, sse).await
        }
        Commands::Eval {
            questions,
            top_k,
            ingest,
            out,
            csv,
            no_csv,
        } => {
            let csv = (!no_csv).then_some(csv);
            cmd_eval(&services, questions, top_k, ingest, out, csv).await
        }
        Commands::Status => cmd_status(&services).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(services: &Services, mut paths: Vec<PathBuf>, dir: Option<PathBuf>) -> Result<()> {
    if let Some(ref dir_path) = dir {
        let collected = FileCollector::with_defaults()
            .collect_directory(dir_path)
            .context("폴더 수집 실패")?;
        paths.extend(collected);
    }

    if paths.is_empty() {
        bail!("수집할 파일 경로 또는 --dir를 지정해야 합니다");
    }

    let stats = CollectionStats::from_paths(&paths);
    println!("[*] 수집 대상: {} 파일", paths.len());
    println!(
        "    PDF: {}, DOCX: {}, HTML: {}, 텍스트: {}",
        stats.pdf_files, stats.docx_files, stats.html_files, stats.text_files
    );

    let count = services
        .ingestor()
        .ingest(&paths)
        .await
        .context("수집 실패")?;

    println!("[OK] 새로 인덱싱된 문서: {} 건", count);
    Ok(())
}

/// 질문 명령어 (query)
async fn cmd_query(
    services: &Services,
    question: &str,
    options: &QueryOptions,
    stream: bool,
    sse: bool,
) -> Result<()> {
    let engine = services.query_engine().await;

    if !stream {
        let record = engine.query(question, options).await.context("질의 실패")?;
        println!("{}", record.answer);
        print_sources(&record.sources);
        return Ok(());
    }

    let mut events = engine
        .query_stream(question, options)
        .await
        .context("질의 실패")?;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        let event = event.context("답변 생성 실패")?;

        if sse {
            write!(stdout, "{}", event.to_sse()?)?;
            stdout.flush()?;
            continue;
        }

        match event {
            StreamEvent::Token(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::Sources(sources) => {
                println!();
                print_sources(&sources);
            }
        }
    }

    Ok(())
}

/// 평가 명령어 (eval)
async fn cmd_eval(
    services: &Services,
    questions_path: PathBuf,
    top_k: Option<usize>,
    ingest: Vec<PathBuf>,
    out: PathBuf,
    csv: Option<PathBuf>,
) -> Result<()> {
    if !ingest.is_empty() {
        println!("[*] {} 파일 수집 중...", ingest.len());
        services
            .ingestor()
            .ingest(&ingest)
            .await
            .context("평가 전 수집 실패")?;
    }

    if !questions_path.exists() {
        bail!("질문 파일을 찾을 수 없습니다: {}", questions_path.display());
    }

    let questions = load_questions(&questions_path).context("질문 파일 읽기 실패")?;
    println!("[*] 질문 {} 개 로드. 평가 실행 중...", questions.len());

    let engine = services.query_engine().await;
    let options = QueryOptions {
        top_k,
        ..Default::default()
    };

    let summary = evaluate_to_files(&engine, &questions, &options, &out, csv.as_deref())
        .await
        .context("평가 실패")?;

    match csv {
        Some(ref csv_path) => println!(
            "[OK] {} 건 결과 기록: {} , {}",
            summary.succeeded,
            out.display(),
            csv_path.display()
        ),
        None => println!("[OK] {} 건 결과 기록: {}", summary.succeeded, out.display()),
    }
    if summary.failed() > 0 {
        println!("[!] 실패한 질문: {} 개", summary.failed());
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(services: &Services) -> Result<()> {
    let config = &services.config;

    println!("docrag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] Ollama: {}", config.ollama_endpoint());
    println!(
        "    생성 모델: {}, 임베딩 모델: {}",
        config.ollama_model, config.ollama_embed_model
    );
    println!("[*] 인덱스 디렉토리: {}", config.index_dir.display());
    println!(
        "    청크: {} 토큰 (오버랩 {}), top_k: {}",
        config.chunk_size_tokens, config.chunk_overlap_tokens, config.similarity_top_k
    );
    println!(
        "    리랭크: {} (top {}), LLM 리랭크: {} (top {}), 윈도우: {}",
        config.enable_rerank,
        config.rerank_top_n,
        config.enable_llm_rerank,
        config.llm_rerank_top_n,
        config.sentence_window_size
    );

    match services.store.load().await {
        Ok(Some(index)) => match index.chunk_count().await {
            Ok(count) => println!("[OK] 인덱스: {} 청크", count),
            Err(e) => println!("[!] 인덱스 통계 조회 실패: {:#}", e),
        },
        Ok(None) => println!("[!] 인덱스: 없음 (ingest로 생성)"),
        Err(e) => println!("[!] 인덱스를 읽을 수 없습니다: {:#}", e),
    }

    let capability = CrossEncoderRerank::check_health(config).await;
    match capability.unavailable_error() {
        None => println!("[OK] Cross-encoder 리랭커: 사용 가능"),
        Some(e) => println!("[!] Cross-encoder 리랭커: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 출처 목록 출력
fn print_sources(sources: &[SourceRecord]) {
    if sources.is_empty() {
        return;
    }

    println!("\n[출처] ({} 건)", sources.len());
    for (i, source) in sources.iter().enumerate() {
        let mut label = source.metadata.file_name.clone();
        if let Some(page) = source.metadata.locator.page_number {
            label.push_str(&format!(" (p.{})", page));
        } else if let Some(ref heading) = source.metadata.locator.section_heading {
            label.push_str(&format!(" ({})", truncate_text(heading, 40)));
        }

        println!("{}. [점수: {:.4}] {}", i + 1, source.score, label);
        if let Some(ref snippet) = source.snippet {
            println!("   {}", truncate_text(snippet, 200));
        }
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
