//! 파일 수집 모듈
//!
//! 입력 파일의 타입을 결정하고, 폴더를 재귀적으로 수집합니다.
//! .gitignore 패턴을 존중하고, 지원하는 확장자만 수집합니다.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use ignore::WalkBuilder;

use crate::error::RagError;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// PDF 파일 (페이지 단위)
    Pdf,
    /// Word 문서 (헤딩 기준 섹션 단위)
    Docx,
    /// HTML 문서
    Html,
    /// 텍스트/마크다운 파일
    Text,
}

impl FileType {
    /// 확장자로 파일 타입 결정 (`.` 없이, 대소문자 무시)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "html" | "htm" => Some(FileType::Html),
            "txt" | "md" => Some(FileType::Text),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    ///
    /// 지원하지 않는 확장자는 `UnsupportedFileType` 에러입니다.
    pub fn from_path(path: &Path) -> Result<Self, RagError> {
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        Self::from_extension(ext).ok_or_else(|| RagError::UnsupportedFileType {
            extension: if ext.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", ext.to_lowercase())
            },
        })
    }

    /// 짧은 표시용 이름
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Pdf => "PDF",
            FileType::Docx => "DOCX",
            FileType::Html => "HTML",
            FileType::Text => "TXT",
        }
    }
}

// ============================================================================
// Source File
// ============================================================================

/// 파일 stat 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// 파일 크기 (바이트)
    pub size: u64,
    /// 수정 시간 (UNIX 초, 소수점 이하 버림)
    pub modified_secs: i64,
}

/// 수집 대상 소스 파일
///
/// 한 번 열면 변경되지 않습니다.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// 정규화된 절대 경로
    pub path: PathBuf,
    /// 파일 타입
    pub file_type: FileType,
    /// stat 정보 (읽을 수 없으면 None)
    pub stat: Option<FileStat>,
}

impl SourceFile {
    /// 경로에서 소스 파일 생성
    ///
    /// 경로는 정규화되며, 정규화에 실패하면 절대 경로로 대체합니다.
    pub fn open(path: &Path) -> Result<Self, RagError> {
        let file_type = FileType::from_path(path)?;
        let path = canonical_path(path);

        let stat = std::fs::metadata(&path).ok().map(|meta| FileStat {
            size: meta.len(),
            modified_secs: meta.modified().map(system_time_secs).unwrap_or(0),
        });

        Ok(Self {
            path,
            file_type,
            stat,
        })
    }

    /// 파일 이름
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// 소문자 확장자 (`.pdf` 형식)
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    /// 파일 크기 (stat 불가 시 0)
    pub fn size(&self) -> u64 {
        self.stat.map(|s| s.size).unwrap_or(0)
    }
}

/// 경로 정규화 (실패 시 현재 디렉토리 기준 절대 경로)
pub fn canonical_path(path: &Path) -> PathBuf {
    match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(_) if path.is_absolute() => path.to_path_buf(),
        Err(_) => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

fn system_time_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs_f64().ceil() as i64),
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 폴더 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집 (지원하는 확장자만)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let abs_path = canonical_path(path);

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(&abs_path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let file_path = entry.path();
            if FileType::from_path(file_path).is_err() {
                continue;
            }

            if self.config.max_file_size > 0 {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size > self.config.max_file_size {
                    tracing::debug!("Skipping large file: {:?} ({} bytes)", file_path, size);
                    continue;
                }
            }

            files.push(file_path.to_path_buf());
        }

        tracing::info!("Collected {} files from {:?}", files.len(), abs_path);
        Ok(files)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub pdf_files: usize,
    pub docx_files: usize,
    pub html_files: usize,
    pub text_files: usize,
}

impl CollectionStats {
    /// 경로 목록에서 통계 계산 (지원하지 않는 확장자는 제외)
    pub fn from_paths(paths: &[PathBuf]) -> Self {
        let mut stats = Self::default();

        for file_type in paths.iter().filter_map(|p| FileType::from_path(p).ok()) {
            stats.total_files += 1;
            match file_type {
                FileType::Pdf => stats.pdf_files += 1,
                FileType::Docx => stats.docx_files += 1,
                FileType::Html => stats.html_files += 1,
                FileType::Text => stats.text_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("txt"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("HTM"), Some(FileType::Html));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_extension("doc"), None);
    }

    #[test]
    fn test_unsupported_extension_is_error() {
        let err = FileType::from_path(Path::new("/tmp/setup.EXE")).unwrap_err();
        match err {
            RagError::UnsupportedFileType { extension } => assert_eq!(extension, ".exe"),
            other => panic!("unexpected error: {other}"),
        }

        let err = FileType::from_path(Path::new("/tmp/Makefile")).unwrap_err();
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_source_file_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Notes.MD");
        std::fs::write(&path, "hello").unwrap();

        let file = SourceFile::open(&path).unwrap();
        assert_eq!(file.file_type, FileType::Text);
        assert_eq!(file.file_name(), "Notes.MD");
        assert_eq!(file.extension(), ".md");
        assert_eq!(file.size(), 5);
        assert!(file.path.is_absolute());
    }

    #[test]
    fn test_collect_directory_filters_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.md"), "a").unwrap();
        std::fs::write(temp_dir.path().join("b.exe"), "b").unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        std::fs::write(temp_dir.path().join("sub").join("c.html"), "<p>c</p>").unwrap();

        let files = FileCollector::with_defaults()
            .collect_directory(temp_dir.path())
            .unwrap();
        assert_eq!(files.len(), 2);

        let stats = CollectionStats::from_paths(&files);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.text_files, 1);
        assert_eq!(stats.html_files, 1);
    }
}
