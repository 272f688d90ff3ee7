use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];
const SCAN_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file format: {0}")]
    Unsupported(String),

    #[error("{path} needs OCR but no OCR command is configured")]
    NoOcrCommand { path: PathBuf },

    #[error("OCR command failed for {path}: {message}")]
    Ocr { path: PathBuf, message: String },
}

/// External program that turns a scanned document into text on stdout.
///
/// The scan path is appended as the last argument.
#[derive(Debug, Clone)]
pub struct OcrCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl OcrCommand {
    /// Parse a whitespace-separated command line such as `"ocr-tool --lang ara"`.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub async fn run(&self, path: &Path) -> Result<String, ReadError> {
        tracing::info!(program = %self.program, path = %path.display(), "running OCR");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .await
            .map_err(|e| ReadError::Ocr {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ReadError::Ocr {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Loads raw document text from text files or, through OCR, from scans.
#[derive(Debug, Clone, Default)]
pub struct DocumentReader {
    ocr: Option<OcrCommand>,
}

impl DocumentReader {
    pub fn new(ocr: Option<OcrCommand>) -> Self {
        Self { ocr }
    }

    pub fn is_supported(path: &Path) -> bool {
        let ext = extension(path);
        TEXT_EXTENSIONS.contains(&ext.as_str()) || SCAN_EXTENSIONS.contains(&ext.as_str())
    }

    pub async fn read_file(&self, path: &Path) -> Result<String, ReadError> {
        let ext = extension(path);

        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return fs::read_to_string(path).await.map_err(|source| ReadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        if SCAN_EXTENSIONS.contains(&ext.as_str()) {
            let ocr = self.ocr.as_ref().ok_or_else(|| ReadError::NoOcrCommand {
                path: path.to_path_buf(),
            })?;
            return ocr.run(path).await;
        }

        Err(ReadError::Unsupported(ext))
    }

    /// Supported files under `dir`, sorted by path.
    pub fn list_directory(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| Self::is_supported(path))
            .collect();
        files.sort();
        files
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
