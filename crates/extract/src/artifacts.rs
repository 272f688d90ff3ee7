use std::path::{Path, PathBuf};

/// Keeps raw service payloads on disk for offline diagnosis.
///
/// Write failures are logged and swallowed: a missing debug file never
/// fails a document.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a payload for `doc` labelled `label` is written to.
    pub fn path_for(&self, doc: &str, label: &str) -> PathBuf {
        let safe = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect()
        };
        self.dir.join(format!("{}_{}.txt", safe(doc), safe(label)))
    }

    pub async fn record(&self, doc: &str, label: &str, payload: &str) -> Option<PathBuf> {
        let path = self.path_for(doc, label);
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, payload).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = payload.len(), "saved debug artifact");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not save debug artifact");
                None
            }
        }
    }
}
