use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use extract::RecoveryOptions;
use ingest::{ChunkerConfig, ModelProfile};
use reconcile::ReconcileOptions;
use structure::RepairOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub profile: ModelProfile,
    pub chunking: ChunkerConfig,
    pub recovery: RecoveryOptions,
    pub repair: RepairOptions,
    pub reconcile: ReconcileOptions,
    pub cache: CacheConfig,
    /// External program turning scans into text, e.g. `"ocr-tool --lang ara"`.
    pub ocr_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let service = ServiceConfig {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            request_timeout_secs: 300,
        };
        Self {
            profile: ModelProfile::for_model(&service.model),
            service,
            chunking: ChunkerConfig::default(),
            recovery: RecoveryOptions::default(),
            repair: RepairOptions::default(),
            reconcile: ReconcileOptions::default(),
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
            ocr_command: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Switch to another model, taking its token limits along.
    pub fn set_model(&mut self, model: &str) {
        self.service.model = model.to_string();
        self.profile = ModelProfile::for_model(model);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cache": {"enabled": false, "max_entries": 5}, "ocr_command": "ocr-tool --lang ara"}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.ocr_command.as_deref(), Some("ocr-tool --lang ara"));
        assert_eq!(config.service.model, "llama3");
        assert_eq!(config.chunking.overlap_tokens, 256);
        assert!(config.recovery.bisect);
    }

    #[test]
    fn test_set_model_updates_profile() {
        let mut config = AppConfig::default();
        config.set_model("gpt-3.5-turbo");
        assert_eq!(config.profile.max_context, 4_096);
        assert_eq!(config.profile.name, "gpt-3.5-turbo");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
