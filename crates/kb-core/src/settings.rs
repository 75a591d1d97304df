use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{KbError, Result};

fn default_rpm() -> u32 {
    20
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_vector_dim() -> usize {
    1536
}

fn default_mcp_port() -> u16 {
    8787
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_rpm")]
    pub rpm: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_mcp_port")]
    pub port: u16,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_enabled: bool,
}

/// Top-level settings read once from `config.json` at process startup.
///
/// `webdav` is intentionally untyped (`serde_json::Value`): WebDAV
/// replication is out of scope for this core, but the key must still
/// round-trip through deserialization without failing when present.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub embedding: EmbeddingConfig,
    #[serde(default = "default_mcp")]
    pub mcp: McpConfig,
    pub data_path: String,
    #[serde(default)]
    pub webdav: Option<serde_json::Value>,
}

fn default_mcp() -> McpConfig {
    McpConfig {
        port: default_mcp_port(),
        api_key: None,
        auth_enabled: false,
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| KbError::Validation(format!("cannot open config at {path:?}: {e}")))?;
        let reader = BufReader::new(file);
        let settings: Settings = serde_json::from_reader(reader)
            .map_err(|e| KbError::Validation(format!("invalid config at {path:?}: {e}")))?;
        Ok(settings)
    }

    pub fn db_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_path).join("kb.db")
    }

    pub fn originals_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_path).join("files/originals")
    }

    pub fn working_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_path).join("files/working")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "kb-core-settings-test-{}.json",
            std::process::id()
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_applies_defaults_for_missing_optional_fields() {
        let path = write_temp_config(
            r#"{
                "embedding": {"base_url": "http://localhost:8080", "api_key": "k", "model": "m"},
                "data_path": "/tmp/kb"
            }"#,
        );
        let settings = Settings::load(&path).expect("settings should load");
        assert_eq!(settings.embedding.rpm, 20);
        assert_eq!(settings.embedding.vector_dim, 1536);
        assert!(!settings.mcp.auth_enabled);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn load_returns_validation_error_when_file_missing() {
        let result = Settings::load("/nonexistent/path/config.json");
        assert!(matches!(result, Err(KbError::Validation(_))));
    }
}
