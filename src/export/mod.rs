use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod json_exporter;

use crate::catalog::ProductRecord;
use crate::config::ExportConfig;
use crate::error::{SproutlyError, SproutlyResult};

/// Export format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// One JSON array
    Json,
    /// One product object per line
    Jsonl,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Export statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStats {
    pub format: ExportFormat,
    pub file_path: String,
    pub record_count: usize,
    pub file_size_bytes: u64,
    pub export_duration_ms: u64,
}

/// Writes the final product list to disk
pub struct ExportManager {
    config: ExportConfig,
}

impl ExportManager {
    pub fn new(config: &ExportConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn format(&self) -> ExportFormat {
        if self.config.jsonl {
            ExportFormat::Jsonl
        } else {
            ExportFormat::Json
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output_file
    }

    /// Fail early if the output file cannot be written
    pub async fn ensure_writable(&self) -> SproutlyResult<()> {
        ensure_writable(&self.config.output_file).await
    }

    pub async fn export(&self, products: &[ProductRecord]) -> SproutlyResult<ExportStats> {
        let path = &self.config.output_file;
        let format = self.format();
        info!("Exporting {} products to {} as {}", products.len(), path.display(), format);

        let start_time = std::time::Instant::now();

        let written = match format {
            ExportFormat::Json => json_exporter::export_json(products, path, self.config.pretty).await,
            ExportFormat::Jsonl => json_exporter::export_jsonl(products, path).await,
        };
        let file_size_bytes =
            written.map_err(|e| SproutlyError::export(format!("cannot write {}: {:#}", path.display(), e)))?;

        let stats = ExportStats {
            format,
            file_path: path.display().to_string(),
            record_count: products.len(),
            file_size_bytes,
            export_duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Export completed: {} records in {}ms, file size: {} bytes",
            stats.record_count, stats.export_duration_ms, stats.file_size_bytes
        );

        Ok(stats)
    }
}

/// Check that `path` can be created or appended to without clobbering it
pub async fn ensure_writable(path: &Path) -> SproutlyResult<()> {
    let not_writable = |reason: String| SproutlyError::OutputNotWritable {
        path: path.display().to_string(),
        reason,
    };

    if path.is_dir() {
        return Err(not_writable("path is a directory".to_string()));
    }

    let parent: PathBuf = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| not_writable(format!("cannot create {}: {}", parent.display(), e)))?;

    let existed = tokio::fs::try_exists(path).await.unwrap_or(false);
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| not_writable(e.to_string()))?;

    if !existed {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| not_writable(format!("cannot remove placeholder file: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Price, ProductId};
    use tempfile::TempDir;

    fn products() -> Vec<ProductRecord> {
        let mut margot = ProductRecord::new(
            ProductId::from_url("/products/the-margot").unwrap(),
            "The Margot",
            "https://shop.test/products/the-margot",
        );
        margot.price = Some(Price::usd(6500));
        margot.categories.insert("flowers".to_string());
        vec![margot]
    }

    fn manager(dir: &TempDir, file: &str, jsonl: bool) -> ExportManager {
        ExportManager::new(&ExportConfig {
            output_file: dir.path().join(file),
            jsonl,
            pretty: true,
        })
    }

    #[test]
    fn test_format_follows_config() {
        let dir = TempDir::new().unwrap();
        assert_eq!(manager(&dir, "products.json", false).format(), ExportFormat::Json);
        assert_eq!(manager(&dir, "products.jsonl", true).format(), ExportFormat::Jsonl);
        assert_eq!(ExportFormat::Jsonl.to_string(), "jsonl");
    }

    #[tokio::test]
    async fn test_export_json_array() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "out/products.json", false);
        manager.ensure_writable().await.unwrap();
        assert!(!manager.output_path().exists());

        let stats = manager.export(&products()).await.unwrap();
        assert_eq!(stats.record_count, 1);
        assert!(stats.file_size_bytes > 0);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manager.output_path()).unwrap()).unwrap();
        let first = &written.as_array().unwrap()[0];
        assert_eq!(first["id"], "the-margot");
        assert_eq!(first["price"]["cents"], 6500);
        assert_eq!(first["categories"], serde_json::json!(["flowers"]));
        assert_eq!(first["partial"], false);
        assert!(first.get("detail_status").is_none());
    }

    #[tokio::test]
    async fn test_export_jsonl() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "products.jsonl", true);
        manager.export(&products()).await.unwrap();

        let content = std::fs::read_to_string(manager.output_path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("{\"id\":\"the-margot\""));
    }

    #[tokio::test]
    async fn test_empty_export_is_empty_array() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, "products.json", false);
        manager.export(&[]).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manager.output_path()).unwrap()).unwrap();
        assert_eq!(written, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_directory_is_not_writable() {
        let dir = TempDir::new().unwrap();
        let err = ensure_writable(dir.path()).await.unwrap_err();
        assert!(matches!(err, SproutlyError::OutputNotWritable { .. }));
    }

    #[tokio::test]
    async fn test_write_failure_is_export_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocker"), "").unwrap();
        let manager = manager(&dir, "blocker/products.json", false);

        let err = manager.export(&products()).await.unwrap_err();
        assert!(matches!(err, SproutlyError::Export { .. }));
        assert_eq!(err.category(), "export");
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_existing_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.json");
        std::fs::write(&path, "[]").unwrap();

        ensure_writable(&path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
